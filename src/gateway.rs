use std::time::Duration;

use anyhow::{bail, Context};
use parking_lot::Mutex;
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use url::Url;

use crate::model::{Client, ScheduledPost, DEFAULT_THEME_COLOR};

const CLIENTS_TABLE: &str = "clients";
const POSTS_TABLE: &str = "posts";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("{table} record {id} not found")]
    NotFound { table: &'static str, id: String },
    #[error("password does not match for client {0}")]
    PasswordMismatch(String),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("backend unavailable: {0}")]
    Transient(String),
    #[error("unexpected backend response: {0}")]
    Decode(String),
}

impl GatewayError {
    fn from_http(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Transient(err.to_string())
        }
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// CRUD access to the hosted `clients` and `posts` tables.
pub trait CalendarBackend: Send + Sync {
    fn fetch_clients(&self) -> GatewayResult<Vec<Client>>;
    fn fetch_client_posts(&self, client_id: &str) -> GatewayResult<Vec<ScheduledPost>>;
    /// Updates by id when the post carries one, inserts otherwise.
    fn save_post(&self, post: &ScheduledPost) -> GatewayResult<ScheduledPost>;
    fn delete_post(&self, post_id: i64) -> GatewayResult<()>;
    /// A supplied password is only checked when the stored one is non-empty.
    fn fetch_client_by_id(&self, client_id: &str, password: Option<&str>) -> GatewayResult<Client>;
    fn save_client(&self, client: &Client) -> GatewayResult<Client>;
}

/// Log-and-swallow adapters for callers that only want a best-effort value.
pub trait Collapse<T> {
    fn or_empty(self, what: &str) -> T
    where
        T: Default;
    fn or_none(self, what: &str) -> Option<T>;
}

impl<T> Collapse<T> for GatewayResult<T> {
    fn or_empty(self, what: &str) -> T
    where
        T: Default,
    {
        self.or_none(what).unwrap_or_default()
    }

    fn or_none(self, what: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(error = %err, "gateway: {} failed", what);
                None
            }
        }
    }
}

fn verify_password(client: Client, password: Option<&str>) -> GatewayResult<Client> {
    let supplied = password.filter(|pw| !pw.is_empty());
    let stored = client.password.as_deref().filter(|pw| !pw.is_empty());
    if let (Some(supplied), Some(stored)) = (supplied, stored) {
        if Sha256::digest(supplied.as_bytes()) != Sha256::digest(stored.as_bytes()) {
            return Err(GatewayError::PasswordMismatch(
                client.id.clone().unwrap_or_default(),
            ));
        }
    }
    Ok(client)
}

fn validate_post(post: &ScheduledPost) -> GatewayResult<()> {
    match post.client_id.as_deref() {
        Some(id) if !id.trim().is_empty() => Ok(()),
        _ => Err(GatewayError::Validation(
            "post must belong to a client".into(),
        )),
    }
}

fn validate_client(client: &Client) -> GatewayResult<()> {
    if client.name.trim().is_empty() {
        return Err(GatewayError::Validation("client name is required".into()));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClientRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    themecolor: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

impl From<&Client> for ClientRow {
    fn from(client: &Client) -> Self {
        Self {
            id: client.id.clone(),
            name: client.name.clone(),
            themecolor: Some(client.theme_color.clone()),
            password: client.password.clone(),
        }
    }
}

impl From<ClientRow> for Client {
    fn from(row: ClientRow) -> Self {
        Client {
            id: row.id,
            name: row.name,
            theme_color: row
                .themecolor
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_THEME_COLOR.to_string()),
            password: row.password,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PostRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    #[serde(default)]
    date: String,
    #[serde(default)]
    day: Option<String>,
    #[serde(default)]
    dayofweek: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    posttype: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    completed: Option<bool>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    images: Option<Vec<String>>,
    #[serde(default)]
    clientid: Option<String>,
    #[serde(default)]
    socialnetworks: Option<Vec<String>>,
}

impl From<&ScheduledPost> for PostRow {
    fn from(post: &ScheduledPost) -> Self {
        Self {
            id: post.id,
            date: post.date.clone(),
            day: Some(post.day.clone()),
            dayofweek: Some(post.day_of_week.clone()),
            title: post.title.clone(),
            posttype: Some(post.post_type.clone()),
            text: Some(post.text.clone()),
            completed: Some(post.completed),
            notes: post.notes.clone(),
            images: Some(post.images.clone()),
            clientid: post.client_id.clone(),
            socialnetworks: Some(post.social_networks.clone()),
        }
    }
}

impl From<PostRow> for ScheduledPost {
    fn from(row: PostRow) -> Self {
        ScheduledPost {
            id: row.id,
            date: row.date,
            day: row.day.unwrap_or_default(),
            day_of_week: row.dayofweek.unwrap_or_default(),
            title: row.title,
            post_type: row.posttype.unwrap_or_default(),
            text: row.text.unwrap_or_default(),
            completed: row.completed.unwrap_or(false),
            notes: row.notes,
            images: row.images.unwrap_or_default(),
            client_id: row.clientid,
            social_networks: row.socialnetworks.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub url: String,
    pub api_key: String,
    pub client_info: String,
    pub timeout: Duration,
    pub http_client: Option<HttpClient>,
}

/// PostgREST gateway (`<url>/rest/v1/<table>`).
pub struct RestGateway {
    http: HttpClient,
    base_url: String,
    api_key: String,
    client_info: String,
}

impl RestGateway {
    pub fn new(config: GatewayConfig) -> anyhow::Result<Self> {
        if config.url.trim().is_empty() {
            bail!("gateway: backend url required");
        }
        if config.api_key.trim().is_empty() {
            bail!("gateway: backend api key required");
        }
        Url::parse(config.url.trim())
            .with_context(|| format!("gateway: invalid backend url {:?}", config.url))?;

        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout)
                .build()
                .context("gateway: build http client")?,
        };

        Ok(Self {
            http,
            base_url: config.url.trim().trim_end_matches('/').to_string(),
            api_key: config.api_key,
            client_info: config.client_info,
        })
    }

    fn table_url(&self, table: &str, query: &[(&str, String)]) -> GatewayResult<Url> {
        let mut url = Url::parse(&format!("{}/rest/v1/{}", self.base_url, table))
            .map_err(|err| GatewayError::Validation(err.to_string()))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.api_key)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header("x-client-info", &self.client_info)
            .header("Prefer", "return=representation")
    }

    fn send(&self, table: &'static str, id: &str, request: RequestBuilder) -> GatewayResult<Response> {
        let response = request.send().map_err(GatewayError::from_http)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        debug!(table, %status, body = %body, "gateway: request rejected");
        Err(match status {
            StatusCode::NOT_FOUND => GatewayError::NotFound {
                table,
                id: id.to_string(),
            },
            s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
                GatewayError::Transient(format!("{status}: {body}"))
            }
            _ => GatewayError::Validation(format!("{status}: {body}")),
        })
    }

    fn rows<T: DeserializeOwned>(
        &self,
        table: &'static str,
        id: &str,
        request: RequestBuilder,
    ) -> GatewayResult<Vec<T>> {
        self.send(table, id, request)?
            .json::<Vec<T>>()
            .map_err(GatewayError::from_http)
    }

    fn upsert<R>(&self, table: &'static str, id: Option<String>, row: &R) -> GatewayResult<R>
    where
        R: Serialize + DeserializeOwned,
    {
        let request = match id.as_deref() {
            Some(id) => {
                debug!(table, id, "gateway: update");
                let url = self.table_url(table, &[("id", format!("eq.{id}"))])?;
                self.request(Method::PATCH, url)
            }
            None => {
                debug!(table, "gateway: insert");
                let url = self.table_url(table, &[])?;
                self.request(Method::POST, url)
            }
        };
        let request = request.header(CONTENT_TYPE, "application/json").json(row);
        let label = id.clone().unwrap_or_default();
        self.rows::<R>(table, &label, request)?
            .into_iter()
            .next()
            .ok_or_else(|| match id {
                Some(id) => GatewayError::NotFound { table, id },
                None => GatewayError::Decode(format!("{table}: insert returned no rows")),
            })
    }
}

impl CalendarBackend for RestGateway {
    fn fetch_clients(&self) -> GatewayResult<Vec<Client>> {
        let url = self.table_url(CLIENTS_TABLE, &[("select", "*".into())])?;
        let rows: Vec<ClientRow> = self.rows(CLIENTS_TABLE, "", self.request(Method::GET, url))?;
        Ok(rows.into_iter().map(Client::from).collect())
    }

    fn fetch_client_posts(&self, client_id: &str) -> GatewayResult<Vec<ScheduledPost>> {
        let url = self.table_url(
            POSTS_TABLE,
            &[
                ("select", "*".into()),
                ("clientid", format!("eq.{client_id}")),
                ("order", "date.asc".into()),
            ],
        )?;
        let rows: Vec<PostRow> =
            self.rows(POSTS_TABLE, client_id, self.request(Method::GET, url))?;
        debug!(client_id, count = rows.len(), "gateway: fetched posts");
        Ok(rows.into_iter().map(ScheduledPost::from).collect())
    }

    fn save_post(&self, post: &ScheduledPost) -> GatewayResult<ScheduledPost> {
        validate_post(post)?;
        let row = PostRow::from(post);
        self.upsert(POSTS_TABLE, post.id.map(|id| id.to_string()), &row)
            .map(ScheduledPost::from)
    }

    fn delete_post(&self, post_id: i64) -> GatewayResult<()> {
        let url = self.table_url(POSTS_TABLE, &[("id", format!("eq.{post_id}"))])?;
        self.send(
            POSTS_TABLE,
            &post_id.to_string(),
            self.request(Method::DELETE, url),
        )?;
        Ok(())
    }

    fn fetch_client_by_id(&self, client_id: &str, password: Option<&str>) -> GatewayResult<Client> {
        if client_id.trim().is_empty() {
            return Err(GatewayError::Validation("client id is required".into()));
        }
        let url = self.table_url(
            CLIENTS_TABLE,
            &[("select", "*".into()), ("id", format!("eq.{client_id}"))],
        )?;
        let client = self
            .rows::<ClientRow>(CLIENTS_TABLE, client_id, self.request(Method::GET, url))?
            .into_iter()
            .next()
            .map(Client::from)
            .ok_or_else(|| GatewayError::NotFound {
                table: CLIENTS_TABLE,
                id: client_id.to_string(),
            })?;
        verify_password(client, password)
    }

    fn save_client(&self, client: &Client) -> GatewayResult<Client> {
        validate_client(client)?;
        let row = ClientRow::from(client);
        self.upsert(CLIENTS_TABLE, client.id.clone(), &row)
            .map(Client::from)
    }
}

#[derive(Debug, Default)]
struct Tables {
    clients: Vec<Client>,
    posts: Vec<ScheduledPost>,
    next_post_id: i64,
    next_client_id: u64,
}

/// In-process backend used for offline runs and tests.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    tables: Mutex<Tables>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(clients: Vec<Client>, posts: Vec<ScheduledPost>) -> Self {
        let next_post_id = posts.iter().filter_map(|p| p.id).max().unwrap_or(0);
        Self {
            tables: Mutex::new(Tables {
                next_client_id: clients.len() as u64,
                clients,
                posts,
                next_post_id,
            }),
        }
    }

    pub fn post_count(&self) -> usize {
        self.tables.lock().posts.len()
    }

    /// Current clients and posts, posts in insertion order.
    pub fn snapshot(&self) -> (Vec<Client>, Vec<ScheduledPost>) {
        let tables = self.tables.lock();
        (tables.clients.clone(), tables.posts.clone())
    }
}

impl CalendarBackend for MemoryGateway {
    fn fetch_clients(&self) -> GatewayResult<Vec<Client>> {
        Ok(self.tables.lock().clients.clone())
    }

    fn fetch_client_posts(&self, client_id: &str) -> GatewayResult<Vec<ScheduledPost>> {
        let mut posts: Vec<ScheduledPost> = self
            .tables
            .lock()
            .posts
            .iter()
            .filter(|post| post.belongs_to(client_id))
            .cloned()
            .collect();
        posts.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(posts)
    }

    fn save_post(&self, post: &ScheduledPost) -> GatewayResult<ScheduledPost> {
        validate_post(post)?;
        let mut tables = self.tables.lock();
        match post.id {
            Some(id) => {
                let slot = tables
                    .posts
                    .iter_mut()
                    .find(|existing| existing.id == Some(id))
                    .ok_or_else(|| GatewayError::NotFound {
                        table: POSTS_TABLE,
                        id: id.to_string(),
                    })?;
                *slot = post.clone();
                Ok(slot.clone())
            }
            None => {
                tables.next_post_id += 1;
                let saved = ScheduledPost {
                    id: Some(tables.next_post_id),
                    ..post.clone()
                };
                tables.posts.push(saved.clone());
                Ok(saved)
            }
        }
    }

    fn delete_post(&self, post_id: i64) -> GatewayResult<()> {
        self.tables
            .lock()
            .posts
            .retain(|post| post.id != Some(post_id));
        Ok(())
    }

    fn fetch_client_by_id(&self, client_id: &str, password: Option<&str>) -> GatewayResult<Client> {
        let client = self
            .tables
            .lock()
            .clients
            .iter()
            .find(|client| client.id.as_deref() == Some(client_id))
            .cloned()
            .ok_or_else(|| GatewayError::NotFound {
                table: CLIENTS_TABLE,
                id: client_id.to_string(),
            })?;
        verify_password(client, password)
    }

    fn save_client(&self, client: &Client) -> GatewayResult<Client> {
        validate_client(client)?;
        let mut tables = self.tables.lock();
        match client.id.as_deref() {
            Some(id) => {
                let slot = tables
                    .clients
                    .iter_mut()
                    .find(|existing| existing.id.as_deref() == Some(id))
                    .ok_or_else(|| GatewayError::NotFound {
                        table: CLIENTS_TABLE,
                        id: id.to_string(),
                    })?;
                *slot = client.clone();
                Ok(slot.clone())
            }
            None => {
                tables.next_client_id += 1;
                let saved = Client {
                    id: Some(format!("client-{}", tables.next_client_id)),
                    ..client.clone()
                };
                tables.clients.push(saved.clone());
                Ok(saved)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: Option<i64>, client: &str, date: &str) -> ScheduledPost {
        ScheduledPost {
            id,
            date: date.into(),
            title: format!("{client} {date}"),
            client_id: Some(client.into()),
            ..Default::default()
        }
    }

    fn gateway() -> MemoryGateway {
        let mut locked = Client::new("Locked").with_id("locked");
        locked.password = Some("abc".into());
        MemoryGateway::seeded(
            vec![Client::new("Acme").with_id("acme"), locked],
            vec![
                post(Some(1), "acme", "2024-05-03"),
                post(Some(2), "acme", "2024-05-01"),
                post(Some(3), "globex", "2024-05-02"),
            ],
        )
    }

    #[test]
    fn insert_without_id_never_touches_existing_rows() {
        let gw = gateway();
        let saved = gw.save_post(&post(None, "acme", "2024-06-01")).unwrap();
        assert_eq!(saved.id, Some(4));
        assert_eq!(gw.post_count(), 4);
    }

    #[test]
    fn update_with_id_targets_that_row() {
        let gw = gateway();
        let mut edited = post(Some(2), "acme", "2024-05-01");
        edited.title = "Edited".into();
        gw.save_post(&edited).unwrap();
        assert_eq!(gw.post_count(), 3);
        let posts = gw.fetch_client_posts("acme").unwrap();
        let titles: Vec<_> = posts.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Edited", "acme 2024-05-03"]);
    }

    #[test]
    fn update_of_missing_row_is_not_found() {
        let gw = gateway();
        let err = gw.save_post(&post(Some(99), "acme", "x")).unwrap_err();
        assert!(matches!(err, GatewayError::NotFound { table: "posts", .. }));
    }

    #[test]
    fn post_without_client_is_rejected() {
        let gw = gateway();
        let orphan = ScheduledPost::default();
        assert!(matches!(
            gw.save_post(&orphan),
            Err(GatewayError::Validation(_))
        ));
    }

    #[test]
    fn password_check() {
        let gw = gateway();
        assert!(gw.fetch_client_by_id("locked", Some("abc")).is_ok());
        assert_eq!(
            gw.fetch_client_by_id("locked", Some("xyz")),
            Err(GatewayError::PasswordMismatch("locked".into()))
        );
        assert!(gw.fetch_client_by_id("locked", None).is_ok());
        assert!(gw.fetch_client_by_id("acme", Some("anything")).is_ok());
    }

    #[test]
    fn missing_client_is_not_found_and_collapses() {
        let gw = gateway();
        let result = gw.fetch_client_by_id("nobody", None);
        assert!(matches!(result, Err(GatewayError::NotFound { .. })));
        assert!(result.or_none("fetch client").is_none());
    }

    #[test]
    fn client_insert_assigns_id() {
        let gw = gateway();
        let saved = gw.save_client(&Client::new("Initech")).unwrap();
        assert!(saved.id.is_some());
        assert_eq!(gw.fetch_clients().unwrap().len(), 3);
        assert!(gw.save_client(&Client::new("  ")).is_err());
    }

    #[test]
    fn delete_removes_post() {
        let gw = gateway();
        gw.delete_post(1).unwrap();
        assert_eq!(gw.post_count(), 2);
    }

    #[test]
    fn snapshot_keeps_insertion_order() {
        let gw = gateway();
        gw.save_post(&post(None, "globex", "2024-01-01")).unwrap();
        let (clients, posts) = gw.snapshot();
        assert_eq!(clients.len(), 2);
        let ids: Vec<_> = posts.iter().filter_map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn rest_gateway_requires_credentials() {
        let cfg = GatewayConfig {
            url: String::new(),
            api_key: "key".into(),
            client_info: "test".into(),
            timeout: Duration::from_secs(1),
            http_client: None,
        };
        assert!(RestGateway::new(cfg).is_err());
    }
}

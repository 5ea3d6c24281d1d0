use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::model::{Client, ScheduledPost};

/// Key holding every cached post, across all clients.
pub const POSTS_KEY: &str = "calendarPosts";
/// Last client list fetched from the backend.
pub const CLIENTS_KEY: &str = "clients";

/// Locally persisted key-value store. Values are JSON documents.
#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Default, Clone)]
pub struct Options {
    pub path: Option<PathBuf>,
}

impl Store {
    pub fn open(opts: Options) -> Result<Self> {
        let path = if let Some(path) = opts.path {
            path
        } else {
            default_path().context("cache: resolve default path")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cache: create directory {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("cache: open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("cache: set WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .context("cache: set busy timeout")?;
        migrate(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn close(self) -> Result<()> {
        let conn = Arc::try_unwrap(self.conn)
            .map_err(|_| anyhow!("cache: connection still in use"))?
            .into_inner();
        conn.close()
            .map_err(|(_, err)| err)
            .context("cache: close connection")
    }

    pub fn get_item(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT value FROM local_storage WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("cache: read key {key}"))
    }

    pub fn set_item(&self, key: &str, value: &str) -> Result<()> {
        if key.is_empty() {
            bail!("cache: key required");
        }
        let conn = self.conn.lock();
        conn.execute(
            r#"
INSERT INTO local_storage (key, value, updated_at)
VALUES (?1, ?2, ?3)
ON CONFLICT(key) DO UPDATE SET
  value = excluded.value,
  updated_at = excluded.updated_at
"#,
            params![key, value, Utc::now().timestamp()],
        )
        .with_context(|| format!("cache: write key {key}"))?;
        Ok(())
    }

    /// Reads and parses `key`. Absent keys, read errors and malformed JSON
    /// all yield `None`; the latter two are logged.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.get_item(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(key, error = %err, "cache: failed to read item");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, error = %err, "cache: failed to parse item");
                None
            }
        }
    }

    /// Serializes and stores `value`, logging instead of returning failures.
    pub fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(key, error = %err, "cache: failed to encode item");
                return;
            }
        };
        if let Err(err) = self.set_item(key, &encoded) {
            warn!(key, error = %err, "cache: failed to store item");
        }
    }

    pub fn cached_clients(&self) -> Vec<Client> {
        self.get_json(CLIENTS_KEY).unwrap_or_default()
    }

    /// Caches the client list. Passwords are never written locally.
    pub fn store_clients(&self, clients: &[Client]) {
        let stripped: Vec<Client> = clients
            .iter()
            .cloned()
            .map(|client| Client {
                password: None,
                ..client
            })
            .collect();
        self.set_json(CLIENTS_KEY, &stripped);
    }

    pub fn all_posts(&self) -> Vec<ScheduledPost> {
        self.get_json(POSTS_KEY).unwrap_or_default()
    }

    /// Posts owned by `client_id`, in the order they were cached.
    pub fn posts_for_client(&self, client_id: &str) -> Vec<ScheduledPost> {
        let posts: Vec<ScheduledPost> = self
            .all_posts()
            .into_iter()
            .filter(|post| post.belongs_to(client_id))
            .collect();
        debug!(client_id, count = posts.len(), "cache: loaded client posts");
        posts
    }

    pub fn store_posts(&self, posts: &[ScheduledPost]) {
        self.set_json(POSTS_KEY, posts);
    }

    /// Replaces the cached posts of one client, keeping everyone else's
    /// posts where they were. The client's new posts are appended.
    pub fn merge_client_posts(&self, client_id: &str, posts: Vec<ScheduledPost>) {
        let mut merged: Vec<ScheduledPost> = self
            .all_posts()
            .into_iter()
            .filter(|post| !post.belongs_to(client_id))
            .collect();
        merged.extend(posts.into_iter().map(|mut post| {
            post.client_id = Some(client_id.to_string());
            post
        }));
        self.store_posts(&merged);
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at INTEGER NOT NULL
)
"#,
        [],
    )?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    for (idx, sql) in migrations().iter().enumerate() {
        let version = (idx + 1) as i64;
        if version <= current {
            continue;
        }
        conn.execute_batch(sql)
            .with_context(|| format!("cache: apply migration {version}"))?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![
                version,
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or(Duration::from_secs(0))
                    .as_secs() as i64,
            ],
        )?;
    }
    Ok(())
}

fn migrations() -> Vec<&'static str> {
    vec![r#"
CREATE TABLE IF NOT EXISTS local_storage (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL,
  updated_at INTEGER NOT NULL
);
"#]
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("agenda-share").join("cache.db"))
}

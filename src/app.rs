use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use crate::cache;
use crate::config::{self, Config};
use crate::dispatch::{self, Channel, ConsoleNotifier, Desktop, Dispatched, SystemDesktop};
use crate::gateway::{
    CalendarBackend, Collapse, GatewayConfig, GatewayResult, MemoryGateway, RestGateway,
};
use crate::model::{Client, ScheduledPost};
use crate::session::{ShareSession, Tab};
use crate::settings::Settings;

#[derive(Debug, Parser)]
#[command(
    name = "agenda-share",
    version,
    about = "Agenda Share - Share social-media posting schedules by link, image or print."
)]
pub struct Cli {
    /// Path to the config file
    #[arg(long, global = true, env = "AGENDA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Use the local cache instead of the remote backend
    #[arg(long, global = true)]
    pub offline: bool,

    /// Treat backend failures as empty results instead of errors
    #[arg(long, global = true)]
    pub lenient: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List clients
    Clients,
    /// Show one client
    Client {
        id: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// List a client's scheduled posts
    Posts {
        client_id: String,
        /// Read from the local cache
        #[arg(long)]
        local: bool,
    },
    /// Insert or update a post from a JSON file
    SavePost { file: PathBuf },
    /// Insert or update a client from a JSON file
    SaveClient { file: PathBuf },
    /// Delete a post
    DeletePost { id: i64 },
    /// Copy a client's remote posts into the local cache
    Sync { client_id: String },
    /// Print a client's share link
    Link { client_id: String },
    /// Share a client's agenda through whatsapp, facebook, email or clipboard
    Share {
        client_id: String,
        channel: String,
        /// Share the rendered image instead of the link
        #[arg(long)]
        preview: bool,
    },
    /// Render the agenda image
    Preview {
        client_id: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Open the printable agenda in the browser
    Print { client_id: String },
    /// Save backend credentials to the config file
    Login {
        #[arg(long)]
        url: String,
        #[arg(long)]
        key: String,
    },
}

struct Runtime {
    cfg: Config,
    store: cache::Store,
    backend: Arc<dyn CalendarBackend>,
    /// Set for `--offline` runs; writes are flushed back to the cache.
    offline: Option<Arc<MemoryGateway>>,
    lenient: bool,
}

impl Runtime {
    fn list<T: Default>(&self, result: GatewayResult<T>, what: &str) -> Result<T> {
        if self.lenient {
            return Ok(result.or_empty(what));
        }
        result.with_context(|| format!("gateway: {what}"))
    }

    fn single<T>(&self, result: GatewayResult<T>, what: &str) -> Result<Option<T>> {
        if self.lenient {
            return Ok(result.or_none(what));
        }
        result
            .map(Some)
            .with_context(|| format!("gateway: {what}"))
    }

    /// Copies the offline tables back into the cache after a write.
    fn persist_offline(&self) {
        let Some(memory) = self.offline.as_ref() else {
            return;
        };
        let (clients, posts) = memory.snapshot();
        debug!(
            clients = clients.len(),
            posts = posts.len(),
            "offline: writing tables back to cache"
        );
        self.store.store_clients(&clients);
        self.store.store_posts(&posts);
    }

    fn settings(&self) -> Result<Settings> {
        let clients = self.list(self.backend.fetch_clients(), "fetch clients")?;
        if !clients.is_empty() {
            self.store.store_clients(&clients);
        }
        Ok(Settings::from_config(&self.cfg, clients))
    }

    fn session(&self, client_id: &str) -> Result<ShareSession> {
        let mut session = ShareSession::new(self.settings()?, self.store.clone())
            .with_print_delay(self.cfg.print.delay)
            .with_capture_scale(self.cfg.share.image_scale);
        session.open(client_id)?;
        Ok(session)
    }

    fn desktop(&self) -> Result<SystemDesktop> {
        SystemDesktop::new(self.cfg.share.download_dir.clone())
    }
}

pub fn run(cli: Cli) -> Result<()> {
    if let Command::Login { url, key } = &cli.command {
        let path = config::save_backend_credentials(cli.config.clone(), url, key)?;
        println!("Saved backend credentials to {}", friendly_path(&path));
        return Ok(());
    }

    let cfg = config::load(config::LoadOptions {
        config_file: cli.config.clone(),
        env_prefix: None,
    })
    .context("load config")?;
    let store = cache::Store::open(cache::Options {
        path: cfg.cache.path.clone(),
    })
    .context("open cache")?;
    let offline = cli.offline.then(|| {
        debug!("backend: offline, seeding from local cache");
        Arc::new(MemoryGateway::seeded(
            store.cached_clients(),
            store.all_posts(),
        ))
    });
    let backend: Arc<dyn CalendarBackend> = match offline.as_ref() {
        Some(memory) => Arc::clone(memory) as Arc<dyn CalendarBackend>,
        None => Arc::new(rest_backend(&cfg)?),
    };
    let ctx = Runtime {
        cfg,
        store,
        backend,
        offline,
        lenient: cli.lenient,
    };

    match cli.command {
        Command::Clients => {
            for client in ctx.settings()?.clients {
                print_client(&client);
            }
        }
        Command::Client { id, password } => {
            let found = ctx.single(
                ctx.backend.fetch_client_by_id(&id, password.as_deref()),
                "fetch client",
            )?;
            match found {
                Some(client) => print_client(&client),
                None => println!("No client found."),
            }
        }
        Command::Posts { client_id, local } => {
            let posts = if local {
                ctx.store.posts_for_client(&client_id)
            } else {
                ctx.list(ctx.backend.fetch_client_posts(&client_id), "fetch posts")?
            };
            if posts.is_empty() {
                println!("No posts scheduled.");
            }
            for post in &posts {
                print_post(post);
            }
        }
        Command::SavePost { file } => {
            let post: ScheduledPost = read_json(&file)?;
            if let Some(saved) = ctx.single(ctx.backend.save_post(&post), "save post")? {
                ctx.persist_offline();
                println!("{}", serde_json::to_string_pretty(&saved)?);
            }
        }
        Command::SaveClient { file } => {
            let client: Client = read_json(&file)?;
            if let Some(saved) = ctx.single(ctx.backend.save_client(&client), "save client")? {
                ctx.persist_offline();
                print_client(&saved);
            }
        }
        Command::DeletePost { id } => {
            if ctx.single(ctx.backend.delete_post(id), "delete post")?.is_some() {
                ctx.persist_offline();
                println!("Deleted post {id}.");
            }
        }
        Command::Sync { client_id } => {
            // strict even with --lenient; a failed fetch leaves the cache untouched
            let posts = ctx
                .backend
                .fetch_client_posts(&client_id)
                .with_context(|| format!("sync: fetch posts for {client_id}"))?;
            let count = posts.len();
            ctx.store.merge_client_posts(&client_id, posts);
            println!("Cached {count} posts for {client_id}.");
        }
        Command::Link { client_id } => {
            let session = ctx.session(&client_id)?;
            let link = session
                .share_link()
                .ok_or_else(|| anyhow!("client {client_id} has no id to link to"))?;
            println!("{link}");
        }
        Command::Share {
            client_id,
            channel,
            preview,
        } => {
            let channel: Channel = channel.parse()?;
            let mut session = ctx.session(&client_id)?;
            if preview {
                session.select_tab(Tab::Preview);
            }
            let desktop = ctx.desktop()?;
            match dispatch::dispatch(channel, &session, &desktop, &ConsoleNotifier)? {
                Some(Dispatched::Downloaded(path)) => println!("{}", friendly_path(&path)),
                Some(Dispatched::Opened(url) | Dispatched::Composed(url)) => {
                    debug!(%url, "share: intent url")
                }
                Some(Dispatched::Copied(link)) => println!("{link}"),
                None => {}
            }
        }
        Command::Preview { client_id, out } => {
            let mut session = ctx.session(&client_id)?;
            session.select_tab(Tab::Preview);
            let client_name = session
                .client()
                .map(|client| client.name.clone())
                .unwrap_or_default();
            let image = session
                .generated_image()
                .ok_or_else(|| anyhow!("preview: rendering failed for {client_id}"))?;
            let path = match out {
                Some(path) => {
                    fs::write(&path, &image.png)
                        .with_context(|| format!("preview: write {}", path.display()))?;
                    path
                }
                None => ctx
                    .desktop()?
                    .save_download(&dispatch::image_filename(&client_name), &image.png)?,
            };
            println!(
                "Saved {}x{} preview to {}",
                image.width,
                image.height,
                friendly_path(&path)
            );
        }
        Command::Print { client_id } => {
            let session = ctx.session(&client_id)?;
            let desktop = ctx.desktop()?;
            if let Some(path) = session.print(&desktop, &ConsoleNotifier)? {
                println!("Opened {}", friendly_path(&path));
            }
        }
        Command::Login { .. } => unreachable!("handled before loading config"),
    }

    Ok(())
}

fn rest_backend(cfg: &Config) -> Result<RestGateway> {
    RestGateway::new(GatewayConfig {
        url: cfg.backend.url.clone(),
        api_key: cfg.backend.api_key.clone(),
        client_info: cfg.backend.client_info.clone(),
        timeout: cfg.backend.timeout,
        http_client: None,
    })
    .context("backend not configured; run `agenda-share login` or pass --offline")
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parse {}", path.display()))
}

fn print_client(client: &Client) {
    println!(
        "{}\t{}\t{}",
        client.id.as_deref().unwrap_or("-"),
        client.name,
        client.theme_color
    );
}

fn print_post(post: &ScheduledPost) {
    let id = post
        .id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    let done = if post.completed { "x" } else { " " };
    println!(
        "{id}\t[{done}]\t{}\t{}\t{}",
        post.date_label(),
        post.post_type,
        post.title
    );
}

fn friendly_path(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            let mut display = String::from("~");
            if !stripped.as_os_str().is_empty() {
                display.push_str(&format!("/{}", stripped.display()));
            }
            return display;
        }
    }
    path.display().to_string()
}

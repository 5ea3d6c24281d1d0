use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};
use url::Url;

use crate::session::{ShareArtifact, ShareSession};
use crate::settings::encode_component;

static FILENAME_UNSAFE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\s/\\:*?"<>|]+"#).expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    WhatsApp,
    Facebook,
    Email,
    Clipboard,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::WhatsApp,
        Channel::Facebook,
        Channel::Email,
        Channel::Clipboard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::WhatsApp => "whatsapp",
            Channel::Facebook => "facebook",
            Channel::Email => "email",
            Channel::Clipboard => "clipboard",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Channel::WhatsApp => "WhatsApp",
            Channel::Facebook => "Facebook",
            Channel::Email => "email",
            Channel::Clipboard => "clipboard",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Channel::ALL
            .into_iter()
            .find(|channel| channel.as_str() == wanted)
            .ok_or_else(|| anyhow!("unknown channel {s:?} (expected whatsapp, facebook, email or clipboard)"))
    }
}

/// Side effect a channel action resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareAction {
    Download { filename: String, png: Vec<u8> },
    OpenUrl(String),
    Compose(String),
    CopyText(String),
}

/// Result of a dispatched action, as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    Downloaded(PathBuf),
    Opened(String),
    Composed(String),
    Copied(String),
}

/// Host capabilities used to deliver share actions.
pub trait Desktop {
    fn save_download(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf>;
    fn open_url(&self, url: &str) -> Result<()>;
    fn copy_text(&self, text: &str) -> Result<()>;
    fn open_document(&self, path: &Path) -> Result<()>;
}

/// User-facing notifications.
pub trait Notifier {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
}

/// `agenda_<name>.png`, with the name lowercased and runs of whitespace or
/// path-unsafe characters collapsed to underscores.
pub fn image_filename(client_name: &str) -> String {
    let snake = FILENAME_UNSAFE.replace_all(client_name, "_").to_lowercase();
    format!("agenda_{snake}.png")
}

fn share_message(client_name: &str) -> String {
    format!("Check out the posting schedule for {client_name}")
}

/// Decides what `channel` should do given the session's current state.
/// Returns `None` when no client is open.
pub fn plan(channel: Channel, session: &ShareSession) -> Option<ShareAction> {
    let client = session.client()?;

    let link = match session.artifact()? {
        ShareArtifact::Image(image) => {
            return Some(ShareAction::Download {
                filename: image_filename(&client.name),
                png: image.png.clone(),
            })
        }
        ShareArtifact::Link(link) => link,
    };
    let message = share_message(&client.name);
    let action = match channel {
        Channel::WhatsApp => ShareAction::OpenUrl(format!(
            "https://wa.me/?text={}",
            encode_component(&format!("{message}: {link}"))
        )),
        Channel::Facebook => ShareAction::OpenUrl(format!(
            "https://www.facebook.com/sharer/sharer.php?u={}&quote={}",
            encode_component(&link),
            encode_component(&message)
        )),
        Channel::Email => {
            let subject = format!("Posting schedule for {}", client.name);
            let body = format!(
                "Hello,\n\nI'd like to share the posting schedule for {}.\n\nOpen: {}\n\nBest regards,\n{}",
                client.name,
                link,
                session.settings().display_company()
            );
            ShareAction::Compose(format!(
                "mailto:?subject={}&body={}",
                encode_component(&subject),
                encode_component(&body)
            ))
        }
        Channel::Clipboard => ShareAction::CopyText(link),
    };
    Some(action)
}

fn success_message(channel: Channel, action: &ShareAction) -> String {
    match (action, channel) {
        (ShareAction::Download { .. }, Channel::Clipboard) => "Image saved for sharing".to_string(),
        (ShareAction::Download { .. }, channel) => {
            format!("Image saved for sharing via {}", channel.display_name())
        }
        (ShareAction::Compose(_), _) => "Ready to send by email".to_string(),
        (ShareAction::CopyText(_), _) => "Link copied to clipboard".to_string(),
        (ShareAction::OpenUrl(_), channel) => {
            format!("Link ready to share via {}", channel.display_name())
        }
    }
}

/// Plans and performs `channel`'s action, then reports success.
///
/// Browser and clipboard failures are logged and still reported as success;
/// only a failed image download is returned as an error.
pub fn dispatch(
    channel: Channel,
    session: &ShareSession,
    desktop: &dyn Desktop,
    notifier: &dyn Notifier,
) -> Result<Option<Dispatched>> {
    let Some(action) = plan(channel, session) else {
        return Ok(None);
    };
    let message = success_message(channel, &action);

    let dispatched = match action {
        ShareAction::Download { filename, png } => {
            let path = desktop
                .save_download(&filename, &png)
                .with_context(|| format!("dispatch: save {filename}"))?;
            Dispatched::Downloaded(path)
        }
        ShareAction::OpenUrl(url) => {
            if let Err(err) = desktop.open_url(&url) {
                warn!(%channel, error = %err, "dispatch: failed to open share url");
            }
            Dispatched::Opened(url)
        }
        ShareAction::Compose(url) => {
            if let Err(err) = desktop.open_url(&url) {
                warn!(%channel, error = %err, "dispatch: failed to open mail client");
            }
            Dispatched::Composed(url)
        }
        ShareAction::CopyText(text) => {
            if let Err(err) = desktop.copy_text(&text) {
                warn!(%channel, error = %err, "dispatch: failed to copy link");
            }
            Dispatched::Copied(text)
        }
    };

    info!(%channel, "dispatch: {}", message);
    notifier.success(&message);
    Ok(Some(dispatched))
}

/// Real desktop integration: default browser, system clipboard, and a
/// downloads directory.
pub struct SystemDesktop {
    download_dir: PathBuf,
}

impl SystemDesktop {
    pub fn new(download_dir: Option<PathBuf>) -> Result<Self> {
        let download_dir = match download_dir {
            Some(dir) => dir,
            None => std::env::current_dir().context("dispatch: resolve current directory")?,
        };
        Ok(Self { download_dir })
    }
}

impl Desktop for SystemDesktop {
    fn save_download(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let name = Path::new(filename)
            .file_name()
            .ok_or_else(|| anyhow!("dispatch: invalid download name {filename:?}"))?;
        fs::create_dir_all(&self.download_dir).with_context(|| {
            format!(
                "dispatch: create download directory {}",
                self.download_dir.display()
            )
        })?;
        let path = self.download_dir.join(name);
        fs::write(&path, bytes)
            .with_context(|| format!("dispatch: write {}", path.display()))?;
        Ok(path)
    }

    fn open_url(&self, url: &str) -> Result<()> {
        webbrowser::open(url).with_context(|| format!("dispatch: open {url}"))
    }

    fn copy_text(&self, text: &str) -> Result<()> {
        let mut clipboard =
            arboard::Clipboard::new().map_err(|err| anyhow!("create clipboard context: {}", err))?;
        clipboard
            .set_text(text.to_string())
            .map_err(|err| anyhow!("copy share link: {}", err))
    }

    fn open_document(&self, path: &Path) -> Result<()> {
        if !path.is_file() {
            bail!("dispatch: document {} does not exist", path.display());
        }
        let url = Url::from_file_path(path)
            .map_err(|_| anyhow!("dispatch: {} is not an absolute path", path.display()))?;
        webbrowser::open(url.as_str()).with_context(|| format!("dispatch: open {url}"))
    }
}

/// Prints notifications to the terminal.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn success(&self, message: &str) {
        println!("{message}");
    }

    fn error(&self, message: &str) {
        eprintln!("error: {message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_is_snake_cased() {
        assert_eq!(image_filename("Acme"), "agenda_acme.png");
        assert_eq!(image_filename("Big  Coffee\tCo"), "agenda_big_coffee_co.png");
        assert_eq!(image_filename("AC/DC Records"), "agenda_ac_dc_records.png");
        assert_eq!(image_filename(r"Back\Slash: Co?"), "agenda_back_slash_co_.png");
    }

    #[test]
    fn channels_parse() {
        assert_eq!("WhatsApp".parse::<Channel>().unwrap(), Channel::WhatsApp);
        assert_eq!(" email ".parse::<Channel>().unwrap(), Channel::Email);
        assert!("telegram".parse::<Channel>().is_err());
        for channel in Channel::ALL {
            assert_eq!(channel.to_string().parse::<Channel>().unwrap(), channel);
        }
    }

    #[test]
    fn download_messages_name_the_channel() {
        let download = ShareAction::Download {
            filename: "a.png".into(),
            png: Vec::new(),
        };
        assert_eq!(
            success_message(Channel::Facebook, &download),
            "Image saved for sharing via Facebook"
        );
        assert_eq!(
            success_message(Channel::Clipboard, &download),
            "Image saved for sharing"
        );
    }

    #[test]
    fn system_desktop_writes_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let desktop = SystemDesktop::new(Some(dir.path().join("dl"))).unwrap();
        let path = desktop.save_download("agenda_acme.png", b"png").unwrap();
        assert_eq!(path, dir.path().join("dl").join("agenda_acme.png"));
        assert_eq!(fs::read(path).unwrap(), b"png");
    }
}

use std::path::PathBuf;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tracing::{debug, info, warn};

use crate::cache::Store;
use crate::dispatch::{Desktop, Notifier};
use crate::model::{Client, ScheduledPost};
use crate::render::{self, AgendaLayout, PrintInput, RasterImage, CAPTURE_SCALE};
use crate::settings::Settings;

const DEFAULT_PRINT_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Link,
    Preview,
}

#[derive(Debug, thiserror::Error)]
pub enum ShareError {
    #[error("client {0} is not known")]
    UnknownClient(String),
    #[error("no client is open for sharing")]
    NotOpen,
    #[error("pop-up blocked: {0}")]
    PopupBlocked(String),
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// What the session can currently hand to a share channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareArtifact<'a> {
    Link(String),
    Image(&'a RasterImage),
}

#[derive(Debug)]
struct OpenState {
    client: Client,
    posts: Vec<ScheduledPost>,
    tab: Tab,
    image: Option<RasterImage>,
    captures: usize,
}

/// One open/close cycle of the share dialog for a single client.
///
/// The preview image is captured at most once per open and forgotten on
/// close or reopen, even if the underlying posts change in between.
pub struct ShareSession {
    settings: Settings,
    store: Store,
    print_delay: Duration,
    capture_scale: u32,
    state: Option<OpenState>,
}

impl ShareSession {
    pub fn new(settings: Settings, store: Store) -> Self {
        Self {
            settings,
            store,
            print_delay: DEFAULT_PRINT_DELAY,
            capture_scale: CAPTURE_SCALE,
            state: None,
        }
    }

    pub fn with_print_delay(mut self, delay: Duration) -> Self {
        self.print_delay = delay;
        self
    }

    /// Pixel density of preview captures. Zero makes every capture fail.
    pub fn with_capture_scale(mut self, scale: u32) -> Self {
        self.capture_scale = scale;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn open(&mut self, client_id: &str) -> Result<(), ShareError> {
        let client = self
            .settings
            .find_client(client_id)
            .cloned()
            .ok_or_else(|| ShareError::UnknownClient(client_id.to_string()))?;
        let posts = self.store.posts_for_client(client_id);
        info!(client_id, posts = posts.len(), "share: session opened");
        self.state = Some(OpenState {
            client,
            posts,
            tab: Tab::Link,
            image: None,
            captures: 0,
        });
        Ok(())
    }

    pub fn close(&mut self) {
        if self.state.take().is_some() {
            debug!("share: session closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    pub fn client(&self) -> Option<&Client> {
        self.state.as_ref().map(|state| &state.client)
    }

    pub fn posts(&self) -> &[ScheduledPost] {
        self.state
            .as_ref()
            .map(|state| state.posts.as_slice())
            .unwrap_or_default()
    }

    pub fn active_tab(&self) -> Tab {
        self.state
            .as_ref()
            .map(|state| state.tab)
            .unwrap_or_default()
    }

    /// Switches tabs. The first switch to `Preview` in a session renders
    /// the image; later ones reuse it.
    pub fn select_tab(&mut self, tab: Tab) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        state.tab = tab;
        if tab != Tab::Preview || state.image.is_some() {
            return;
        }

        let layout = AgendaLayout::measure(&state.posts);
        state.captures += 1;
        match render::capture(&layout, state.client.theme_rgba(), self.capture_scale) {
            Ok(image) => {
                debug!(
                    width = image.width,
                    height = image.height,
                    "share: preview captured"
                );
                state.image = Some(image);
            }
            Err(err) => warn!(error = %err, "share: preview capture failed"),
        }
    }

    pub fn generated_image(&self) -> Option<&RasterImage> {
        self.state.as_ref().and_then(|state| state.image.as_ref())
    }

    /// Captures attempted since the session was last opened.
    pub fn capture_count(&self) -> usize {
        self.state.as_ref().map(|state| state.captures).unwrap_or(0)
    }

    pub fn share_link(&self) -> Option<String> {
        let id = self.client()?.id.as_deref()?;
        Some(self.settings.client_share_link(id))
    }

    /// The image when previewing one, the link otherwise.
    pub fn artifact(&self) -> Option<ShareArtifact<'_>> {
        if self.active_tab() == Tab::Preview {
            if let Some(image) = self.generated_image() {
                return Some(ShareArtifact::Image(image));
            }
        }
        self.share_link().map(ShareArtifact::Link)
    }

    pub fn print_document(&self, today: NaiveDate) -> Option<String> {
        let state = self.state.as_ref()?;
        Some(render::render_document(&PrintInput {
            client: &state.client,
            posts: &state.posts,
            company_name: self.settings.display_company(),
            date: today,
            print_delay: self.print_delay,
        }))
    }

    /// Opens the printable agenda in the browser. Does nothing when no
    /// client is open.
    pub fn print(
        &self,
        desktop: &dyn Desktop,
        notifier: &dyn Notifier,
    ) -> Result<Option<PathBuf>, ShareError> {
        let Some(html) = self.print_document(Local::now().date_naive()) else {
            return Ok(None);
        };
        let path = render::print::write_temp_document(&html)?;
        if let Err(err) = desktop.open_document(&path) {
            warn!(error = %err, path = %path.display(), "share: print window blocked");
            notifier.error(
                "A pop-up blocker prevented printing. Please disable it and try again.",
            );
            return Err(ShareError::PopupBlocked(err.to_string()));
        }
        info!(path = %path.display(), "share: print document opened");
        Ok(Some(path))
    }
}

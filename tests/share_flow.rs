use std::cell::RefCell;
use std::path::{Path, PathBuf};

use agenda_share::cache::{Options, Store};
use agenda_share::dispatch::{self, Channel, Desktop, Dispatched, Notifier, SystemDesktop};
use agenda_share::model::{Client, ScheduledPost};
use agenda_share::render::{AgendaLayout, CAPTURE_SCALE};
use agenda_share::session::{ShareError, ShareSession, Tab};
use agenda_share::settings::Settings;
use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Download(String),
    Open(String),
    Copy(String),
    Document(PathBuf),
}

#[derive(Default)]
struct RecordingDesktop {
    events: RefCell<Vec<Event>>,
    fail_open: bool,
}

impl RecordingDesktop {
    fn failing() -> Self {
        Self {
            fail_open: true,
            ..Default::default()
        }
    }

    fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }
}

impl Desktop for RecordingDesktop {
    fn save_download(&self, filename: &str, _bytes: &[u8]) -> Result<PathBuf> {
        self.events
            .borrow_mut()
            .push(Event::Download(filename.to_string()));
        Ok(PathBuf::from("/downloads").join(filename))
    }

    fn open_url(&self, url: &str) -> Result<()> {
        self.events.borrow_mut().push(Event::Open(url.to_string()));
        if self.fail_open {
            return Err(anyhow!("no browser"));
        }
        Ok(())
    }

    fn copy_text(&self, text: &str) -> Result<()> {
        self.events.borrow_mut().push(Event::Copy(text.to_string()));
        Ok(())
    }

    fn open_document(&self, path: &Path) -> Result<()> {
        if self.fail_open {
            return Err(anyhow!("window blocked"));
        }
        self.events
            .borrow_mut()
            .push(Event::Document(path.to_path_buf()));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    successes: RefCell<Vec<String>>,
    errors: RefCell<Vec<String>>,
}

impl Notifier for RecordingNotifier {
    fn success(&self, message: &str) {
        self.successes.borrow_mut().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.errors.borrow_mut().push(message.to_string());
    }
}

fn post(id: i64, client: &str, title: &str) -> ScheduledPost {
    ScheduledPost {
        id: Some(id),
        date: format!("2024-06-0{id}"),
        day_of_week: "Monday".into(),
        title: title.into(),
        post_type: "Feed".into(),
        text: format!("{title} body"),
        client_id: Some(client.into()),
        social_networks: vec!["instagram".into()],
        ..Default::default()
    }
}

fn acme_session() -> (TempDir, ShareSession) {
    session_for(Client::new("Acme").with_id("acme").with_theme("#112233"))
}

fn session_for(acme: Client) -> (TempDir, ShareSession) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(Options {
        path: Some(dir.path().join("cache.db")),
    })
    .unwrap();
    store.store_posts(&[
        post(1, "acme", "First"),
        post(2, "globex", "Elsewhere"),
        post(3, "acme", "Second"),
    ]);
    let settings = Settings {
        company_name: "Pixel Studio".into(),
        share_base_url: "https://agenda.example.com".into(),
        clients: vec![acme, Client::new("Globex").with_id("globex")],
    };
    let mut session = ShareSession::new(settings, store);
    session.open("acme").unwrap();
    (dir, session)
}

#[test]
fn preview_print_and_reopen() {
    let (_dir, mut session) = acme_session();
    assert_eq!(session.posts().len(), 2);

    session.select_tab(Tab::Preview);
    let expected = AgendaLayout::measure(session.posts());
    let image = session.generated_image().expect("preview image");
    assert_eq!(image.width, expected.width * CAPTURE_SCALE);
    assert_eq!(image.height, expected.height * CAPTURE_SCALE);

    let decoded = image::load_from_memory(&image.png).unwrap().to_rgba8();
    assert_eq!(decoded.get_pixel(0, 0).0, [255, 255, 255, 255]);
    assert_eq!(session.capture_count(), 1);

    session.open("acme").unwrap();
    session.select_tab(Tab::Preview);
    session.select_tab(Tab::Link);
    session.select_tab(Tab::Preview);
    assert_eq!(session.capture_count(), 1);

    let html = session
        .print_document(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
        .unwrap();
    assert!(html.contains(".agenda-header h1 {\n        color: #112233;"));
    assert_eq!(html.matches(r#"<div class="card">"#).count(), 2);
    let first = html.find("First").unwrap();
    let second = html.find("Second").unwrap();
    assert!(first < second);
    assert!(!html.contains("Elsewhere"));
    assert!(html.contains("01/06/2024"));
}

#[test]
fn preview_tab_downloads_on_every_channel() {
    let (_dir, mut session) = acme_session();
    session.select_tab(Tab::Preview);
    let desktop = RecordingDesktop::default();
    let notifier = RecordingNotifier::default();

    for channel in Channel::ALL {
        let outcome = dispatch::dispatch(channel, &session, &desktop, &notifier).unwrap();
        assert!(matches!(outcome, Some(Dispatched::Downloaded(_))));
    }

    let events = desktop.events();
    assert_eq!(events.len(), 4);
    assert!(events
        .iter()
        .all(|event| *event == Event::Download("agenda_acme.png".into())));
    assert_eq!(
        notifier.successes.borrow()[0],
        "Image saved for sharing via WhatsApp"
    );
}

#[test]
fn link_tab_fires_intents() {
    let (_dir, session) = acme_session();
    let desktop = RecordingDesktop::default();
    let notifier = RecordingNotifier::default();

    for channel in Channel::ALL {
        dispatch::dispatch(channel, &session, &desktop, &notifier).unwrap();
    }

    let events = desktop.events();
    assert!(!events.iter().any(|e| matches!(e, Event::Download(_))));
    match &events[0] {
        Event::Open(url) => assert!(url.starts_with("https://wa.me/?text=")),
        other => panic!("unexpected {other:?}"),
    }
    match &events[1] {
        Event::Open(url) => assert!(url.contains(
            "sharer.php?u=https%3A%2F%2Fagenda.example.com%2Fclient%2Facme"
        )),
        other => panic!("unexpected {other:?}"),
    }
    match &events[2] {
        Event::Open(url) => {
            assert!(url.starts_with("mailto:?subject="));
            assert!(url.contains("Pixel%20Studio"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(
        events[3],
        Event::Copy("https://agenda.example.com/client/acme".into())
    );
    assert_eq!(
        notifier.successes.borrow().last().map(String::as_str),
        Some("Link copied to clipboard")
    );
}

#[test]
fn browser_failure_still_reports_success() {
    let (_dir, session) = acme_session();
    let desktop = RecordingDesktop::failing();
    let notifier = RecordingNotifier::default();

    let outcome = dispatch::dispatch(Channel::Facebook, &session, &desktop, &notifier).unwrap();
    assert!(matches!(outcome, Some(Dispatched::Opened(_))));
    assert_eq!(
        notifier.successes.borrow().as_slice(),
        ["Link ready to share via Facebook".to_string()]
    );
    assert!(notifier.errors.borrow().is_empty());
}

#[test]
fn blocked_print_window_is_reported() {
    let (_dir, session) = acme_session();
    let notifier = RecordingNotifier::default();

    let err = session
        .print(&RecordingDesktop::failing(), &notifier)
        .unwrap_err();
    assert!(matches!(err, ShareError::PopupBlocked(_)));
    assert_eq!(notifier.errors.borrow().len(), 1);

    let desktop = RecordingDesktop::default();
    let path = session.print(&desktop, &notifier).unwrap().unwrap();
    assert_eq!(desktop.events(), vec![Event::Document(path.clone())]);
    let html = std::fs::read_to_string(&path).unwrap();
    assert!(html.contains("window.print()"));
    let _ = std::fs::remove_file(path);
}

#[test]
fn closed_session_dispatches_nothing() {
    let (_dir, mut session) = acme_session();
    session.close();
    let desktop = RecordingDesktop::default();
    let notifier = RecordingNotifier::default();

    let outcome = dispatch::dispatch(Channel::Email, &session, &desktop, &notifier).unwrap();
    assert!(outcome.is_none());
    assert!(desktop.events().is_empty());
    assert!(notifier.successes.borrow().is_empty());
    assert!(session.print(&desktop, &notifier).unwrap().is_none());
}

#[test]
fn failed_capture_falls_back_to_link_intents() {
    let (_dir, session) = acme_session();
    let mut session = session.with_capture_scale(0);
    session.open("acme").unwrap();
    session.select_tab(Tab::Preview);
    assert_eq!(session.active_tab(), Tab::Preview);
    assert!(session.generated_image().is_none());

    let desktop = RecordingDesktop::default();
    let notifier = RecordingNotifier::default();
    let outcome = dispatch::dispatch(Channel::WhatsApp, &session, &desktop, &notifier).unwrap();
    assert!(matches!(outcome, Some(Dispatched::Opened(_))));
    match desktop.events().as_slice() {
        [Event::Open(url)] => assert!(url.starts_with("https://wa.me/?text=")),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(
        notifier.successes.borrow().as_slice(),
        ["Link ready to share via WhatsApp".to_string()]
    );
}

#[test]
fn unsafe_client_name_still_downloads_into_the_download_dir() {
    let (dir, mut session) = session_for(Client::new("AC/DC Records").with_id("acme"));
    session.select_tab(Tab::Preview);
    let downloads = dir.path().join("downloads");
    let desktop = SystemDesktop::new(Some(downloads.clone())).unwrap();
    let notifier = RecordingNotifier::default();

    let outcome = dispatch::dispatch(Channel::Email, &session, &desktop, &notifier).unwrap();
    let expected = downloads.join("agenda_ac_dc_records.png");
    assert_eq!(outcome, Some(Dispatched::Downloaded(expected.clone())));
    let bytes = std::fs::read(expected).unwrap();
    assert_eq!(&bytes[..4], b"\x89PNG");
}

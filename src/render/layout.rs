//! Geometry of the shareable agenda region, in logical pixels.
//!
//! The region is a single column of cards, one per post, laid out the same
//! way the preview shows them. Lines are wrapped by character count; each
//! run's width is an estimate from that count and the raster clips to the
//! card.

use crate::model::ScheduledPost;

pub const REGION_WIDTH: u32 = 400;
pub const MIN_REGION_HEIGHT: u32 = 280;
pub const REGION_PADDING: u32 = 16;
pub const CARD_GAP: u32 = 16;
pub const CARD_PADDING: u32 = 16;
pub const SECTION_GAP: u32 = 8;
pub const BADGE_HEIGHT: u32 = 28;
pub const TITLE_LINE_HEIGHT: u32 = 24;
pub const TAG_HEIGHT: u32 = 22;
pub const TEXT_LINE_HEIGHT: u32 = 20;
pub const ICON_SIZE: u32 = 20;
pub const ICON_SPACING: u32 = 8;

const CHAR_WIDTH: u32 = 8;
const TITLE_CHAR_WIDTH: u32 = 10;
const BADGE_CHAR_WIDTH: u32 = 7;
const PLACEHOLDER: &str = "No posts scheduled";

fn content_width() -> u32 {
    REGION_WIDTH - 2 * REGION_PADDING - 2 * CARD_PADDING
}

fn chars_per_line(char_width: u32) -> usize {
    (content_width() / char_width) as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }
}

/// A label or wrapped line together with the box it occupies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRun {
    pub bounds: Rect,
    pub text: String,
}

impl TextRun {
    fn new(bounds: Rect, text: impl Into<String>) -> Self {
        Self {
            bounds,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardLayout {
    pub bounds: Rect,
    pub badge: TextRun,
    pub title_lines: Vec<TextRun>,
    pub tag: Option<TextRun>,
    pub text_lines: Vec<TextRun>,
    pub icons: Vec<Rect>,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgendaLayout {
    pub width: u32,
    pub height: u32,
    pub cards: Vec<CardLayout>,
    /// "No posts" line, present only for an empty agenda.
    pub placeholder: Option<TextRun>,
}

impl AgendaLayout {
    pub fn measure(posts: &[ScheduledPost]) -> Self {
        if posts.is_empty() {
            let width = bar_width(PLACEHOLDER.len(), CHAR_WIDTH);
            let placeholder = TextRun::new(
                Rect::new(
                    (REGION_WIDTH - width) / 2,
                    MIN_REGION_HEIGHT / 2 - TEXT_LINE_HEIGHT / 2,
                    width,
                    TEXT_LINE_HEIGHT,
                ),
                PLACEHOLDER,
            );
            return Self {
                width: REGION_WIDTH,
                height: MIN_REGION_HEIGHT,
                cards: Vec::new(),
                placeholder: Some(placeholder),
            };
        }

        let mut cards = Vec::with_capacity(posts.len());
        let mut y = REGION_PADDING;
        for post in posts {
            let card = measure_card(post, y);
            y = card.bounds.y + card.bounds.height + CARD_GAP;
            cards.push(card);
        }
        let height = (y - CARD_GAP + REGION_PADDING).max(MIN_REGION_HEIGHT);

        Self {
            width: REGION_WIDTH,
            height,
            cards,
            placeholder: None,
        }
    }
}

fn bar_width(chars: usize, char_width: u32) -> u32 {
    (chars as u32 * char_width).clamp(char_width, content_width())
}

fn measure_card(post: &ScheduledPost, top: u32) -> CardLayout {
    let x = REGION_PADDING + CARD_PADDING;
    let mut y = top + CARD_PADDING;

    let label = post.date_label();
    let badge_width =
        (label.chars().count() as u32 * BADGE_CHAR_WIDTH + 32).min(content_width());
    let badge = TextRun::new(Rect::new(x, y, badge_width, BADGE_HEIGHT), label);
    y += BADGE_HEIGHT + SECTION_GAP;

    let mut title_lines = Vec::new();
    for line in textwrap::wrap(post.title.trim(), chars_per_line(TITLE_CHAR_WIDTH)) {
        let chars = line.chars().count();
        title_lines.push(TextRun::new(
            Rect::new(x, y, bar_width(chars, TITLE_CHAR_WIDTH), TITLE_LINE_HEIGHT),
            line,
        ));
        y += TITLE_LINE_HEIGHT;
    }
    if !title_lines.is_empty() {
        y += SECTION_GAP;
    }

    let tag = if post.post_type.trim().is_empty() {
        None
    } else {
        let label = post.post_type.trim();
        let width = (bar_width(label.chars().count(), 7) + 24).min(content_width());
        let run = TextRun::new(Rect::new(x, y, width, TAG_HEIGHT), label);
        y += TAG_HEIGHT + SECTION_GAP;
        Some(run)
    };

    let mut text_lines = Vec::new();
    if !post.text.trim().is_empty() {
        for line in textwrap::wrap(post.text.trim_end(), chars_per_line(CHAR_WIDTH)) {
            let line = line.trim();
            if !line.is_empty() {
                text_lines.push(TextRun::new(
                    Rect::new(
                        x,
                        y,
                        bar_width(line.chars().count(), CHAR_WIDTH),
                        TEXT_LINE_HEIGHT,
                    ),
                    line,
                ));
            }
            y += TEXT_LINE_HEIGHT;
        }
        y += SECTION_GAP;
    }

    let mut icons = Vec::new();
    if !post.social_networks.is_empty() {
        let mut icon_x = x;
        for _ in &post.social_networks {
            if icon_x + ICON_SIZE > x + content_width() {
                break;
            }
            icons.push(Rect::new(icon_x, y, ICON_SIZE, ICON_SIZE));
            icon_x += ICON_SIZE + ICON_SPACING;
        }
        y += ICON_SIZE + SECTION_GAP;
    }

    // the last section's trailing gap becomes part of the bottom padding
    let bottom = y - SECTION_GAP + CARD_PADDING;
    CardLayout {
        bounds: Rect::new(
            REGION_PADDING,
            top,
            REGION_WIDTH - 2 * REGION_PADDING,
            bottom - top,
        ),
        badge,
        title_lines,
        tag,
        text_lines,
        icons,
        completed: post.completed,
    }
}

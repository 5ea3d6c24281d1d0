use image::Rgba;
use serde::{Deserialize, Serialize};

pub const DEFAULT_THEME_COLOR: &str = "#dc2626";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default = "default_theme_color")]
    pub theme_color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Client {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            theme_color: default_theme_color(),
            password: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_theme(mut self, color: impl Into<String>) -> Self {
        self.theme_color = color.into();
        self
    }

    /// Theme colour as RGBA, falling back to the default accent when the
    /// stored value is not a `#rgb` or `#rrggbb` hex string.
    pub fn theme_rgba(&self) -> Rgba<u8> {
        parse_hex_color(&self.theme_color)
            .or_else(|| parse_hex_color(DEFAULT_THEME_COLOR))
            .unwrap_or(Rgba([220, 38, 38, 255]))
    }
}

fn default_theme_color() -> String {
    DEFAULT_THEME_COLOR.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledPost {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub day: String,
    #[serde(default)]
    pub day_of_week: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub post_type: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default)]
    pub social_networks: Vec<String>,
}

impl ScheduledPost {
    pub fn belongs_to(&self, client_id: &str) -> bool {
        self.client_id.as_deref() == Some(client_id)
    }

    /// Text shown on the card's date badge.
    pub fn date_label(&self) -> String {
        match (self.date.trim(), self.day_of_week.trim()) {
            (date, "") => date.to_string(),
            ("", weekday) => weekday.to_string(),
            (date, weekday) => format!("{date} - {weekday}"),
        }
    }
}

pub fn parse_hex_color(value: &str) -> Option<Rgba<u8>> {
    let hex = value.trim().strip_prefix('#')?;
    if !hex.is_ascii() {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        6 => Some(Rgba([
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
            255,
        ])),
        3 => {
            let mut out = [0u8; 4];
            for (idx, ch) in hex.chars().enumerate() {
                let v = ch.to_digit(16)? as u8;
                out[idx] = v * 17;
            }
            out[3] = 255;
            Some(Rgba(out))
        }
        _ => None,
    }
}

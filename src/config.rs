use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV_PREFIX: &str = "AGENDA";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub share: ShareConfig,
    #[serde(default)]
    pub print: PrintConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_client_info")]
    pub client_info: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            client_info: default_client_info(),
            timeout: default_timeout(),
        }
    }
}

fn default_client_info() -> String {
    "socialcalendar-app".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShareConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default = "default_download_dir")]
    pub download_dir: Option<PathBuf>,
    /// Pixel density of the shared agenda image.
    #[serde(default = "default_image_scale")]
    pub image_scale: u32,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            company_name: String::new(),
            download_dir: default_download_dir(),
            image_scale: default_image_scale(),
        }
    }
}

fn default_base_url() -> String {
    "https://agenda.example.com".into()
}

fn default_image_scale() -> u32 {
    2
}

fn default_download_dir() -> Option<PathBuf> {
    dirs::download_dir().or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrintConfig {
    #[serde(default = "default_print_delay", with = "humantime_serde")]
    pub delay: Duration,
}

impl Default for PrintConfig {
    fn default() -> Self {
        Self {
            delay: default_print_delay(),
        }
    }
}

fn default_print_delay() -> Duration {
    Duration::from_millis(500)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CacheConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    cfg = merge_env(cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.backend.url.is_empty() {
        base.backend.url = other.backend.url;
    }
    if !other.backend.api_key.is_empty() {
        base.backend.api_key = other.backend.api_key;
    }
    if !other.backend.client_info.is_empty() {
        base.backend.client_info = other.backend.client_info;
    }
    if !other.backend.timeout.is_zero() {
        base.backend.timeout = other.backend.timeout;
    }

    if !other.share.base_url.is_empty() {
        base.share.base_url = other.share.base_url;
    }
    if !other.share.company_name.is_empty() {
        base.share.company_name = other.share.company_name;
    }
    if other.share.download_dir.is_some() {
        base.share.download_dir = other.share.download_dir;
    }
    if other.share.image_scale > 0 {
        base.share.image_scale = other.share.image_scale;
    }

    base.print.delay = other.print.delay;

    if other.cache.path.is_some() {
        base.cache.path = other.cache.path;
    }

    base
}

/// Applies `<PREFIX>_SECTION__KEY` variables on top of `base`. Only keys
/// that are actually set are touched.
fn merge_env(mut base: Config, prefix: &str) -> Config {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(&mut base, &key, value);
    }

    base
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "backend.url" => cfg.backend.url = value,
        "backend.api_key" => cfg.backend.api_key = value,
        "backend.client_info" => cfg.backend.client_info = value,
        "backend.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.backend.timeout = duration;
            }
        }
        "share.base_url" => cfg.share.base_url = value,
        "share.company_name" => cfg.share.company_name = value,
        "share.download_dir" => cfg.share.download_dir = Some(PathBuf::from(value)),
        "share.image_scale" => {
            if let Ok(scale) = value.trim().parse::<u32>() {
                if scale > 0 {
                    cfg.share.image_scale = scale;
                }
            }
        }
        "print.delay" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.print.delay = duration;
            }
        }
        "cache.path" => cfg.cache.path = Some(PathBuf::from(value)),
        _ => {}
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("agenda-share").join("config.yaml"))
}

pub fn save_backend_credentials(path: Option<PathBuf>, url: &str, api_key: &str) -> Result<PathBuf> {
    let url = url.trim();
    let api_key = api_key.trim();

    anyhow::ensure!(!url.is_empty(), "config: backend.url is required");
    anyhow::ensure!(!api_key.is_empty(), "config: backend.api_key is required");
    url::Url::parse(url).with_context(|| format!("config: backend.url {url:?} is not a URL"))?;

    let path = if let Some(path) = path {
        path
    } else {
        default_config_path().context("config: unable to determine default config path")?
    };

    let mut cfg = if path.exists() {
        read_config_file(&path)?
    } else {
        Config::default()
    };

    cfg.backend.url = url.trim_end_matches('/').to_string();
    cfg.backend.api_key = api_key.to_string();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("config: failed to create directory {}", parent.display()))?;
    }

    let contents = serde_yaml::to_string(&cfg).context("config: failed to serialize config")?;
    fs::write(&path, contents)
        .with_context(|| format!("config: failed to write file {}", path.display()))?;

    Ok(path)
}

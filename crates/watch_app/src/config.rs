//! RON configuration file and webhook destination resolution.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use watch_core::{DetectionRules, OpposingMoves, DISABLED_DESTINATION};
use watch_engine::{DecodeMode, Destinations, FetchSettings, ImageModes, PageSelectors};
use watch_logging::{watch_debug, watch_warn};

pub const DEFAULT_CONFIG_PATH: &str = "voucher_watch.ron";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub webhook_url: Option<String>,
    pub webhook_error_url: Option<String>,
    pub data_path: PathBuf,
    pub queue_dir: PathBuf,
    pub selectors: PageSelectors,
    pub fetch: FetchConfig,
    pub opposing_moves: OpposingMoves,
    pub image_modes: ImageModes,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_error_url: None,
            data_path: PathBuf::from("data.json"),
            queue_dir: PathBuf::from("discord"),
            selectors: PageSelectors::default(),
            fetch: FetchConfig::default(),
            opposing_moves: OpposingMoves::default(),
            image_modes: ImageModes::default(),
        }
    }
}

impl Config {
    /// Reads `path`. A missing file yields the defaults unless `required`.
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound && !required => {
                watch_debug!("No config file at {:?}; using defaults", path);
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("cannot read config file {:?}", path))
            }
        };
        ron::from_str(&content).with_context(|| format!("invalid config file {:?}", path))
    }

    pub fn detection_rules(&self) -> DetectionRules {
        DetectionRules {
            opposing_moves: self.opposing_moves,
        }
    }
}

/// HTTP limits for page fetches.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub redirect_limit: usize,
    pub max_bytes: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let settings = FetchSettings::default();
        Self {
            connect_timeout_secs: settings.connect_timeout.as_secs(),
            request_timeout_secs: settings.request_timeout.as_secs(),
            redirect_limit: settings.redirect_limit,
            max_bytes: settings.max_bytes,
        }
    }
}

impl FetchConfig {
    pub fn settings(&self) -> FetchSettings {
        FetchSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            redirect_limit: self.redirect_limit,
            max_bytes: self.max_bytes,
            ..FetchSettings::default()
        }
    }
}

/// Picks each destination from the command line first, then the file.
///
/// Both must be `https` URLs; otherwise notifications are turned off for
/// both so that errors never go somewhere the regular feed does not.
pub fn resolve_destinations(
    config: &Config,
    webhook_url: Option<&str>,
    webhook_error_url: Option<&str>,
) -> Destinations {
    let primary = webhook_url.or(config.webhook_url.as_deref());
    let error = webhook_error_url.or(config.webhook_error_url.as_deref());

    match (primary, error) {
        (Some(primary), Some(error)) if is_https_url(primary) && is_https_url(error) => {
            Destinations {
                primary: primary.to_string(),
                error: error.to_string(),
            }
        }
        (Some(DISABLED_DESTINATION), Some(DISABLED_DESTINATION)) => disabled(),
        _ => {
            watch_warn!("Webhook destinations missing or not https URLs; notifications are disabled");
            disabled()
        }
    }
}

fn disabled() -> Destinations {
    Destinations {
        primary: DISABLED_DESTINATION.to_string(),
        error: DISABLED_DESTINATION.to_string(),
    }
}

fn is_https_url(candidate: &str) -> bool {
    url::Url::parse(candidate).is_ok_and(|url| url.scheme() == "https" && url.has_host())
}

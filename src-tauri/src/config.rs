use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::board::DEFAULT_BOARD_KEY;
use crate::countdown::DEFAULT_NOTIFY_EMAIL_KEY;
use crate::error::Result;
use crate::maintenance::DEFAULT_MAINTENANCE_KEY;
use crate::notice::DEFAULT_NOTICE_DURATION_MS;
use crate::storage::{validate_key, SlotStore};

/// Slot the configuration itself lives in.
pub const CONFIG_KEY: &str = "console";

const REFRESH_MIN_SECS: u64 = 5;
const REFRESH_MAX_SECS: u64 = 3_600;
const NOTICE_MIN_MS: u64 = 1_000;
const NOTICE_MAX_MS: u64 = 10_000;

/// Where a loaded config came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Missing,
    Stored,
    Fallback(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub maintenance_key: String,
    pub board_key: String,
    pub notify_email_key: String,
    pub seed_examples: bool,
    pub refresh_interval_secs: u64,
    pub notice_duration_ms: u64,
    pub log_filter: String,
    pub release_notes_url: Option<String>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            maintenance_key: DEFAULT_MAINTENANCE_KEY.to_string(),
            board_key: DEFAULT_BOARD_KEY.to_string(),
            notify_email_key: DEFAULT_NOTIFY_EMAIL_KEY.to_string(),
            seed_examples: true,
            refresh_interval_secs: 60,
            notice_duration_ms: DEFAULT_NOTICE_DURATION_MS,
            log_filter: "ops_console=info".to_string(),
            release_notes_url: None,
        }
    }
}

fn normalize_key(value: String, fallback: &str) -> String {
    match validate_key(&value) {
        Ok(key) => key.to_string(),
        Err(_) => {
            if !value.is_empty() {
                warn!("ignoring invalid slot key {value:?}; using {fallback}");
            }
            fallback.to_string()
        }
    }
}

impl ConsoleConfig {
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        let log_filter = if self.log_filter.trim().is_empty() {
            defaults.log_filter
        } else {
            self.log_filter.trim().to_string()
        };
        let release_notes_url = self
            .release_notes_url
            .map(|url| url.trim().to_string())
            .filter(|url| url.starts_with("https://") || url.starts_with("http://"));
        Self {
            maintenance_key: normalize_key(self.maintenance_key, DEFAULT_MAINTENANCE_KEY),
            board_key: normalize_key(self.board_key, DEFAULT_BOARD_KEY),
            notify_email_key: normalize_key(self.notify_email_key, DEFAULT_NOTIFY_EMAIL_KEY),
            seed_examples: self.seed_examples,
            refresh_interval_secs: self
                .refresh_interval_secs
                .clamp(REFRESH_MIN_SECS, REFRESH_MAX_SECS),
            notice_duration_ms: self.notice_duration_ms.clamp(NOTICE_MIN_MS, NOTICE_MAX_MS),
            log_filter,
            release_notes_url,
        }
    }

    /// Reads the `console` slot. Missing or malformed config means defaults;
    /// only a failing backend is an error.
    pub fn load<S: SlotStore + ?Sized>(slots: &S) -> Result<Self> {
        let (config, source) = Self::load_with_source(slots)?;
        if let ConfigSource::Fallback(reason) = source {
            warn!("console config unreadable, using defaults: {reason}");
        }
        Ok(config)
    }

    /// Like `load`, but leaves reporting a fallback to the caller. The
    /// desktop shell reads config before any subscriber is installed.
    pub fn load_with_source<S: SlotStore + ?Sized>(slots: &S) -> Result<(Self, ConfigSource)> {
        let raw = match slots.get(CONFIG_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok((Self::default(), ConfigSource::Missing)),
            Err(err) if err.is_corrupt() => {
                return Ok((Self::default(), ConfigSource::Fallback(err.to_string())))
            }
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_str::<Self>(&raw) {
            Ok(config) => Ok((config.normalized(), ConfigSource::Stored)),
            Err(err) => Ok((Self::default(), ConfigSource::Fallback(err.to_string()))),
        }
    }

    pub fn save<S: SlotStore + ?Sized>(&self, slots: &S) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        slots.set(CONFIG_KEY, &content)?;
        Ok(())
    }
}

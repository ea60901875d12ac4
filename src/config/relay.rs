// src/config/relay.rs
//! Relay configuration.
//!
//! Resolution order:
//! 1) `$RELAY_CONFIG_PATH` (must exist if set)
//! 2) `config/relay.toml`
//! 3) built-in defaults
//!
//! Secrets (`CHANNEL_ID`, `BOT_TOKEN`) come from the environment only; a few
//! knobs (`RELAY_STATE_DIR`, `RELAY_MAX_ITEMS`) can be overridden there too.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::IngestSettings;
use crate::publish::PublishSettings;
use crate::schedule::DeliveryWindow;

pub const ENV_CONFIG_PATH: &str = "RELAY_CONFIG_PATH";
pub const ENV_CHANNEL_ID: &str = "CHANNEL_ID";
pub const ENV_BOT_TOKEN: &str = "BOT_TOKEN";
pub const ENV_STATE_DIR: &str = "RELAY_STATE_DIR";
pub const ENV_MAX_ITEMS: &str = "RELAY_MAX_ITEMS";
const DEFAULT_CONFIG_PATH: &str = "config/relay.toml";

/// Telegram rejects message text longer than this.
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;
/// Room for the bold title line, the link and a short body.
const MIN_MESSAGE_CEILING: usize = 200;
const MAX_ATTEMPTS: u32 = 10;
const MAX_FETCH_CONCURRENCY: usize = 64;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    pub primary_sources: Vec<String>,
    pub backup_sources: Vec<String>,
    #[serde(skip)]
    pub channel_id: String,
    #[serde(skip)]
    pub bot_token: String,
    /// K: items delivered per cycle.
    pub max_items: usize,
    pub min_content_len: usize,
    pub max_content_len: usize,
    pub message_ceiling: usize,
    pub window_start_hour: u32,
    pub window_end_hour: u32,
    pub utc_offset_minutes: i32,
    pub jitter_minutes: i64,
    pub state_dir: PathBuf,
    pub fingerprint_retention: usize,
    pub rotation_capacity: usize,
    pub fetch_concurrency: usize,
    pub fetch_attempts: u32,
    pub fetch_timeout_secs: u64,
    pub delivery_attempts: u32,
    /// `[min, max]` seconds between consecutive deliveries.
    pub inter_post_delay_secs: [u64; 2],
    pub link_preview: bool,
    pub lexicon_path: Option<PathBuf>,
    pub metrics_textfile: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            primary_sources: Vec::new(),
            backup_sources: Vec::new(),
            channel_id: String::new(),
            bot_token: String::new(),
            max_items: 3,
            min_content_len: 50,
            max_content_len: 800,
            message_ceiling: 3900,
            window_start_hour: 9,
            window_end_hour: 21,
            utc_offset_minutes: 180,
            jitter_minutes: 25,
            state_dir: PathBuf::from("state"),
            fingerprint_retention: 10_000,
            rotation_capacity: 12,
            fetch_concurrency: 10,
            fetch_attempts: 3,
            fetch_timeout_secs: 15,
            delivery_attempts: 3,
            inter_post_delay_secs: [5, 12],
            link_preview: false,
            lexicon_path: None,
            metrics_textfile: None,
        }
    }
}

impl RelayConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: RelayConfig = toml::from_str(s).context("parsing relay config TOML")?;
        cfg.primary_sources = clean_list(cfg.primary_sources);
        cfg.backup_sources = clean_list(cfg.backup_sources);
        Ok(cfg)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading relay config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// File part only (env path, then default path, then defaults).
    pub fn load_file_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
            }
            return Self::load_from_file(&pb);
        }
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default.exists() {
            return Self::load_from_file(&default);
        }
        Ok(Self::default())
    }

    /// Full startup load: file, environment, normalization, validation.
    pub fn load() -> Result<Self> {
        let mut cfg = Self::load_file_default()?;
        cfg.apply_overrides(|k| std::env::var(k).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply environment-style overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        if let Some(v) = get(ENV_CHANNEL_ID) {
            self.channel_id = normalize_channel_id(&v);
        }
        if let Some(v) = get(ENV_BOT_TOKEN) {
            self.bot_token = v;
        }
        if let Some(v) = get(ENV_STATE_DIR) {
            self.state_dir = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_MAX_ITEMS) {
            self.max_items = v
                .parse()
                .map_err(|e| anyhow!("{ENV_MAX_ITEMS}={v:?} is not a count: {e}"))?;
        }
        Ok(())
    }

    /// Fatal misconfiguration, checked before any network activity.
    pub fn validate(&self) -> Result<()> {
        if self.channel_id.is_empty() {
            bail!("{ENV_CHANNEL_ID} is not set");
        }
        if self.bot_token.is_empty() {
            bail!("{ENV_BOT_TOKEN} is not set");
        }
        if self.primary_sources.is_empty() {
            bail!("no primary sources configured");
        }
        if self.max_items == 0 {
            bail!("max_items must be at least 1");
        }
        if self.window_start_hour >= self.window_end_hour || self.window_end_hour > 24 {
            bail!(
                "delivery window {}..{} is invalid",
                self.window_start_hour,
                self.window_end_hour
            );
        }
        if self.min_content_len > self.max_content_len {
            bail!(
                "min_content_len {} exceeds max_content_len {}",
                self.min_content_len,
                self.max_content_len
            );
        }
        if !(1..=MAX_ATTEMPTS).contains(&self.fetch_attempts) {
            bail!("fetch_attempts {} is outside 1..={MAX_ATTEMPTS}", self.fetch_attempts);
        }
        if !(1..=MAX_ATTEMPTS).contains(&self.delivery_attempts) {
            bail!("delivery_attempts {} is outside 1..={MAX_ATTEMPTS}", self.delivery_attempts);
        }
        if !(1..=MAX_FETCH_CONCURRENCY).contains(&self.fetch_concurrency) {
            bail!(
                "fetch_concurrency {} is outside 1..={MAX_FETCH_CONCURRENCY}",
                self.fetch_concurrency
            );
        }
        if !(MIN_MESSAGE_CEILING..=TELEGRAM_MESSAGE_LIMIT).contains(&self.message_ceiling) {
            bail!(
                "message_ceiling {} is outside {MIN_MESSAGE_CEILING}..={TELEGRAM_MESSAGE_LIMIT}",
                self.message_ceiling
            );
        }
        Ok(())
    }

    pub fn window(&self) -> DeliveryWindow {
        DeliveryWindow {
            start_hour: self.window_start_hour,
            end_hour: self.window_end_hour,
            utc_offset_minutes: self.utc_offset_minutes,
            jitter_minutes: self.jitter_minutes,
        }
    }

    pub fn ingest_settings(&self) -> IngestSettings {
        IngestSettings {
            primary_sources: self.primary_sources.clone(),
            backup_sources: self.backup_sources.clone(),
            target: self.max_items,
            concurrency: self.fetch_concurrency,
            attempts: self.fetch_attempts,
            timeout: Duration::from_secs(self.fetch_timeout_secs),
        }
    }

    pub fn publish_settings(&self) -> PublishSettings {
        PublishSettings {
            channel_id: self.channel_id.clone(),
            min_content_len: self.min_content_len,
            max_content_len: self.max_content_len,
            message_ceiling: self.message_ceiling,
            delivery_attempts: self.delivery_attempts,
            fetch_attempts: self.fetch_attempts,
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            link_preview: self.link_preview,
        }
    }

    /// Ordered `(min, max)` inter-post delay.
    pub fn inter_post_delay(&self) -> (Duration, Duration) {
        let [a, b] = self.inter_post_delay_secs;
        (Duration::from_secs(a.min(b)), Duration::from_secs(a.max(b)))
    }
}

/// Bare numeric ids of 10+ digits get the `-100` supergroup prefix.
pub fn normalize_channel_id(raw: &str) -> String {
    let raw = raw.trim();
    let digits = raw.trim_start_matches('-');
    let numeric = !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit());
    if numeric && digits.len() >= 10 && !raw.starts_with("-100") {
        format!("-100{digits}")
    } else {
        raw.to_string()
    }
}

/// Trim, drop empties and duplicates, keep order.
fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && !out.iter().any(|o| o == t) {
            out.push(t.to_string());
        }
    }
    out
}

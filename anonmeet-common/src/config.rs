//! Configuration loading and resolution
//!
//! Settings resolve in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! Tiers 1 and 2 arrive together as [`SettingsOverrides`] (the binary's clap
//! parser reads both); this module merges them over the TOML tier.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Longest channel name the transport accepts for a single side
pub const MAX_CHANNEL_NAME_LEN: usize = 21;

/// Length of the random part of a generated channel name
pub const CHANNEL_TOKEN_LEN: usize = 8;

/// Compiled defaults
pub struct CompiledDefaults;

impl CompiledDefaults {
    pub const PORT: u16 = 56503;
    pub const MATCH_THRESHOLD: u8 = 60;
    pub const SESSION_LIFETIME_HOURS: u64 = 24;
    /// Upper bound accepted for `session_lifetime_hours` (one year)
    pub const MAX_SESSION_LIFETIME_HOURS: u64 = 24 * 366;
    pub const NOTICE_INTERVAL_SECS: u64 = 3600;
    pub const END_GRACE_SECS: u64 = 3600;
    pub const END_MARKER: &'static str = ":end:";
    pub const END_REACTION: &'static str = "end";
    pub const CHANNEL_PREFIX: &'static str = "anonmeet";
    pub const PASS_CONCURRENCY: usize = 4;
    pub const TRANSCRIPT_RETENTION: usize = 1000;
    pub const SLACK_API_URL: &'static str = "https://slack.com/api";
    pub const ORACLE_URL: &'static str = "https://api.openai.com/v1/chat/completions";
    pub const ORACLE_MODEL: &'static str = "gpt-3.5-turbo";
}

/// On-disk TOML configuration. Every key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    pub port: Option<u16>,
    pub match_threshold: Option<u8>,
    pub session_lifetime_hours: Option<u64>,
    pub notice_interval_secs: Option<u64>,
    pub end_grace_secs: Option<u64>,
    pub end_marker: Option<String>,
    pub end_reaction: Option<String>,
    pub channel_prefix: Option<String>,
    pub pass_concurrency: Option<usize>,
    pub transcript_retention: Option<usize>,
    pub slack_bot_token: Option<String>,
    pub slack_api_url: Option<String>,
    pub bot_user_id: Option<String>,
    pub oracle_api_key: Option<String>,
    pub oracle_url: Option<String>,
    pub oracle_model: Option<String>,
    pub profile_db: Option<PathBuf>,
    pub admin_user_id: Option<String>,
    pub community_channel_id: Option<String>,
    pub usergroup_id: Option<String>,
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub port: Option<u16>,
    pub match_threshold: Option<u8>,
    pub session_lifetime_hours: Option<u64>,
    pub notice_interval_secs: Option<u64>,
    pub end_grace_secs: Option<u64>,
    pub slack_bot_token: Option<String>,
    pub bot_user_id: Option<String>,
    pub oracle_api_key: Option<String>,
    pub profile_db: Option<PathBuf>,
    pub admin_user_id: Option<String>,
}

/// Fully resolved relay settings
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub port: u16,
    /// Minimum oracle score (inclusive) for a pair to be accepted
    pub match_threshold: u8,
    /// Bound on a session's life from Active entry
    pub session_lifetime: Duration,
    /// Cadence of "time remaining" notices
    pub notice_interval: Duration,
    /// Delay between an explicit-end reveal and archival
    pub end_grace: Duration,
    pub end_marker: String,
    pub end_reaction: String,
    pub channel_prefix: String,
    pub pass_concurrency: usize,
    /// Sessions whose transcripts are kept for admin retrieval
    pub transcript_retention: usize,
    pub slack_bot_token: Option<String>,
    pub slack_api_url: String,
    pub bot_user_id: Option<String>,
    pub oracle_api_key: Option<String>,
    pub oracle_url: String,
    pub oracle_model: String,
    pub profile_db: Option<PathBuf>,
    pub admin_user_id: Option<String>,
    pub community_channel_id: Option<String>,
    /// Directory group every submitter joins, best-effort
    pub usergroup_id: Option<String>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            port: CompiledDefaults::PORT,
            match_threshold: CompiledDefaults::MATCH_THRESHOLD,
            session_lifetime: crate::time::hours(CompiledDefaults::SESSION_LIFETIME_HOURS),
            notice_interval: Duration::from_secs(CompiledDefaults::NOTICE_INTERVAL_SECS),
            end_grace: Duration::from_secs(CompiledDefaults::END_GRACE_SECS),
            end_marker: CompiledDefaults::END_MARKER.to_string(),
            end_reaction: CompiledDefaults::END_REACTION.to_string(),
            channel_prefix: CompiledDefaults::CHANNEL_PREFIX.to_string(),
            pass_concurrency: CompiledDefaults::PASS_CONCURRENCY,
            transcript_retention: CompiledDefaults::TRANSCRIPT_RETENTION,
            slack_bot_token: None,
            slack_api_url: CompiledDefaults::SLACK_API_URL.to_string(),
            bot_user_id: None,
            oracle_api_key: None,
            oracle_url: CompiledDefaults::ORACLE_URL.to_string(),
            oracle_model: CompiledDefaults::ORACLE_MODEL.to_string(),
            profile_db: None,
            admin_user_id: None,
            community_channel_id: None,
            usergroup_id: None,
        }
    }
}

impl RelaySettings {
    /// Merge overrides over the TOML tier over compiled defaults, then validate
    pub fn resolve(overrides: &SettingsOverrides, toml: &TomlConfig) -> Result<Self> {
        let defaults = Self::default();

        let lifetime_hours = overrides
            .session_lifetime_hours
            .or(toml.session_lifetime_hours)
            .unwrap_or(CompiledDefaults::SESSION_LIFETIME_HOURS);
        let session_lifetime = crate::time::checked_hours(lifetime_hours).ok_or_else(|| {
            Error::Config(format!("session_lifetime_hours is too large: {}", lifetime_hours))
        })?;
        let notice_secs = overrides
            .notice_interval_secs
            .or(toml.notice_interval_secs)
            .unwrap_or(CompiledDefaults::NOTICE_INTERVAL_SECS);
        let grace_secs = overrides
            .end_grace_secs
            .or(toml.end_grace_secs)
            .unwrap_or(CompiledDefaults::END_GRACE_SECS);

        let settings = Self {
            port: overrides.port.or(toml.port).unwrap_or(defaults.port),
            match_threshold: overrides
                .match_threshold
                .or(toml.match_threshold)
                .unwrap_or(defaults.match_threshold),
            session_lifetime,
            notice_interval: Duration::from_secs(notice_secs),
            end_grace: Duration::from_secs(grace_secs),
            end_marker: toml.end_marker.clone().unwrap_or(defaults.end_marker),
            end_reaction: toml.end_reaction.clone().unwrap_or(defaults.end_reaction),
            channel_prefix: toml.channel_prefix.clone().unwrap_or(defaults.channel_prefix),
            pass_concurrency: toml.pass_concurrency.unwrap_or(defaults.pass_concurrency),
            transcript_retention: toml
                .transcript_retention
                .unwrap_or(defaults.transcript_retention),
            slack_bot_token: overrides
                .slack_bot_token
                .clone()
                .or_else(|| toml.slack_bot_token.clone()),
            slack_api_url: toml.slack_api_url.clone().unwrap_or(defaults.slack_api_url),
            bot_user_id: overrides.bot_user_id.clone().or_else(|| toml.bot_user_id.clone()),
            oracle_api_key: overrides
                .oracle_api_key
                .clone()
                .or_else(|| toml.oracle_api_key.clone()),
            oracle_url: toml.oracle_url.clone().unwrap_or(defaults.oracle_url),
            oracle_model: toml.oracle_model.clone().unwrap_or(defaults.oracle_model),
            profile_db: overrides.profile_db.clone().or_else(|| toml.profile_db.clone()),
            admin_user_id: overrides
                .admin_user_id
                .clone()
                .or_else(|| toml.admin_user_id.clone()),
            community_channel_id: toml.community_channel_id.clone(),
            usergroup_id: toml.usergroup_id.clone(),
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Check invariants the core relies on
    pub fn validate(&self) -> Result<()> {
        if self.match_threshold > 100 {
            return Err(Error::Config(format!(
                "match_threshold must be within 0..=100, got {}",
                self.match_threshold
            )));
        }
        if self.session_lifetime.is_zero() {
            return Err(Error::Config(
                "session_lifetime_hours must be at least 1".to_string(),
            ));
        }
        if self.session_lifetime > crate::time::hours(CompiledDefaults::MAX_SESSION_LIFETIME_HOURS) {
            return Err(Error::Config(format!(
                "session_lifetime_hours must be at most {}",
                CompiledDefaults::MAX_SESSION_LIFETIME_HOURS
            )));
        }
        if self.notice_interval.is_zero() {
            return Err(Error::Config("notice_interval_secs must be positive".to_string()));
        }
        if self.end_marker.trim().is_empty() {
            return Err(Error::Config("end_marker must not be empty".to_string()));
        }
        if self.pass_concurrency == 0 {
            return Err(Error::Config("pass_concurrency must be at least 1".to_string()));
        }
        if self.transcript_retention == 0 {
            return Err(Error::Config("transcript_retention must be at least 1".to_string()));
        }
        validate_channel_prefix(&self.channel_prefix)
    }
}

/// A prefix must use the channel alphabet and leave room for `-xxxxxxxx-a`
pub fn validate_channel_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty()
        || !prefix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(Error::Config(format!(
            "channel_prefix {:?} may only contain lowercase letters, digits and hyphens",
            prefix
        )));
    }

    // prefix + '-' + token + "-a"
    let full_len = prefix.len() + 1 + CHANNEL_TOKEN_LEN + 2;
    if full_len > MAX_CHANNEL_NAME_LEN {
        return Err(Error::Config(format!(
            "channel_prefix {:?} too long: generated names would be {} chars (max {})",
            prefix, full_len, MAX_CHANNEL_NAME_LEN
        )));
    }
    Ok(())
}

/// Default configuration file location for the platform
///
/// Linux: `~/.config/anonmeet/config.toml`, then `/etc/anonmeet/config.toml`.
/// Elsewhere: the platform config directory.
pub fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("anonmeet").join("config.toml"));

    if let Some(path) = &user_config {
        if path.exists() {
            return user_config;
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/anonmeet/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Read and parse a TOML config file
pub fn read_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load the TOML tier
///
/// An explicitly requested file must exist and parse. Without one, the
/// default locations are tried and a missing file degrades to defaults.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    if let Some(path) = explicit {
        let config = read_toml_config(path)?;
        info!("Loaded configuration from {}", path.display());
        return Ok(config);
    }

    match default_config_path() {
        Some(path) => match read_toml_config(&path) {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            Err(e) => {
                warn!("{} - using compiled defaults", e);
                Ok(TomlConfig::default())
            }
        },
        None => {
            warn!("No config file found - using compiled defaults");
            Ok(TomlConfig::default())
        }
    }
}

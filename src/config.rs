//! Configuration loaded from ~/.crewsync/config.json with env overrides.
//!
//! Secrets (`CREWSYNC_API_TOKEN`, `CREWSYNC_WEBHOOK_SECRET`) can be supplied
//! through the environment instead of the file; `CREWSYNC_CONFIG` points at
//! an alternate config path. Missing required keys are fatal at startup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Pipedrive API token (or `CREWSYNC_API_TOKEN`).
    #[serde(default)]
    pub api_token: String,
    /// Shared secret gating all externally reachable triggers
    /// (or `CREWSYNC_WEBHOOK_SECRET`).
    #[serde(default)]
    pub webhook_secret: String,
    /// Custom-field key on deals holding the crew assignment (40-hex).
    #[serde(default)]
    pub crew_field_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub rename_policy: RenamePolicyConfig,
    /// Crew-identifier → display-name table.
    #[serde(default = "crate::crew::default_crew_table")]
    pub crew_map: BTreeMap<i64, String>,
    #[serde(default)]
    pub poll: PollConfig,
    /// Directory for the processed-deal id set (defaults to ~/.crewsync).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

/// Which activity types are in scope for renaming.
///
/// Accepts either the string `"all"` or `{ "labels": ["Demo", ...] }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RenamePolicyConfig {
    Labels { labels: Vec<String> },
    Mode(String),
}

impl Default for RenamePolicyConfig {
    fn default() -> Self {
        RenamePolicyConfig::Mode("all".to_string())
    }
}

impl RenamePolicyConfig {
    pub fn is_allow_all(&self) -> bool {
        matches!(self, RenamePolicyConfig::Mode(m) if m == "all")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval")]
    pub interval_minutes: u64,
    /// Look-back window applied to the cursor on cold start.
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: i64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Trailing buffer subtracted from the cursor when deciding whether a
    /// deal was already seen (tolerates write-visibility lag).
    #[serde(default = "default_buffer_seconds")]
    pub buffer_seconds: i64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: default_poll_interval(),
            lookback_hours: default_lookback_hours(),
            page_size: default_page_size(),
            buffer_seconds: default_buffer_seconds(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.pipedrive.com".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:8288".to_string()
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    5
}

fn default_lookback_hours() -> i64 {
    24
}

fn default_page_size() -> usize {
    100
}

fn default_buffer_seconds() -> i64 {
    60
}

impl Config {
    /// Load config from the resolved path, apply env overrides, validate.
    pub fn load() -> Result<Config, SyncError> {
        let path = config_path();
        let mut config = if path.exists() {
            Config::from_file(&path)?
        } else {
            // No file is fine as long as the environment supplies the
            // required keys.
            serde_json::from_str("{}")?
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file without env overrides or validation.
    pub fn from_file(path: &Path) -> Result<Config, SyncError> {
        if !path.exists() {
            return Err(SyncError::ConfigNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("CREWSYNC_API_TOKEN") {
            if !token.is_empty() {
                self.api_token = token;
            }
        }
        if let Ok(secret) = std::env::var("CREWSYNC_WEBHOOK_SECRET") {
            if !secret.is_empty() {
                self.webhook_secret = secret;
            }
        }
    }

    /// Startup validation. Failures here must prevent the process from
    /// binding at all.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.api_token.trim().is_empty() {
            return Err(SyncError::Config(
                "api_token is required (config file or CREWSYNC_API_TOKEN)".into(),
            ));
        }
        if self.webhook_secret.trim().is_empty() {
            return Err(SyncError::Config(
                "webhook_secret is required (config file or CREWSYNC_WEBHOOK_SECRET)".into(),
            ));
        }
        if self.crew_field_key.trim().is_empty() {
            return Err(SyncError::Config("crew_field_key is required".into()));
        }
        if let RenamePolicyConfig::Mode(mode) = &self.rename_policy {
            if mode != "all" {
                return Err(SyncError::Config(format!(
                    "rename_policy must be \"all\" or {{\"labels\": [...]}}, got \"{}\"",
                    mode
                )));
            }
        }
        if self.poll.page_size == 0 {
            return Err(SyncError::Config("poll.page_size must be non-zero".into()));
        }
        Ok(())
    }

    /// Directory holding persisted state (processed-deal id set).
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }
}

fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("CREWSYNC_CONFIG") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    default_data_dir().join("config.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".crewsync")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_config() -> Config {
        let mut config: Config = serde_json::from_str("{}").unwrap();
        config.api_token = "token".into();
        config.webhook_secret = "secret".into();
        config.crew_field_key = "8bbab3c120ade3217b8738f001033064e803cdef".into();
        config
    }

    #[test]
    fn defaults_fill_in() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.base_url, "https://api.pipedrive.com");
        assert!(config.poll.enabled);
        assert_eq!(config.poll.interval_minutes, 5);
        assert_eq!(config.poll.page_size, 100);
        assert_eq!(config.poll.buffer_seconds, 60);
        assert!(config.rename_policy.is_allow_all());
        // Default crew table ships with the service
        assert_eq!(config.crew_map.get(&47).map(String::as_str), Some("Kings"));
    }

    #[test]
    fn missing_api_token_rejected() {
        let mut config = valid_config();
        config.api_token.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("api_token"));
    }

    #[test]
    fn missing_crew_field_key_rejected() {
        let mut config = valid_config();
        config.crew_field_key.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn policy_parses_both_forms() {
        let all: RenamePolicyConfig = serde_json::from_str("\"all\"").unwrap();
        assert!(all.is_allow_all());

        let list: RenamePolicyConfig =
            serde_json::from_str(r#"{"labels": ["Demo", "Call"]}"#).unwrap();
        match list {
            RenamePolicyConfig::Labels { labels } => {
                assert_eq!(labels, vec!["Demo", "Call"]);
            }
            RenamePolicyConfig::Mode(_) => panic!("expected label list"),
        }
    }

    #[test]
    fn unknown_policy_mode_rejected() {
        let mut config = valid_config();
        config.rename_policy = RenamePolicyConfig::Mode("some".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn file_roundtrip_with_crew_map() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "api_token": "t",
                "webhook_secret": "s",
                "crew_field_key": "abc",
                "crew_map": {{"50": "Hector", "99": "Dana"}},
                "poll": {{"interval_minutes": 2, "enabled": false}}
            }}"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.crew_map.get(&50).map(String::as_str), Some("Hector"));
        assert_eq!(config.crew_map.get(&99).map(String::as_str), Some("Dana"));
        assert!(!config.poll.enabled);
        assert_eq!(config.poll.interval_minutes, 2);
        // untouched fields keep defaults
        assert_eq!(config.poll.page_size, 100);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Config::from_file(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(matches!(err, SyncError::ConfigNotFound(_)));
    }
}

//! Runtime configuration, read from a JSON or TOML file. Every key has
//! a default so an absent file still yields a working local setup.

use anyhow::{anyhow, Context, Result};
use fieldsync_cache::CacheConfig;
use fieldsync_notion::NotionConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const NOTION_TOKEN_ENV: &str = "FIELDSYNC_NOTION_TOKEN";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FieldsyncConfig {
    pub notion_token: Option<String>,
    pub database_id: Option<String>,
    pub api_timeout_ms: u64,
    pub cache_capacity: usize,
    pub cache_ttl_ms: u64,
    pub cache_persist_path: Option<PathBuf>,
    pub state_path: PathBuf,
}

impl Default for FieldsyncConfig {
    fn default() -> Self {
        Self {
            notion_token: None,
            database_id: None,
            api_timeout_ms: 10_000,
            cache_capacity: fieldsync_cache::DEFAULT_CAPACITY,
            cache_ttl_ms: 0,
            cache_persist_path: None,
            state_path: PathBuf::from(".fieldsync/state.json"),
        }
    }
}

impl FieldsyncConfig {
    /// Load from `path` when given, otherwise defaults. The
    /// `FIELDSYNC_NOTION_TOKEN` env var overrides the file token either
    /// way.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("Cannot read config {}", path.display()))?;
                parse_raw(&bytes)
                    .with_context(|| format!("Cannot parse config {}", path.display()))?
            }
            None => Self::default(),
        };

        if let Ok(token) = std::env::var(NOTION_TOKEN_ENV) {
            if !token.trim().is_empty() {
                config.notion_token = Some(token);
            }
        }
        Ok(config)
    }

    #[must_use]
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            capacity: self.cache_capacity,
            ttl: Duration::from_millis(self.cache_ttl_ms),
            persist_path: self.cache_persist_path.clone(),
        }
    }

    /// Gateway config, when a token is present.
    #[must_use]
    pub fn notion_config(&self) -> Option<NotionConfig> {
        let token = self.notion_token.as_deref()?.trim();
        if token.is_empty() {
            return None;
        }
        let mut notion = NotionConfig::new(token);
        notion.timeout = Duration::from_millis(self.api_timeout_ms);
        Some(notion)
    }
}

/// Accepts JSON or TOML; JSON is tried first.
fn parse_raw(bytes: &[u8]) -> Result<FieldsyncConfig> {
    let value: serde_json::Value = match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(json_err) => {
            let utf8 = std::str::from_utf8(bytes).context("Config is not valid UTF-8")?;
            let toml_value: toml::Value = toml::from_str(utf8).map_err(|toml_err| {
                anyhow!("Config is not valid JSON or TOML ({json_err}); TOML parse error: {toml_err}")
            })?;
            serde_json::to_value(toml_value)?
        }
    };
    serde_json::from_value(value).map_err(|err| anyhow!("Config parse error: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_apply_without_a_file() {
        let config = FieldsyncConfig::default();
        assert_eq!(config.api_timeout_ms, 10_000);
        assert_eq!(config.cache_capacity, 500);
        assert_eq!(config.state_path, PathBuf::from(".fieldsync/state.json"));
    }

    #[test]
    fn parses_json_config() {
        let config =
            parse_raw(br#"{"database_id": "db-1", "cache_capacity": 42}"#).unwrap();
        assert_eq!(config.database_id.as_deref(), Some("db-1"));
        assert_eq!(config.cache_capacity, 42);
        assert_eq!(config.api_timeout_ms, 10_000);
    }

    #[test]
    fn parses_toml_config() {
        let config = parse_raw(b"database_id = \"db-2\"\ncache_ttl_ms = 5000\n").unwrap();
        assert_eq!(config.database_id.as_deref(), Some("db-2"));
        assert_eq!(config.cache_ttl_ms, 5000);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_raw(b"{{{ nope").is_err());
    }

    #[test]
    fn blank_token_means_no_gateway() {
        let mut config = FieldsyncConfig::default();
        assert!(config.notion_config().is_none());
        config.notion_token = Some("  ".to_string());
        assert!(config.notion_config().is_none());
        config.notion_token = Some("secret".to_string());
        assert!(config.notion_config().is_some());
    }
}

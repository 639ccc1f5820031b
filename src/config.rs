use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::http::RetryPolicy;
use crate::paths::config_file_path;

const COOKIE_ENV: &str = "MIRRORSYNC_COOKIE";
const BASE_URL_ENV: &str = "MIRRORSYNC_BASE_URL";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Session cookie of the mirror account, sent on every request.
    #[serde(default)]
    pub cookie: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Upper bound on the total backoff spent retrying one request
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,

    #[serde(default = "default_retry_multiplier_ms")]
    pub retry_multiplier_ms: u64,

    /// Thumbnail `src` the listing uses for chapters that are still locked
    #[serde(default = "default_placeholder_src")]
    pub placeholder_src: String,

    #[serde(default = "default_listing_page_size")]
    pub listing_page_size: u32,
}

fn default_user_agent() -> String {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_base_url() -> String {
    "https://www.biliplus.com".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_retry_delay_ms() -> u64 {
    10_000
}

fn default_retry_multiplier_ms() -> u64 {
    400
}

fn default_placeholder_src() -> String {
    "about:blank".to_string()
}

fn default_listing_page_size() -> u32 {
    200
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cookie: String::new(),
            user_agent: default_user_agent(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            retry_multiplier_ms: default_retry_multiplier_ms(),
            placeholder_src: default_placeholder_src(),
            listing_page_size: default_listing_page_size(),
        }
    }
}

impl Config {
    /// Loads the config file, falling back to defaults when the default
    /// location has no file. An explicitly given path must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = config_file_path()?;
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    log::debug!("no config at {}, using defaults", path.display());
                    Self::default()
                }
            }
        };
        config.apply_env_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(cookie) = lookup(COOKIE_ENV).filter(|value| !value.trim().is_empty()) {
            self.cookie = cookie.trim().to_string();
        }
        if let Some(base_url) = lookup(BASE_URL_ENV).filter(|value| !value.trim().is_empty()) {
            self.base_url = base_url.trim().to_string();
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_total_delay: Duration::from_millis(self.max_retry_delay_ms),
            backoff_multiplier: Duration::from_millis(self.retry_multiplier_ms),
        }
    }

    /// Headers for every mirror request: client identity plus the session
    /// cookie with the sharing and full-size jpg preferences switched on.
    pub fn request_headers(&self) -> Vec<(String, String)> {
        vec![
            ("User-Agent".to_string(), self.user_agent.clone()),
            (
                "cookie".to_string(),
                format!(
                    "{};manga_sharing=on;manga_pic_format=jpg-full;",
                    self.cookie.trim_end_matches(';')
                ),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config = Config::from_json("{}").expect("empty config should parse");
        assert_eq!(config.base_url, "https://www.biliplus.com");
        assert_eq!(config.placeholder_src, "about:blank");
        assert_eq!(config.listing_page_size, 200);
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(
            config.retry_policy(),
            RetryPolicy {
                max_total_delay: Duration::from_millis(10_000),
                backoff_multiplier: Duration::from_millis(400),
            }
        );
    }

    #[test]
    fn cookie_header_carries_preference_flags() {
        let config = Config::from_json(r#"{"cookie": "SESSDATA=xyz;"}"#).expect("parse");
        let headers = config.request_headers();
        assert_eq!(
            headers[1],
            (
                "cookie".to_string(),
                "SESSDATA=xyz;manga_sharing=on;manga_pic_format=jpg-full;".to_string()
            )
        );
        assert!(headers[0].1.starts_with("mirrorsync/"));
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut config =
            Config::from_json(r#"{"cookie": "old", "base_url": "https://a.test"}"#).expect("parse");
        config.apply_env_overrides(|key| match key {
            COOKIE_ENV => Some(" new ".to_string()),
            BASE_URL_ENV => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.cookie, "new");
        assert_eq!(config.base_url, "https://a.test");
    }

    #[test]
    fn placeholder_sentinel_is_configurable() {
        let config = Config::from_json(r#"{"placeholder_src": "/static/locked.png"}"#)
            .expect("parse");
        assert_eq!(config.placeholder_src, "/static/locked.png");
    }
}

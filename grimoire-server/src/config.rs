//! Environment configuration.
//!
//! | Variable                  | Default                 |
//! |---------------------------|-------------------------|
//! | `GRIMOIRE_SECRET`         | `IDidntSetASecret`      |
//! | `GRIMOIRE_SERVER`         | `http://localhost:8080` |
//! | `GRIMOIRE_HOST`           | host of the server URL  |
//! | `GRIMOIRE_PORT`           | port of the server URL  |
//! | `GRIMOIRE_QUEUE_CAPACITY` | `256`                   |
//! | `GRIMOIRE_MAX_WAIT_SECS`  | `30`                    |
//! | `GRIMOIRE_LOG`            | `info`                  |
//! | `GRIMOIRE_LOG_JSON`       | unset                   |

use std::str::FromStr;
use std::time::Duration;

use url::Url;

use grimoire_sync::DEFAULT_QUEUE_CAPACITY;

use crate::error::ServerError;

pub const DEFAULT_SECRET: &str = "IDidntSetASecret";
pub const DEFAULT_SERVER: &str = "http://localhost:8080";
pub const DEFAULT_MAX_WAIT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub secret: String,
    pub server_url: String,
    pub queue_capacity: usize,
    /// Upper bound for a long-poll `wait`.
    pub max_wait: Duration,
    pub log_filter: String,
    pub log_json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            secret: DEFAULT_SECRET.to_string(),
            server_url: DEFAULT_SERVER.to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_wait: Duration::from_secs(DEFAULT_MAX_WAIT_SECS),
            log_filter: "info".to_string(),
            log_json: false,
        }
    }
}

impl ServerConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ServerError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServerError> {
        let defaults = Self::default();
        let server_url = lookup("GRIMOIRE_SERVER").unwrap_or(defaults.server_url);
        let (url_host, url_port) = split_server_url(&server_url)?;

        Ok(Self {
            host: lookup("GRIMOIRE_HOST").unwrap_or(url_host),
            port: parsed(&lookup, "GRIMOIRE_PORT")?.unwrap_or(url_port),
            secret: lookup("GRIMOIRE_SECRET").unwrap_or(defaults.secret),
            server_url,
            queue_capacity: parsed(&lookup, "GRIMOIRE_QUEUE_CAPACITY")?
                .unwrap_or(defaults.queue_capacity),
            max_wait: parsed(&lookup, "GRIMOIRE_MAX_WAIT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_wait),
            log_filter: lookup("GRIMOIRE_LOG").unwrap_or(defaults.log_filter),
            log_json: lookup("GRIMOIRE_LOG_JSON")
                .is_some_and(|v| matches!(v.as_str(), "1" | "true" | "yes")),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn uses_default_secret(&self) -> bool {
        self.secret == DEFAULT_SECRET
    }
}

fn parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ServerError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ServerError::Config(format!("{key}={raw:?} is not a valid value"))),
    }
}

fn split_server_url(raw: &str) -> Result<(String, u16), ServerError> {
    let url = Url::parse(raw)
        .map_err(|e| ServerError::Config(format!("GRIMOIRE_SERVER={raw:?}: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| ServerError::Config(format!("GRIMOIRE_SERVER={raw:?} has no host")))?
        .to_string();
    let port = url.port_or_known_default().unwrap_or(8080);
    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig, ServerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg, ServerConfig::default());
        assert!(cfg.uses_default_secret());
        assert_eq!(cfg.bind_addr(), "localhost:8080");
    }

    #[test]
    fn host_and_port_follow_server_url() {
        let cfg = config(&[("GRIMOIRE_SERVER", "http://0.0.0.0:9001")]).unwrap();
        assert_eq!(cfg.bind_addr(), "0.0.0.0:9001");
    }

    #[test]
    fn explicit_host_and_port_win() {
        let cfg = config(&[
            ("GRIMOIRE_SERVER", "http://example.org:9001"),
            ("GRIMOIRE_HOST", "127.0.0.1"),
            ("GRIMOIRE_PORT", "7000"),
            ("GRIMOIRE_SECRET", "s3cret"),
            ("GRIMOIRE_MAX_WAIT_SECS", "5"),
            ("GRIMOIRE_LOG_JSON", "1"),
        ])
        .unwrap();
        assert_eq!(cfg.bind_addr(), "127.0.0.1:7000");
        assert!(!cfg.uses_default_secret());
        assert_eq!(cfg.max_wait, Duration::from_secs(5));
        assert!(cfg.log_json);
    }

    #[test]
    fn malformed_numbers_are_reported() {
        let err = config(&[("GRIMOIRE_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("GRIMOIRE_PORT"));
    }
}

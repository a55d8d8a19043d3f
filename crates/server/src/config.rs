// crates/server/src/config.rs
//! Runtime configuration, read from the environment (optionally seeded by a
//! `.env` file in the binary).

use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::jobs::RunnerConfig;
use crate::upload::UploadPolicy;

pub const DEFAULT_PORT: u16 = 5500;
pub const DEFAULT_MODEL_URL: &str = "http://127.0.0.1:8501/v1/models/ecosort";

const MIB: usize = 1 << 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'compact' or 'json', got '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Required `X-API-Key` value. `None` disables the check.
    pub api_key: Option<String>,
    pub model_url: String,
    pub model_timeout: Duration,
    /// Alternate taxonomy file; the built-in one is used when unset.
    pub taxonomy_path: Option<PathBuf>,
    pub upload_dir: PathBuf,
    pub runner: RunnerConfig,
    /// How long a finished job stays pollable.
    pub result_ttl: Duration,
    pub upload: UploadPolicy,
    pub max_request_bytes: usize,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            api_key: None,
            model_url: DEFAULT_MODEL_URL.to_string(),
            model_timeout: Duration::from_secs(30),
            taxonomy_path: None,
            upload_dir: std::env::temp_dir().join("ecosort"),
            runner: RunnerConfig::default(),
            result_ttl: Duration::from_secs(300),
            upload: UploadPolicy::default(),
            max_request_bytes: 512 * MIB,
            log_format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let max_file_mb: usize = parse(&get, "ECOSORT_MAX_FILE_MB", 50)?;
        let max_request_mb: usize = parse(&get, "ECOSORT_MAX_REQUEST_MB", 512)?;
        if max_file_mb == 0 {
            return Err(invalid("ECOSORT_MAX_FILE_MB", "0", "must be at least 1"));
        }
        if max_request_mb < max_file_mb {
            return Err(invalid(
                "ECOSORT_MAX_REQUEST_MB",
                &max_request_mb.to_string(),
                "must not be smaller than ECOSORT_MAX_FILE_MB",
            ));
        }

        let chunk_size: usize = parse(&get, "ECOSORT_CHUNK_SIZE", defaults.runner.chunk_size)?;
        if chunk_size == 0 {
            return Err(invalid("ECOSORT_CHUNK_SIZE", "0", "must be at least 1"));
        }

        Ok(Self {
            host: parse(&get, "ECOSORT_HOST", defaults.host)?,
            port: parse(&get, "PORT", defaults.port)?,
            api_key: get("API_REQ_KEY"),
            model_url: get("ECOSORT_MODEL_URL").unwrap_or(defaults.model_url),
            model_timeout: Duration::from_secs(parse(&get, "ECOSORT_MODEL_TIMEOUT_SECS", 30)?),
            taxonomy_path: get("ECOSORT_TAXONOMY").map(PathBuf::from),
            upload_dir: get("ECOSORT_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            runner: RunnerConfig {
                chunk_size,
                pacing: Duration::from_millis(parse(&get, "ECOSORT_CHUNK_PACING_MS", 1000)?),
            },
            result_ttl: Duration::from_secs(parse(&get, "ECOSORT_RESULT_TTL_SECS", 300)?),
            upload: UploadPolicy {
                max_file_bytes: max_file_mb * MIB,
            },
            max_request_bytes: max_request_mb * MIB,
            log_format: parse(&get, "ECOSORT_LOG_FORMAT", defaults.log_format)?,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| invalid(key, &raw, &e.to_string())),
    }
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.port, 5500);
        assert_eq!(config.runner.chunk_size, 10);
        assert_eq!(config.runner.pacing, Duration::from_secs(1));
        assert_eq!(config.result_ttl, Duration::from_secs(300));
        assert_eq!(config.upload.max_file_bytes, 50 * MIB);
        assert!(config.api_key.is_none());
        assert_eq!(config.bind_addr().to_string(), "0.0.0.0:5500");
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("ECOSORT_HOST", "127.0.0.1"),
            ("API_REQ_KEY", "secret"),
            ("ECOSORT_CHUNK_SIZE", "3"),
            ("ECOSORT_CHUNK_PACING_MS", "0"),
            ("ECOSORT_RESULT_TTL_SECS", "5"),
            ("ECOSORT_MAX_FILE_MB", "2"),
            ("ECOSORT_LOG_FORMAT", "JSON"),
            ("ECOSORT_UPLOAD_DIR", "/var/tmp/uploads"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr().to_string(), "127.0.0.1:8080");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.runner.chunk_size, 3);
        assert!(config.runner.pacing.is_zero());
        assert_eq!(config.result_ttl, Duration::from_secs(5));
        assert_eq!(config.upload.max_file_bytes, 2 * MIB);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.upload_dir, PathBuf::from("/var/tmp/uploads"));
    }

    #[test]
    fn test_empty_api_key_disables_auth() {
        let config = config_from(&[("API_REQ_KEY", "  ")]).unwrap();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_invalid_values() {
        let err = config_from(&[("PORT", "not-a-port")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));

        let err = config_from(&[("ECOSORT_CHUNK_SIZE", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "ECOSORT_CHUNK_SIZE", .. }));

        let err = config_from(&[("ECOSORT_LOG_FORMAT", "xml")]).unwrap_err();
        assert!(err.to_string().contains("ECOSORT_LOG_FORMAT"));

        let err = config_from(&[("ECOSORT_MAX_FILE_MB", "100"), ("ECOSORT_MAX_REQUEST_MB", "10")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "ECOSORT_MAX_REQUEST_MB", .. }));
    }
}

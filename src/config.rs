//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.

use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0), // Bind to 0.0.0.0 for Docker
            port: 3000,
        }
    }
}

/// Analysis backend configuration
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: url::Url,
    /// Bounds request/response calls and the handshake of streaming calls;
    /// stream bodies are never timed out
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: url::Url::parse("http://localhost:8000").expect("static default URL"),
            timeout: Duration::from_secs(30),
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3001".to_string()],
        }
    }
}

/// Run relay configuration
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Capacity of each run's event broadcast channel
    pub event_buffer: usize,
    /// How long finished runs and committed results are kept
    pub retention: Duration,
}

impl RunConfig {
    /// How often expired runs are swept
    pub fn cleanup_interval(&self) -> Duration {
        (self.retention / 4).clamp(Duration::from_secs(1), Duration::from_secs(300))
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            event_buffer: 256,
            retention: Duration::from_secs(3600),
        }
    }
}

/// Complete application settings
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub cors: CorsConfig,
    pub runs: RunConfig,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server = ServerConfig {
            host: lookup("HOST")
                .and_then(|h| h.parse().ok())
                .unwrap_or_else(|| ServerConfig::default().host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or_else(|| ServerConfig::default().port),
        };

        let backend = BackendConfig {
            base_url: match lookup("BACKEND_URL") {
                Some(url) => Self::parse_backend_url(&url)?,
                None => BackendConfig::default().base_url,
            },
            timeout: lookup("BACKEND_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or_else(|| BackendConfig::default().timeout),
        };

        let cors = CorsConfig {
            allowed_origins: lookup("ALLOWED_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_else(|| CorsConfig::default().allowed_origins),
        };

        let runs = RunConfig {
            event_buffer: lookup("RUN_EVENT_BUFFER")
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or_else(|| RunConfig::default().event_buffer),
            retention: lookup("RUN_RETENTION_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or_else(|| RunConfig::default().retention),
        };

        Ok(Self {
            server,
            backend,
            cors,
            runs,
        })
    }

    /// Parse the BACKEND_URL (http:// or https://)
    fn parse_backend_url(raw: &str) -> Result<url::Url, ConfigError> {
        let parsed = url::Url::parse(raw.trim()).map_err(|e| {
            ConfigError::InvalidValue(format!("Invalid BACKEND_URL '{}': {}", raw, e))
        })?;

        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            other => Err(ConfigError::InvalidValue(format!(
                "Unsupported BACKEND_URL scheme '{}' (expected http or https)",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_server_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, Ipv4Addr::new(0, 0, 0, 0));
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_defaults_when_unset() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.backend.base_url.as_str(), "http://localhost:8000/");
        assert_eq!(settings.backend.timeout, Duration::from_secs(30));
        assert_eq!(settings.runs.event_buffer, 256);
        assert_eq!(settings.runs.retention, Duration::from_secs(3600));
        assert_eq!(settings.runs.cleanup_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_values_from_environment() {
        let settings = Settings::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("BACKEND_URL", "https://analysis.internal:9000/"),
            ("BACKEND_TIMEOUT_SECS", "5"),
            ("ALLOWED_ORIGINS", "http://a.test, http://b.test,"),
            ("RUN_RETENTION_SECS", "0"),
        ]))
        .unwrap();

        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.backend.base_url.port(), Some(9000));
        assert_eq!(settings.backend.timeout, Duration::from_secs(5));
        assert_eq!(settings.cors.allowed_origins, vec!["http://a.test", "http://b.test"]);
        assert_eq!(settings.runs.retention, Duration::ZERO);
        assert_eq!(settings.runs.cleanup_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_backend_url() {
        assert!(Settings::from_lookup(lookup(&[("BACKEND_URL", "not a url")])).is_err());
        assert!(Settings::from_lookup(lookup(&[("BACKEND_URL", "ftp://host/")])).is_err());
    }
}

//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables (`DSP_TCK_*`)
//! - CLI arguments (for the `dsp-tck` binary)
//!
//! ```toml
//! [connector]
//! base_url = "http://localhost:8282/api/dsp"
//! participant_id = "CONNECTOR_UNDER_TEST"
//!
//! [callback]
//! host = "127.0.0.1"
//! port = 8083
//!
//! [transport]
//! authorization = "Bearer secret"
//!
//! [pipeline]
//! wait_secs = 15
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TckError};
use crate::transport::RetryPolicy;

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connector under test
    #[serde(default)]
    pub connector: ConnectorConfig,

    /// Local callback endpoint
    #[serde(default)]
    pub callback: CallbackConfig,

    /// Outbound HTTP
    #[serde(default)]
    pub transport: TransportConfig,

    /// Pipeline execution
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| TckError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| TckError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Load from `path`, or from the default location if it exists, then
    /// apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(path)?,
                _ => Self::default(),
            },
        };
        Ok(config.with_env())
    }

    /// `$XDG_CONFIG_HOME/dsp-tck/config.toml` or the platform equivalent
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("dsp-tck").join("config.toml"))
    }

    /// Apply `DSP_TCK_*` environment variables
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup (environment, test fixtures)
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("DSP_TCK_CONNECTOR_URL") {
            self.connector.base_url = url;
        }
        if let Some(id) = lookup("DSP_TCK_CONNECTOR_ID") {
            self.connector.participant_id = id;
        }
        if let Some(auth) = lookup("DSP_TCK_AUTHORIZATION") {
            self.transport.authorization = Some(auth);
        }
        if let Some(host) = lookup("DSP_TCK_CALLBACK_HOST") {
            self.callback.host = host;
        }
        if let Some(port) = lookup("DSP_TCK_CALLBACK_PORT") {
            if let Ok(port) = port.parse() {
                self.callback.port = port;
            }
        }
        if let Some(address) = lookup("DSP_TCK_CALLBACK_ADDRESS") {
            self.callback.address = Some(address);
        }
        if let Some(wait) = lookup("DSP_TCK_WAIT_SECS") {
            if let Ok(wait) = wait.parse() {
                self.pipeline.wait_secs = wait;
            }
        }
        self
    }

    /// Render as TOML with the authorization value masked.
    pub fn to_toml_redacted(&self) -> Result<String> {
        let mut config = self.clone();
        if config.transport.authorization.is_some() {
            config.transport.authorization = Some("<redacted>".to_string());
        }
        toml::to_string_pretty(&config)
            .map_err(|e| TckError::Config(format!("Failed to render config: {e}")))
    }
}

/// Connector under test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// DSP base URL of the connector (e.g., http://localhost:8282/api/dsp)
    pub base_url: String,

    /// Participant id of the connector
    pub participant_id: String,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8282/api/dsp".to_string(),
            participant_id: "CONNECTOR_UNDER_TEST".to_string(),
        }
    }
}

/// Callback endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on (0 picks a free port)
    pub port: u16,

    /// Path prefix for all callback routes
    pub base_path: String,

    /// Address advertised to the connector, if it differs from the bind address
    pub address: Option<String>,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8083,
            base_path: String::new(),
            address: None,
        }
    }
}

impl CallbackConfig {
    /// Get the full listen address
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| TckError::Config(format!("Invalid callback address: {e}")))
    }
}

/// Outbound HTTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Attempts for transiently failing requests (first call included)
    pub max_attempts: u32,

    /// Backoff before the first retry, doubled for each further retry
    pub initial_backoff_ms: u64,

    /// `Authorization` header sent with every request
    pub authorization: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_attempts: 3,
            initial_backoff_ms: 200,
            authorization: None,
        }
    }
}

impl TransportConfig {
    /// Request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Retry policy described by this section
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
        )
    }
}

/// Pipeline execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum wait for each inbound expectation, in seconds
    pub wait_secs: u64,

    /// Pause before remote state checks, in milliseconds
    pub pause_ms: u64,

    /// Participant id the harness presents
    pub participant_id: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            wait_secs: 15,
            pause_ms: 100,
            participant_id: crate::protocol::TCK_PARTICIPANT_ID.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Maximum wait per expectation
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }

    /// Pause before remote state checks
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.callback.port, 8083);
        assert_eq!(config.connector.base_url, "http://localhost:8282/api/dsp");
        assert_eq!(config.transport.max_attempts, 3);
        assert_eq!(
            config.transport.retry_policy().initial_backoff(),
            Duration::from_millis(200)
        );
        assert_eq!(config.pipeline.wait(), Duration::from_secs(15));
        assert!(config.transport.authorization.is_none());
    }

    #[test]
    fn test_callback_listen_addr() {
        let config = CallbackConfig::default();
        assert_eq!(config.listen_addr().unwrap().to_string(), "127.0.0.1:8083");

        let config = CallbackConfig {
            host: "not a host".to_string(),
            ..Default::default()
        };
        assert!(config.listen_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            [connector]
            base_url = "http://provider:9191/dsp"

            [callback]
            port = 0
            base_path = "/tck"

            [transport]
            authorization = "Bearer abc"
            initial_backoff_ms = 50

            [pipeline]
            wait_secs = 3
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.connector.base_url, "http://provider:9191/dsp");
        assert_eq!(config.connector.participant_id, "CONNECTOR_UNDER_TEST");
        assert_eq!(config.callback.port, 0);
        assert_eq!(config.callback.base_path, "/tck");
        assert_eq!(config.transport.authorization.as_deref(), Some("Bearer abc"));
        assert_eq!(config.transport.max_attempts, 3);
        assert_eq!(config.pipeline.wait_secs, 3);
        assert_eq!(config.pipeline.pause_ms, 100);
    }

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pipeline]\nwait_secs = 7").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.pipeline.wait_secs, 7);

        assert!(Config::from_file("/nonexistent/dsp-tck.toml").is_err());

        let mut broken = tempfile::NamedTempFile::new().unwrap();
        writeln!(broken, "[pipeline\nwait_secs = ").unwrap();
        let err = Config::from_file(broken.path()).unwrap_err();
        assert!(matches!(err, TckError::Config(ref msg) if msg.starts_with("Failed to parse")), "{err}");
    }

    #[test]
    fn test_rendered_config_masks_authorization() {
        let mut config = Config::default();
        config.transport.authorization = Some("Bearer s3cr3t".to_string());

        let rendered = config.to_toml_redacted().unwrap();
        assert!(!rendered.contains("s3cr3t"), "{rendered}");
        assert!(rendered.contains("authorization = \"<redacted>\""), "{rendered}");
        assert_eq!(config.transport.authorization.as_deref(), Some("Bearer s3cr3t"));

        let rendered = Config::default().to_toml_redacted().unwrap();
        assert!(!rendered.contains("authorization"), "{rendered}");
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("DSP_TCK_CONNECTOR_URL", "http://other:1/dsp"),
            ("DSP_TCK_AUTHORIZATION", "Basic eA=="),
            ("DSP_TCK_CALLBACK_PORT", "9999"),
            ("DSP_TCK_WAIT_SECS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let config = Config::default().with_overrides(|key| vars.get(key).map(ToString::to_string));
        assert_eq!(config.connector.base_url, "http://other:1/dsp");
        assert_eq!(config.transport.authorization.as_deref(), Some("Basic eA=="));
        assert_eq!(config.callback.port, 9999);
        assert_eq!(config.pipeline.wait_secs, 15);
    }
}

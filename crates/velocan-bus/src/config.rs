//! Bus configuration
//!
//! Transport selection and the request policy shared by every session.
//!
//! ```toml
//! [transport]
//! type = "mock"
//! latency_ms = 5
//!
//! [session]
//! request_timeout_ms = 500
//! max_retries = 3
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration for a [`BikeConnection`](crate::BikeConnection)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusConfig {
    /// Transport configuration
    #[serde(default)]
    pub transport: TransportConfig,
    /// Request policy
    #[serde(default)]
    pub session: SessionConfig,
}

impl BusConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BusConfig = toml::from_str(content)?;
        config.session.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }
}

// =============================================================================
// Transport Configuration
// =============================================================================

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// In-memory transport for testing
    Mock(MockConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Mock(MockConfig::default())
    }
}

/// Mock transport configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockConfig {
    /// Simulated latency in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
}

// =============================================================================
// Session Configuration
// =============================================================================

/// Timeout and retry policy for requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long to wait for a reply before resending
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Resends after the first attempt before a request is counted failed
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_request_timeout_ms() -> u64 {
    500
}

fn default_max_retries() -> u32 {
    3
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl SessionConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "session.request_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

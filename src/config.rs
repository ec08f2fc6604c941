//! Engine configuration and runtime environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration consumed by the authentication engine.
///
/// The host validates these before handing them over; the engine treats them
/// as trusted inputs. [`AuthConfig::validate`] implements the checks hosts
/// are expected to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Base URL of the gateway auth API.
    pub base_url: String,

    /// Application bundle identifier; tags the device key and the attestation
    /// record in the secret store.
    pub bundle_identifier: String,

    /// Ten-character alphanumeric team identifier, sent with attestation
    /// artifacts.
    pub team_identifier: String,

    /// Development token, honored only in the simulator.
    #[serde(default)]
    pub development_token: Option<String>,

    /// Filter directive for the tracing subscriber.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AuthConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = require_env("ATTEST_AUTH_BASE_URL")?;
        let bundle_identifier = require_env("ATTEST_AUTH_BUNDLE_ID")?;
        let team_identifier = require_env("ATTEST_AUTH_TEAM_ID")?;
        let development_token = std::env::var("ATTEST_AUTH_DEV_TOKEN")
            .ok()
            .filter(|token| !token.is_empty());
        let log_level =
            std::env::var("ATTEST_AUTH_LOG").unwrap_or_else(|_| default_log_level());

        Ok(Self {
            base_url,
            bundle_identifier,
            team_identifier,
            development_token,
            log_level,
        })
    }

    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Get the default config file path.
    pub fn default_config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("~/.config"));
        config_dir.join("attest-auth").join("config.yaml")
    }

    /// Load from default locations (file first, then env).
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path();

        if config_path.exists() {
            Self::from_file(&config_path)
        } else {
            Self::from_env()
        }
    }

    /// Host-side validation: non-empty base URL and bundle identifier, and a
    /// team identifier of exactly 10 alphanumeric characters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.is_empty() {
            return Err(ConfigError::Invalid("base_url must not be empty".into()));
        }
        if self.bundle_identifier.is_empty() {
            return Err(ConfigError::Invalid(
                "bundle_identifier must not be empty".into(),
            ));
        }
        if self.team_identifier.len() != 10
            || !self
                .team_identifier
                .chars()
                .all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ConfigError::Invalid(
                "team_identifier must be exactly 10 alphanumeric characters".into(),
            ));
        }
        Ok(())
    }

    /// Install a global tracing subscriber honoring `log_level`. Safe to call
    /// more than once; later calls are no-ops.
    pub fn init_tracing(&self) {
        let filter = tracing_subscriber::EnvFilter::try_new(&self.log_level)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }
}

fn require_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Runtime environment the SDK is executing in.
///
/// The development-token path is only honored in the simulator; everywhere
/// else the production attestation path runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEnvironment {
    Device,
    Simulator,
}

impl RuntimeEnvironment {
    /// Detect the environment. The simulator exports `SIMULATOR_UDID` into
    /// every process it spawns.
    pub fn detect() -> Self {
        if std::env::var_os("SIMULATOR_UDID").is_some() {
            Self::Simulator
        } else {
            Self::Device
        }
    }

    pub fn is_simulator(self) -> bool {
        matches!(self, Self::Simulator)
    }
}

//! Configuration for the Sengled cloud bridge.
//!
//! Loaded from a TOML file. Only the account section is mandatory; the REST
//! and MQTT sections default to the production Sengled cloud endpoints and
//! conservative timeouts. The account password may be given inline or
//! indirectly through the name of an environment variable, so config files
//! can be committed without secrets.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Top-level bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    pub account: AccountSection,
    #[serde(default)]
    pub rest: RestSection,
    #[serde(default)]
    pub mqtt: MqttSection,
}

/// Cloud account credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountSection {
    /// Username for the Sengled mobile app account.
    pub username: String,
    /// Password given directly in the config file.
    pub password: Option<String>,
    /// Environment variable containing the password; takes precedence
    /// over `password` when both are set.
    pub password_env: Option<String>,
}

impl AccountSection {
    /// Resolve the account password from the environment or the inline field.
    pub fn resolve_password(&self) -> Result<String, ConfigError> {
        if let Some(env_name) = &self.password_env {
            return std::env::var(env_name).map_err(|_| ConfigError::EnvVar(env_name.clone()));
        }
        self.password
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or(ConfigError::MissingPassword)
    }
}

/// REST backend endpoints and HTTP behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestSection {
    /// Base URL of the account/authentication service.
    #[serde(default = "default_ucenter_base")]
    pub ucenter_base: String,
    /// Base URL of the device/service-info backend.
    #[serde(default = "default_life2_base")]
    pub life2_base: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for RestSection {
    fn default() -> Self {
        Self {
            ucenter_base: default_ucenter_base(),
            life2_base: default_life2_base(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Realtime channel tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// MQTT keep-alive interval in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// Bounded wait for publish delivery confirmation, in seconds.
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_secs: u64,
    /// Bounded wait for the broker's connection acknowledgment, in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Retry the transport with backoff after an unexpected drop. Off by
    /// default: reconnection is otherwise driven only by a fresh login.
    #[serde(default)]
    pub auto_reconnect: bool,
    /// Backoff pattern in milliseconds for supervised reconnect attempts.
    #[serde(default = "default_backoff_pattern")]
    pub reconnect_backoff_ms: Vec<u64>,
    /// Delay in milliseconds once the backoff pattern is exhausted.
    #[serde(default = "default_sustained_delay")]
    pub sustained_reconnect_delay_ms: u64,
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            keep_alive_secs: default_keep_alive(),
            publish_timeout_secs: default_publish_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            auto_reconnect: false,
            reconnect_backoff_ms: default_backoff_pattern(),
            sustained_reconnect_delay_ms: default_sustained_delay(),
        }
    }
}

fn default_ucenter_base() -> String {
    "https://ucenter.cloud.sengled.com".to_string()
}

fn default_life2_base() -> String {
    "https://life2.cloud.sengled.com".to_string()
}

fn default_request_timeout() -> u64 {
    15
}

fn default_keep_alive() -> u64 {
    30
}

fn default_publish_timeout() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    20
}

fn default_backoff_pattern() -> Vec<u64> {
    vec![1_000, 2_000, 5_000, 10_000]
}

fn default_sustained_delay() -> u64 {
    30_000
}

impl BridgeConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: BridgeConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate fields that serde cannot check on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.account.username.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "account.username must not be empty".to_string(),
            ));
        }
        if self.account.password.is_none() && self.account.password_env.is_none() {
            return Err(ConfigError::InvalidConfig(
                "one of account.password or account.password_env is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("environment variable not found: {0}")]
    EnvVar(String),
    #[error("no password configured")]
    MissingPassword,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> BridgeConfig {
        toml::from_str(
            r#"
            [account]
            username = "user@example.com"
            password = "hunter2"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_defaults_applied_for_omitted_sections() {
        let config = minimal_config();
        assert_eq!(config.rest.ucenter_base, "https://ucenter.cloud.sengled.com");
        assert_eq!(config.rest.life2_base, "https://life2.cloud.sengled.com");
        assert_eq!(config.mqtt.keep_alive_secs, 30);
        assert_eq!(config.mqtt.publish_timeout_secs, 10);
        assert!(!config.mqtt.auto_reconnect);
        assert_eq!(
            config.mqtt.reconnect_backoff_ms,
            vec![1_000, 2_000, 5_000, 10_000]
        );
    }

    #[test]
    fn test_inline_password_resolves() {
        let config = minimal_config();
        assert_eq!(config.account.resolve_password().unwrap(), "hunter2");
    }

    #[test]
    fn test_password_env_takes_precedence() {
        std::env::set_var("SENGLED_TEST_PASSWORD", "from-env");
        let config: BridgeConfig = toml::from_str(
            r#"
            [account]
            username = "user@example.com"
            password = "inline"
            password_env = "SENGLED_TEST_PASSWORD"
            "#,
        )
        .unwrap();
        assert_eq!(config.account.resolve_password().unwrap(), "from-env");
        std::env::remove_var("SENGLED_TEST_PASSWORD");
    }

    #[test]
    fn test_missing_password_env_is_an_error() {
        let config: BridgeConfig = toml::from_str(
            r#"
            [account]
            username = "user@example.com"
            password_env = "SENGLED_TEST_PASSWORD_UNSET"
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.account.resolve_password(),
            Err(ConfigError::EnvVar(_))
        ));
    }

    #[test]
    fn test_validate_rejects_credentialless_account() {
        let config: Result<BridgeConfig, _> = toml::from_str(
            r#"
            [account]
            username = "user@example.com"
            "#,
        );
        let config = config.unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));
    }
}

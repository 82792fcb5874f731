//! Error types for the Sengled cloud bridge.
//!
//! One crate-wide enum covers the failure classes the client can hit:
//! authentication, transport, malformed server payloads, and operations
//! attempted before the realtime channel is up. REST and MQTT failures are
//! recovered locally wherever possible; callers of the host-facing entry
//! points only ever see a boolean result, with the cause logged.

use crate::transport::mqtt::ConnectionState;
use thiserror::Error;

/// Main error type for bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("authentication failed: {message}")]
    Auth { message: String },

    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("malformed server payload: {message}")]
    Protocol { message: String },

    #[error("realtime channel not connected (state: {state:?})")]
    NotConnected { state: ConnectionState },

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl BridgeError {
    /// Create an authentication error.
    pub fn auth<S: Into<String>>(message: S) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a protocol error for a payload the server should not have sent.
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a transport error from a display-able cause.
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into().into())
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(Box::new(err))
    }
}

impl From<rumqttc::ClientError> for BridgeError {
    fn from(err: rumqttc::ClientError) -> Self {
        Self::Transport(Box::new(err))
    }
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_constructor() {
        let error = BridgeError::auth("bad credentials");
        assert!(matches!(error, BridgeError::Auth { .. }));
        assert_eq!(error.to_string(), "authentication failed: bad credentials");
    }

    #[test]
    fn test_protocol_constructor() {
        let error = BridgeError::protocol("missing jsessionId");
        assert!(matches!(error, BridgeError::Protocol { .. }));
        assert_eq!(
            error.to_string(),
            "malformed server payload: missing jsessionId"
        );
    }

    #[test]
    fn test_not_connected_mentions_state() {
        let error = BridgeError::NotConnected {
            state: ConnectionState::Disconnected("broker closed".to_string()),
        };
        assert!(error.to_string().contains("broker closed"));
    }

    #[test]
    fn test_all_variants_display_non_empty() {
        let errors = vec![
            BridgeError::auth("x"),
            BridgeError::transport("x"),
            BridgeError::protocol("x"),
            BridgeError::NotConnected {
                state: ConnectionState::Connecting,
            },
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}

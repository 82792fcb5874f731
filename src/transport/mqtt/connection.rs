//! Connection state, endpoint resolution, and MQTT option construction.
//!
//! Pure pieces of the realtime channel: the state machine vocabulary, the
//! broker endpoint (with parsing from the backend's "inception address"
//! URI), the supervised-retry backoff schedule, and the rumqttc options
//! builder for the websocket transport.

use crate::config::MqttSection;
use crate::error::{BridgeError, BridgeResult};
use rumqttc::{MqttOptions, Transport};
use std::time::Duration;
use url::Url;

/// Connection state for the realtime channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// No usable connection; carries the reason for the last drop.
    Disconnected(String),
    /// Connection attempt in flight, waiting for the broker's acknowledgment.
    Connecting,
    /// Acknowledged and ready for publish/subscribe.
    Connected,
}

/// Realtime broker address: host, port, and websocket path.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl Default for BrokerEndpoint {
    fn default() -> Self {
        Self {
            host: "us-mqtt.cloud.sengled.com".to_string(),
            port: 443,
            path: "/mqtt".to_string(),
        }
    }
}

impl BrokerEndpoint {
    /// Parse the backend's inception address URI.
    ///
    /// The port defaults to 443 when the URI does not carry one. A URI with
    /// no host is rejected; callers keep their previous endpoint in that
    /// case.
    pub fn parse_inception_addr(addr: &str) -> BridgeResult<Self> {
        let url = Url::parse(addr)
            .map_err(|_| BridgeError::protocol(format!("unparseable inception address: {addr}")))?;

        let host = url
            .host_str()
            .ok_or_else(|| {
                BridgeError::protocol(format!("inception address has no host: {addr}"))
            })?
            .to_string();

        Ok(Self {
            host,
            port: url.port().unwrap_or(443),
            path: url.path().to_string(),
        })
    }

    /// Full websocket URL as rumqttc expects it for the broker address.
    pub fn websocket_url(&self) -> String {
        format!("wss://{}:{}{}", self.host, self.port, self.path)
    }
}

/// Supervised-retry schedule for the receive loop.
///
/// Disabled by default: the base behavior is to stay down until the next
/// login re-drives the connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    pub enabled: bool,
    /// Delay pattern in milliseconds for the first attempts.
    pub backoff_pattern: Vec<u64>,
    /// Delay used once the pattern is exhausted.
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backoff_pattern: vec![1_000, 2_000, 5_000, 10_000],
            sustained_delay: 30_000,
        }
    }
}

impl ReconnectConfig {
    pub fn from_section(section: &MqttSection) -> Self {
        Self {
            enabled: section.auto_reconnect,
            backoff_pattern: section.reconnect_backoff_ms.clone(),
            sustained_delay: section.sustained_reconnect_delay_ms,
        }
    }

    /// Backoff delay in milliseconds for the given attempt (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> u64 {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay)
    }
}

/// Client identifier the vendor broker expects: the session token suffixed
/// with the mobile app tag.
pub fn channel_client_id(session_token: &str) -> String {
    format!("{session_token}@lifeApp")
}

/// Build rumqttc options for one connection attempt.
///
/// The channel authenticates with the session token at connection time: it
/// is baked into the client id and carried as a session cookie on the
/// websocket upgrade request.
pub fn configure_mqtt_options(
    session_token: &str,
    endpoint: &BrokerEndpoint,
    keep_alive: Duration,
) -> MqttOptions {
    let mut options = MqttOptions::new(
        channel_client_id(session_token),
        endpoint.websocket_url(),
        endpoint.port,
    );
    options.set_transport(Transport::wss_with_default_config());
    options.set_keep_alive(keep_alive);

    let cookie = format!("JSESSIONID={session_token}");
    options.set_request_modifier(move |mut request: http::Request<()>| {
        let cookie = cookie.clone();
        async move {
            let headers = request.headers_mut();
            if let Ok(value) = http::HeaderValue::from_str(&cookie) {
                headers.insert(http::header::COOKIE, value);
            }
            headers.insert(
                http::HeaderName::from_static("x-requested-with"),
                http::HeaderValue::from_static("com.sengled.life2"),
            );
            request
        }
    });

    options
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoint() {
        let endpoint = BrokerEndpoint::default();
        assert_eq!(endpoint.host, "us-mqtt.cloud.sengled.com");
        assert_eq!(endpoint.port, 443);
        assert_eq!(endpoint.path, "/mqtt");
    }

    #[test]
    fn test_parse_inception_addr_with_explicit_port() {
        let endpoint =
            BrokerEndpoint::parse_inception_addr("wss://eu-mqtt.cloud.sengled.com:8443/mqtt")
                .unwrap();
        assert_eq!(endpoint.host, "eu-mqtt.cloud.sengled.com");
        assert_eq!(endpoint.port, 8443);
        assert_eq!(endpoint.path, "/mqtt");
    }

    #[test]
    fn test_parse_inception_addr_defaults_port_to_443() {
        let endpoint =
            BrokerEndpoint::parse_inception_addr("wss://us-mqtt.cloud.sengled.com/mqtt").unwrap();
        assert_eq!(endpoint.port, 443);
    }

    #[test]
    fn test_parse_inception_addr_rejects_junk() {
        assert!(BrokerEndpoint::parse_inception_addr("not a uri").is_err());
        assert!(BrokerEndpoint::parse_inception_addr("wss:///mqtt").is_err());
    }

    #[test]
    fn test_websocket_url() {
        let endpoint = BrokerEndpoint::default();
        assert_eq!(
            endpoint.websocket_url(),
            "wss://us-mqtt.cloud.sengled.com:443/mqtt"
        );
    }

    #[test]
    fn test_backoff_pattern_then_sustained_delay() {
        let retry = ReconnectConfig::default();
        assert_eq!(retry.backoff_delay(1), 1_000);
        assert_eq!(retry.backoff_delay(2), 2_000);
        assert_eq!(retry.backoff_delay(3), 5_000);
        assert_eq!(retry.backoff_delay(4), 10_000);
        assert_eq!(retry.backoff_delay(5), 30_000);
        assert_eq!(retry.backoff_delay(50), 30_000);
    }

    #[test]
    fn test_backoff_with_empty_pattern_uses_sustained_delay() {
        let retry = ReconnectConfig {
            enabled: true,
            backoff_pattern: vec![],
            sustained_delay: 250,
        };
        assert_eq!(retry.backoff_delay(1), 250);
    }

    #[test]
    fn test_channel_client_id_carries_app_tag() {
        assert_eq!(channel_client_id("abc123"), "abc123@lifeApp");
    }

    #[test]
    fn test_configure_mqtt_options_builds() {
        let options = configure_mqtt_options(
            "token",
            &BrokerEndpoint::default(),
            Duration::from_secs(30),
        );
        assert_eq!(options.keep_alive(), Duration::from_secs(30));
    }
}

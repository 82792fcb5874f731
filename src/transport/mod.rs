//! Transport abstraction for the realtime channel.
//!
//! Device proxies and the client talk to the channel through the [`Channel`]
//! trait so tests can substitute an in-memory implementation; the production
//! implementation is [`mqtt::RealtimeChannel`].

pub mod mqtt;

use crate::error::BridgeResult;
use crate::transport::mqtt::BrokerEndpoint;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Handler invoked with the payload of every message on a subscribed topic.
///
/// Runs on the channel's receive loop, concurrently with caller-initiated
/// work; handlers must do their own locking.
pub type MessageHandler = Arc<dyn Fn(Bytes) + Send + Sync>;

/// Publish/subscribe channel used for realtime status and command delivery.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Establish the connection and start the receive loop. Valid only when
    /// no link exists; requires a session token.
    async fn connect(&self, session_token: &str) -> BridgeResult<()>;

    /// Tear down the current link, re-apply the latest endpoint/credential
    /// configuration, re-establish, and replay the subscription registry.
    async fn reconnect(&self, session_token: &str) -> BridgeResult<()>;

    /// Stop the receive loop and close the connection.
    async fn disconnect(&self) -> BridgeResult<()>;

    /// Point the channel at a new broker endpoint; takes effect on the next
    /// connect or reconnect.
    fn set_endpoint(&self, endpoint: BrokerEndpoint);

    /// Whether the channel currently holds an acknowledged connection.
    fn is_connected(&self) -> bool;

    /// Whether a connection was ever established (used to pick connect vs
    /// reconnect on re-login).
    fn is_started(&self) -> bool;

    /// Publish a message and wait, bounded, for delivery confirmation.
    /// `Ok(false)` covers ordinary delivery failure; `Err` is reserved for
    /// calls made before the channel is connected.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> BridgeResult<bool>;

    /// Issue a subscribe request and record the handler. Returns false when
    /// the channel is not connected or the request is rejected.
    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> bool;

    /// Drop the registry entry for a topic. The broker is not notified.
    fn unsubscribe(&self, topic: &str);
}

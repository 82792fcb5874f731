//! Mock channel implementation.
//!
//! Records publishes and registered handlers in memory so device and client
//! behavior can be exercised without a broker. Inbound pushes are simulated
//! with [`MockChannel::push`].

use crate::error::{BridgeError, BridgeResult};
use crate::transport::mqtt::{BrokerEndpoint, ConnectionState};
use crate::transport::{Channel, MessageHandler};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory stand-in for the realtime channel.
#[derive(Default)]
pub struct MockChannel {
    connected: AtomicBool,
    started: AtomicBool,
    fail_publishes: AtomicBool,
    connect_count: AtomicUsize,
    reconnect_count: AtomicUsize,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    handlers: Mutex<HashMap<String, MessageHandler>>,
    registrations: Mutex<HashMap<String, usize>>,
    endpoint: Mutex<Option<BrokerEndpoint>>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// A channel that already reports Connected, for device-level tests.
    pub fn connected() -> Self {
        let channel = Self::default();
        channel.connected.store(true, Ordering::SeqCst);
        channel.started.store(true, Ordering::SeqCst);
        channel
    }

    /// Make subsequent publishes report delivery failure.
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Everything published so far, in order.
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        lock(&self.published).clone()
    }

    /// Topics with a registered handler, sorted.
    pub fn subscribed_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = lock(&self.handlers).keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Number of handler registrations ever made for a topic, including
    /// re-registrations that replaced an earlier handler.
    pub fn subscription_count(&self, topic: &str) -> usize {
        lock(&self.registrations).get(topic).copied().unwrap_or(0)
    }

    pub fn connect_count(&self) -> usize {
        self.connect_count.load(Ordering::SeqCst)
    }

    pub fn reconnect_count(&self) -> usize {
        self.reconnect_count.load(Ordering::SeqCst)
    }

    pub fn endpoint(&self) -> Option<BrokerEndpoint> {
        lock(&self.endpoint).clone()
    }

    /// Simulate an inbound message on a topic, invoking its handler the way
    /// the receive loop would. Unregistered topics are dropped.
    pub fn push(&self, topic: &str, payload: &[u8]) {
        let handler = lock(&self.handlers).get(topic).cloned();
        if let Some(handler) = handler {
            handler(Bytes::copy_from_slice(payload));
        }
    }
}

#[async_trait]
impl Channel for MockChannel {
    async fn connect(&self, _session_token: &str) -> BridgeResult<()> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn reconnect(&self, _session_token: &str) -> BridgeResult<()> {
        self.reconnect_count.fetch_add(1, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> BridgeResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn set_endpoint(&self, endpoint: BrokerEndpoint) {
        *lock(&self.endpoint) = Some(endpoint);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> BridgeResult<bool> {
        if !self.is_connected() {
            return Err(BridgeError::NotConnected {
                state: ConnectionState::Disconnected("mock not connected".to_string()),
            });
        }
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Ok(false);
        }
        lock(&self.published).push((topic.to_string(), payload));
        Ok(true)
    }

    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> bool {
        if !self.is_connected() {
            return false;
        }
        lock(&self.handlers).insert(topic.to_string(), handler);
        *lock(&self.registrations)
            .entry(topic.to_string())
            .or_insert(0) += 1;
        true
    }

    fn unsubscribe(&self, topic: &str) {
        lock(&self.handlers).remove(topic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_mock_records_publishes() {
        let channel = MockChannel::connected();
        assert!(channel.publish("a/topic", b"payload".to_vec()).await.unwrap());
        assert_eq!(channel.published(), vec![("a/topic".to_string(), b"payload".to_vec())]);
    }

    #[tokio::test]
    async fn test_mock_rejects_publish_when_disconnected() {
        let channel = MockChannel::new();
        assert!(channel.publish("a/topic", vec![]).await.is_err());
    }

    #[tokio::test]
    async fn test_push_routes_to_exact_topic() {
        let channel = MockChannel::connected();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        channel
            .subscribe(
                "a/topic",
                Arc::new(move |_| {
                    hits_clone.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await;

        channel.push("a/topic", b"x");
        channel.push("another/topic", b"x");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}

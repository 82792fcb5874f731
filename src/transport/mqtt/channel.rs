//! Realtime channel over MQTT.
//!
//! Owns the connection lifecycle (connect, disconnect, reconnect with
//! registry replay), confirmed publishes, and inbound dispatch to
//! per-topic handlers. The receive loop runs on its own tokio task;
//! everything here is callable concurrently from host-facing code.

use super::connection::{configure_mqtt_options, BrokerEndpoint, ConnectionState, ReconnectConfig};
use crate::config::MqttSection;
use crate::error::{BridgeError, BridgeResult};
use crate::transport::{Channel, MessageHandler};
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{AsyncClient, Event, EventLoop, Outgoing, Packet, QoS};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Publish progress notifications emitted by the receive loop.
#[derive(Debug, Clone, Copy, PartialEq)]
enum LinkEvent {
    /// A publish left the client with this packet id.
    Queued(u16),
    /// The broker acknowledged the packet id.
    Acked(u16),
}

/// Handles tied to one live connection.
struct ActiveLink {
    client: AsyncClient,
    shutdown_tx: watch::Sender<bool>,
    events_tx: broadcast::Sender<LinkEvent>,
    loop_handle: JoinHandle<()>,
}

type Registry = Arc<Mutex<HashMap<String, MessageHandler>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// MQTT-backed publish/subscribe channel.
///
/// Subscriptions are channel-scoped, not connection-scoped: the registry
/// survives reconnects and is replayed on every broker acknowledgment, so a
/// fresh link picks up exactly the topics registered before the drop.
pub struct RealtimeChannel {
    endpoint: Mutex<BrokerEndpoint>,
    registry: Registry,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    link: AsyncMutex<Option<ActiveLink>>,
    /// Serializes publishes so packet-id acknowledgments can be matched to
    /// the single in-flight publish.
    publish_gate: AsyncMutex<()>,
    started: AtomicBool,
    retry: ReconnectConfig,
    keep_alive: Duration,
    publish_timeout: Duration,
    connect_timeout: Duration,
}

impl RealtimeChannel {
    pub fn new(section: &MqttSection) -> Self {
        let (state_tx, state_rx) =
            watch::channel(ConnectionState::Disconnected("not started".to_string()));
        Self {
            endpoint: Mutex::new(BrokerEndpoint::default()),
            registry: Arc::new(Mutex::new(HashMap::new())),
            state_tx,
            state_rx,
            link: AsyncMutex::new(None),
            publish_gate: AsyncMutex::new(()),
            started: AtomicBool::new(false),
            retry: ReconnectConfig::from_section(section),
            keep_alive: Duration::from_secs(section.keep_alive_secs),
            publish_timeout: Duration::from_secs(section.publish_timeout_secs),
            connect_timeout: Duration::from_secs(section.connect_timeout_secs),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// The endpoint the next connection attempt will use.
    pub fn endpoint(&self) -> BrokerEndpoint {
        lock(&self.endpoint).clone()
    }

    /// Topics currently held in the subscription registry.
    pub fn subscribed_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = lock(&self.registry).keys().cloned().collect();
        topics.sort();
        topics
    }

    async fn connect_link(&self, session_token: &str) -> BridgeResult<()> {
        if session_token.is_empty() {
            return Err(BridgeError::auth("realtime connect requires a session token"));
        }

        let mut link = self.link.lock().await;
        if link.is_some() {
            return Err(BridgeError::transport(
                "realtime channel already started; use reconnect",
            ));
        }

        let endpoint = self.endpoint();
        info!(
            host = %endpoint.host,
            port = endpoint.port,
            path = %endpoint.path,
            "connecting realtime channel"
        );

        let options = configure_mqtt_options(session_token, &endpoint, self.keep_alive);
        let (client, event_loop) = AsyncClient::new(options, 10);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events_tx, _) = broadcast::channel(64);

        let _ = self.state_tx.send(ConnectionState::Connecting);
        let handle = tokio::spawn(run_receive_loop(
            event_loop,
            client.clone(),
            self.registry.clone(),
            self.state_tx.clone(),
            events_tx.clone(),
            shutdown_rx,
            self.retry.clone(),
        ));

        if let Err(err) = wait_for_connected(self.state_rx.clone(), self.connect_timeout).await {
            let _ = shutdown_tx.send(true);
            handle.abort();
            let _ = self
                .state_tx
                .send(ConnectionState::Disconnected("connect failed".to_string()));
            return Err(err);
        }

        *link = Some(ActiveLink {
            client,
            shutdown_tx,
            events_tx,
            loop_handle: handle,
        });
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect_link(&self) -> BridgeResult<()> {
        let mut link = self.link.lock().await;
        let Some(active) = link.take() else {
            return Ok(());
        };

        let _ = active.shutdown_tx.send(true);
        // Best effort: the broker may already be gone.
        let _ = active.client.disconnect().await;

        let abort = active.loop_handle.abort_handle();
        match tokio::time::timeout(Duration::from_secs(2), active.loop_handle).await {
            Ok(Ok(())) => debug!("receive loop stopped"),
            Ok(Err(err)) if !err.is_cancelled() => {
                warn!(error = %err, "receive loop ended with error")
            }
            Err(_) => {
                warn!("receive loop did not stop in time, aborting");
                abort.abort();
            }
            _ => {}
        }

        let _ = self
            .state_tx
            .send(ConnectionState::Disconnected("client disconnected".to_string()));
        info!("realtime channel disconnected");
        Ok(())
    }

    async fn publish_confirmed(&self, topic: &str, payload: Vec<u8>) -> BridgeResult<bool> {
        let (client, events_tx) = {
            let link = self.link.lock().await;
            match link.as_ref() {
                Some(active) => (active.client.clone(), active.events_tx.clone()),
                None => {
                    return Err(BridgeError::NotConnected {
                        state: self.state(),
                    })
                }
            }
        };
        if self.state() != ConnectionState::Connected {
            return Err(BridgeError::NotConnected {
                state: self.state(),
            });
        }

        let _gate = self.publish_gate.lock().await;
        let mut events = events_tx.subscribe();

        if let Err(err) = client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
        {
            warn!(topic = %topic, error = %err, "publish request failed");
            return Ok(false);
        }

        // With the gate held there is exactly one publish in flight: the
        // first queued packet id is ours, and its ack confirms delivery.
        let confirmed = tokio::time::timeout(self.publish_timeout, async {
            let mut pkid = None;
            loop {
                match events.recv().await {
                    Ok(LinkEvent::Queued(id)) if pkid.is_none() => pkid = Some(id),
                    Ok(LinkEvent::Acked(id)) if pkid == Some(id) => return true,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => return false,
                }
            }
        })
        .await
        .unwrap_or(false);

        if !confirmed {
            warn!(topic = %topic, "publish not confirmed in time");
        }
        Ok(confirmed)
    }

    async fn subscribe_topic(&self, topic: &str, handler: MessageHandler) -> bool {
        let client = {
            let link = self.link.lock().await;
            match link.as_ref() {
                Some(active) => active.client.clone(),
                None => return false,
            }
        };
        if self.state() != ConnectionState::Connected {
            return false;
        }

        if let Err(err) = client.subscribe(topic, QoS::AtLeastOnce).await {
            warn!(topic = %topic, error = %err, "subscribe request failed");
            return false;
        }

        lock(&self.registry).insert(topic.to_string(), handler);
        debug!(topic = %topic, "subscribed");
        true
    }
}

#[async_trait]
impl Channel for RealtimeChannel {
    async fn connect(&self, session_token: &str) -> BridgeResult<()> {
        self.connect_link(session_token).await
    }

    async fn reconnect(&self, session_token: &str) -> BridgeResult<()> {
        self.disconnect_link().await?;
        self.connect_link(session_token).await
    }

    async fn disconnect(&self) -> BridgeResult<()> {
        self.disconnect_link().await
    }

    fn set_endpoint(&self, endpoint: BrokerEndpoint) {
        *lock(&self.endpoint) = endpoint;
    }

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> BridgeResult<bool> {
        self.publish_confirmed(topic, payload).await
    }

    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> bool {
        self.subscribe_topic(topic, handler).await
    }

    fn unsubscribe(&self, topic: &str) {
        if lock(&self.registry).remove(topic).is_some() {
            debug!(topic = %topic, "subscription registry entry removed");
        }
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        // No async in Drop; signal the receive loop and abort it if the
        // caller skipped disconnect().
        if let Ok(mut link) = self.link.try_lock() {
            if let Some(active) = link.take() {
                let _ = active.shutdown_tx.send(true);
                active.loop_handle.abort();
            }
        }
    }
}

/// Receive loop: polls the event loop, maintains the state machine, replays
/// the registry after every broker acknowledgment, and dispatches inbound
/// messages.
async fn run_receive_loop(
    mut event_loop: EventLoop,
    client: AsyncClient,
    registry: Registry,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: broadcast::Sender<LinkEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
    retry: ReconnectConfig,
) {
    let mut attempt: u32 = 0;
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    debug!("shutdown signal received, stopping receive loop");
                    break;
                }
            }
            polled = event_loop.poll() => match polled {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    attempt = 0;
                    let _ = state_tx.send(ConnectionState::Connected);
                    restore_subscriptions(&client, &registry).await;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    dispatch(&registry, &publish.topic, publish.payload.clone());
                }
                Ok(Event::Incoming(Packet::PubAck(ack))) => {
                    let _ = events_tx.send(LinkEvent::Acked(ack.pkid));
                }
                Ok(Event::Incoming(Packet::SubAck(suback))) => {
                    trace!(pkid = suback.pkid, "subscription acknowledged");
                }
                Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                    let _ = events_tx.send(LinkEvent::Queued(pkid));
                }
                Ok(event) => {
                    trace!(?event, "mqtt event");
                }
                Err(err) => {
                    warn!(error = %err, "realtime transport error");
                    let _ = state_tx.send(ConnectionState::Disconnected(err.to_string()));
                    if !retry.enabled {
                        break;
                    }
                    attempt = attempt.saturating_add(1);
                    let delay = retry.backoff_delay(attempt);
                    info!(attempt, delay_ms = delay, "retrying realtime connection");
                    if !interruptible_sleep(&mut shutdown_rx, Duration::from_millis(delay)).await {
                        break;
                    }
                    let _ = state_tx.send(ConnectionState::Connecting);
                }
            }
        }
    }
    debug!("receive loop exited");
}

/// Exact-topic dispatch; unmatched topics are dropped.
fn dispatch(registry: &Registry, topic: &str, payload: Bytes) {
    let handler = lock(registry).get(topic).cloned();
    match handler {
        Some(handler) => handler(payload),
        None => trace!(topic = %topic, "dropping message for unregistered topic"),
    }
}

/// Replay every registry entry as a fresh subscribe call.
///
/// The topic set is snapshotted under the registry lock so a reconnect never
/// exposes a partially restored subscription set.
async fn restore_subscriptions(client: &AsyncClient, registry: &Registry) {
    let topics: Vec<String> = lock(registry).keys().cloned().collect();
    for topic in topics {
        if let Err(err) = client.subscribe(&topic, QoS::AtLeastOnce).await {
            warn!(topic = %topic, error = %err, "re-subscribe failed");
        } else {
            debug!(topic = %topic, "subscription restored");
        }
    }
}

/// Sleep that gives up early when shutdown is signalled. Returns false on
/// shutdown.
async fn interruptible_sleep(shutdown_rx: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        _ = shutdown_rx.changed() => !*shutdown_rx.borrow(),
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Wait for the state machine to report Connected, bounded by `timeout`.
async fn wait_for_connected(
    mut state_rx: watch::Receiver<ConnectionState>,
    timeout: Duration,
) -> BridgeResult<()> {
    let outcome = tokio::time::timeout(timeout, async {
        loop {
            let state = state_rx.borrow_and_update().clone();
            match state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Disconnected(reason) => {
                    return Err(BridgeError::transport(reason));
                }
                ConnectionState::Connecting => {}
            }
            if state_rx.changed().await.is_err() {
                return Err(BridgeError::transport("connection state channel closed"));
            }
        }
    })
    .await;

    match outcome {
        Ok(result) => result,
        Err(_) => Err(BridgeError::transport(
            "timed out waiting for broker acknowledgment",
        )),
    }
}

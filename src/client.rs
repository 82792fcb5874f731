//! Top-level cloud client: session orchestration and the device directory.
//!
//! Ties the REST layer and the realtime channel together. A successful login
//! drives everything else: endpoint discovery, channel (re)connection, and a
//! forced directory refresh. The host layer only ever sees boolean success
//! from here; causes are logged.

use crate::api::{self, DeviceRecord, SessionManager};
use crate::config::BridgeConfig;
use crate::device::Bulb;
use crate::error::{BridgeError, BridgeResult};
use crate::transport::mqtt::RealtimeChannel;
use crate::transport::Channel;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Client for one Sengled cloud account.
pub struct SengledClient {
    session: SessionManager,
    channel: Arc<dyn Channel>,
    devices: Mutex<Vec<Arc<Bulb>>>,
    /// Serializes login so concurrent calls cannot race a reconnect storm.
    login_gate: Mutex<()>,
    scanning: AtomicBool,
}

impl SengledClient {
    /// Build a client with the production MQTT channel.
    pub fn new(config: &BridgeConfig) -> BridgeResult<Self> {
        let channel = Arc::new(RealtimeChannel::new(&config.mqtt));
        Self::with_channel(config, channel)
    }

    /// Build a client on an explicit channel implementation. The seam used
    /// by tests; production callers want [`SengledClient::new`].
    pub fn with_channel(config: &BridgeConfig, channel: Arc<dyn Channel>) -> BridgeResult<Self> {
        Ok(Self {
            session: SessionManager::new(config)?,
            channel,
            devices: Mutex::new(Vec::new()),
            login_gate: Mutex::new(()),
            scanning: AtomicBool::new(false),
        })
    }

    /// Log in, bringing the whole client online.
    ///
    /// When the stored token still probes live this is a success with no
    /// further action. Otherwise: re-authenticate, re-resolve the realtime
    /// endpoint (failure keeps the previous one), connect or reconnect the
    /// channel, and force-refresh the directory. Returns false on failure
    /// and leaves prior state untouched; retrying is the caller's call.
    pub async fn login(&self) -> bool {
        let _gate = self.login_gate.lock().await;
        match self.try_login().await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "login failed");
                false
            }
        }
    }

    async fn try_login(&self) -> BridgeResult<()> {
        let session_live = self.session.token().is_some() && self.session.probe_alive().await;
        if session_live && self.channel.is_connected() {
            debug!("session live and channel connected, nothing to do");
            return Ok(());
        }

        // A live session with a dead channel still needs the bring-up below:
        // login is the only trigger that reconnects the realtime channel.
        if !session_live {
            self.session.clear_token();
            self.session.authenticate().await?;
        }
        let token = self
            .session
            .token()
            .ok_or_else(|| BridgeError::auth("no session token after authentication"))?;

        match api::resolve_endpoint(&self.session).await {
            Ok(endpoint) => {
                info!(host = %endpoint.host, port = endpoint.port, "realtime endpoint resolved");
                self.channel.set_endpoint(endpoint);
            }
            Err(err) => {
                warn!(error = %err, "endpoint discovery failed, keeping previous endpoint");
            }
        }

        if self.channel.is_started() {
            self.channel.reconnect(&token).await?;
        } else {
            self.channel.connect(&token).await?;
        }

        self.devices(true).await;
        Ok(())
    }

    /// Disconnect the realtime channel. The session token is kept; a later
    /// `login()` decides whether it is still usable.
    pub async fn shutdown(&self) {
        if let Err(err) = self.channel.disconnect().await {
            warn!(error = %err, "error during channel shutdown");
        }
    }

    /// The device directory.
    ///
    /// Returns the cached proxy list unless a refresh is forced or the cache
    /// is empty. Fetch failures degrade to the cached list. Devices that
    /// disappear from the backend's list are kept: proxies live for the
    /// whole process.
    pub async fn devices(&self, force_refresh: bool) -> Vec<Arc<Bulb>> {
        let mut cache = self.devices.lock().await;

        if self.session.token().is_none() {
            return cache.clone();
        }
        if !cache.is_empty() && !force_refresh {
            return cache.clone();
        }

        let records = match api::fetch_device_list(&self.session).await {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "device list fetch failed, serving cache");
                return cache.clone();
            }
        };

        for record in records {
            self.admit_record(&mut cache, record).await;
        }
        cache.clone()
    }

    /// Look up a device proxy by identifier.
    pub async fn device(&self, uuid: &str) -> Option<Arc<Bulb>> {
        self.devices
            .lock()
            .await
            .iter()
            .find(|bulb| bulb.uuid() == uuid)
            .cloned()
    }

    /// Refresh the directory and walk it, invoking `on_found` per device.
    ///
    /// The walk checks a shared cancellation flag between devices, so
    /// [`SengledClient::cancel_scan`] from another task stops it at the next
    /// iteration; in-flight network calls are not preempted. Returns the
    /// number of devices visited.
    pub async fn scan<F: FnMut(&Arc<Bulb>)>(&self, mut on_found: F) -> usize {
        if self.scanning.swap(true, Ordering::SeqCst) {
            return 0;
        }

        let devices = self.devices(true).await;
        let mut visited = 0;
        for bulb in &devices {
            if !self.scanning.load(Ordering::SeqCst) {
                debug!("device scan cancelled");
                break;
            }
            on_found(bulb);
            visited += 1;
        }

        self.scanning.store(false, Ordering::SeqCst);
        visited
    }

    /// Cooperatively cancel a scan in progress.
    pub fn cancel_scan(&self) {
        self.scanning.store(false, Ordering::SeqCst);
    }

    async fn admit_record(&self, cache: &mut Vec<Arc<Bulb>>, record: DeviceRecord) {
        if cache.iter().any(|bulb| bulb.uuid() == record.device_uuid) {
            return;
        }
        info!(device = %record.device_uuid, type_code = %record.type_code, "new device discovered");
        let bulb = Bulb::subscribe_new(self.channel.clone(), record).await;
        cache.push(bulb);
    }
}

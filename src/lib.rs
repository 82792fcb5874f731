//! Cloud client for Sengled Wi-Fi LED bulbs.
//!
//! Two transports cooperate: a REST backend for authentication and device
//! enumeration, and a persistent MQTT-over-websocket channel for realtime
//! state push and command delivery. The client keeps a per-device attribute
//! model consistent under concurrent inbound pushes and outbound commands,
//! and survives session expiry by re-authenticating and replaying its
//! subscription registry on reconnect.
//!
//! # Quick start
//!
//! ```no_run
//! use sengled_bridge::{BridgeConfig, SengledClient};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BridgeConfig::load_from_file("bridge.toml")?;
//! let client = SengledClient::new(&config)?;
//!
//! if client.login().await {
//!     for bulb in client.devices(false).await {
//!         println!("{} {}", bulb.uuid(), bulb.name());
//!         bulb.set_observer(Box::new(|name, value| {
//!             println!("changed: {name} = {value:?}");
//!         }));
//!     }
//!     if let Some(bulb) = client.device("B0:CE:18:01:02:03").await {
//!         bulb.toggle(true).await;
//!         bulb.set_brightness(60).await;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod device;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod testing;
pub mod transport;

pub use client::SengledClient;
pub use config::{BridgeConfig, ConfigError};
pub use device::{Attribute, AttributeStore, Bulb, ObserverFn, PropertyValue};
pub use error::{BridgeError, BridgeResult};
pub use transport::mqtt::{BrokerEndpoint, ConnectionState, RealtimeChannel};
pub use transport::{Channel, MessageHandler};

//! MQTT implementation of the realtime channel.

mod channel;
mod connection;

pub use channel::RealtimeChannel;
pub use connection::{configure_mqtt_options, BrokerEndpoint, ConnectionState, ReconnectConfig};

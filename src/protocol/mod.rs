//! Wire formats for the realtime channel.
//!
//! Inbound status deltas and outbound command messages, plus the per-device
//! topic layout used by the vendor broker.

pub mod messages;
pub mod topics;

pub use messages::{clamp_level, parse_status_payload, CommandMessage, StatusEntry};
pub use topics::{status_topic, update_topic};

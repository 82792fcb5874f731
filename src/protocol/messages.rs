//! Status and command message types.
//!
//! The broker pushes status deltas as a JSON array of `{dn, type, value}`
//! entries; commands go out as a single JSON object with the same field
//! names plus a millisecond timestamp. All values travel as strings; typed
//! interpretation happens at the attribute store.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// One inbound attribute delta.
///
/// Every field is optional on the wire: entries missing `dn` or `type` are
/// skipped by the device proxy rather than failing the whole payload.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StatusEntry {
    /// Device identifier the delta applies to.
    pub dn: Option<String>,
    /// Attribute name, e.g. "switch" or "brightness".
    #[serde(rename = "type")]
    pub attribute: Option<String>,
    /// New raw value, string-encoded.
    pub value: Option<String>,
}

/// Parse a status payload into its entries.
///
/// Returns `None` for anything that is not a JSON array of objects; malformed
/// pushes are dropped by the caller, never surfaced.
pub fn parse_status_payload(payload: &[u8]) -> Option<Vec<StatusEntry>> {
    serde_json::from_slice(payload).ok()
}

/// One outbound device command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandMessage {
    pub dn: String,
    #[serde(rename = "type")]
    pub attribute: String,
    pub value: String,
    /// Epoch milliseconds at build time.
    pub time: i64,
}

impl CommandMessage {
    /// Build a switch command; `on` maps to the literal "1"/"0".
    pub fn switch(device_uuid: &str, on: bool) -> Self {
        Self::stamped(device_uuid, "switch", if on { "1" } else { "0" }.to_string())
    }

    /// Build a brightness command, clamping the level to [0, 100].
    pub fn brightness(device_uuid: &str, level: i64) -> Self {
        Self::stamped(device_uuid, "brightness", clamp_level(level).to_string())
    }

    fn stamped(device_uuid: &str, attribute: &str, value: String) -> Self {
        Self {
            dn: device_uuid.to_string(),
            attribute: attribute.to_string(),
            value,
            time: Utc::now().timestamp_millis(),
        }
    }
}

/// Clamp a brightness level to the range the bulbs accept.
pub fn clamp_level(level: i64) -> i64 {
    level.clamp(0, 100)
}

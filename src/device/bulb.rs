//! Device proxy for one Wi-Fi bulb.
//!
//! Each proxy owns its attribute store, subscribes to the device's status
//! topic at construction, republishes commands to the update topic, and
//! notifies a registered observer when a recognized attribute changes.

use super::attributes::AttributeStore;
use super::properties::{canonical_name, PropertyValue};
use super::lock;
use crate::api::devices::DeviceRecord;
use crate::protocol::{parse_status_payload, topics, CommandMessage};
use crate::transport::{Channel, MessageHandler};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace, warn};

/// Observer invoked with the normalized property name and its decoded
/// current value on every recognized inbound delta.
pub type ObserverFn = Box<dyn Fn(&str, PropertyValue) + Send + Sync>;

/// In-process representative of one physical bulb.
pub struct Bulb {
    uuid: String,
    category: String,
    type_code: String,
    attributes: Mutex<AttributeStore>,
    channel: Arc<dyn Channel>,
    observer: Mutex<Option<ObserverFn>>,
}

impl Bulb {
    /// Build a proxy from a directory record and subscribe its status topic.
    ///
    /// Proxies are normally constructed with the channel already up (login
    /// connects before the directory refresh). A failed subscribe is logged
    /// and shows up as missing realtime updates for this device.
    pub async fn subscribe_new(channel: Arc<dyn Channel>, record: DeviceRecord) -> Arc<Self> {
        let bulb = Arc::new(Self {
            uuid: record.device_uuid,
            category: record.category,
            type_code: record.type_code,
            attributes: Mutex::new(AttributeStore::new(record.attribute_list)),
            channel,
            observer: Mutex::new(None),
        });

        let weak = Arc::downgrade(&bulb);
        let handler: MessageHandler = Arc::new(move |payload| {
            if let Some(bulb) = weak.upgrade() {
                bulb.apply_status_payload(&payload);
            }
        });

        let topic = topics::status_topic(&bulb.uuid);
        if !bulb.channel.subscribe(&topic, handler).await {
            warn!(device = %bulb.uuid, "status subscription not established yet");
        }

        bulb
    }

    /// Register the host-facing attribute change observer.
    pub fn set_observer(&self, observer: ObserverFn) {
        *lock(&self.observer) = Some(observer);
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Switch the bulb on or off. Returns the channel's delivery flag.
    pub async fn toggle(&self, on: bool) -> bool {
        self.send_command(CommandMessage::switch(&self.uuid, on)).await
    }

    /// Set brightness, clamped to [0, 100]. Returns the delivery flag.
    pub async fn set_brightness(&self, level: i64) -> bool {
        self.send_command(CommandMessage::brightness(&self.uuid, level))
            .await
    }

    async fn send_command(&self, command: CommandMessage) -> bool {
        let Ok(payload) = serde_json::to_vec(&command) else {
            return false;
        };
        let topic = topics::update_topic(&self.uuid);
        match self.channel.publish(&topic, payload).await {
            Ok(delivered) => delivered,
            Err(err) => {
                warn!(device = %self.uuid, error = %err, "command not sent");
                false
            }
        }
    }

    /// Apply one inbound status payload.
    ///
    /// Malformed payloads are discarded. Entries missing a device id or
    /// attribute name, addressed to another device, or naming an attribute
    /// this device does not carry are skipped without error.
    pub(crate) fn apply_status_payload(&self, payload: &[u8]) {
        let Some(entries) = parse_status_payload(payload) else {
            trace!(device = %self.uuid, "discarding malformed status payload");
            return;
        };

        for entry in entries {
            let (Some(dn), Some(attribute)) = (entry.dn, entry.attribute) else {
                continue;
            };
            if dn != self.uuid {
                continue;
            }
            let value = entry.value.unwrap_or_default();

            let updated = lock(&self.attributes).apply(&attribute, value);
            if !updated {
                continue;
            }
            debug!(device = %self.uuid, attribute = %attribute, "attribute updated");
            self.notify(&attribute);
        }
    }

    /// Invoke the observer for a raw attribute name, but only when its
    /// normalized property name has an accessor.
    fn notify(&self, attribute: &str) {
        let name = canonical_name(attribute);
        let Some(value) = self.property_value(name) else {
            return;
        };
        if let Some(observer) = lock(&self.observer).as_ref() {
            observer(name, value);
        }
    }

    /// Decode the current value of a normalized property.
    ///
    /// The match is the complete accessor table: names outside it have no
    /// property representation and never reach the observer.
    pub fn property_value(&self, name: &str) -> Option<PropertyValue> {
        let value = match name {
            "brightness" => PropertyValue::Int(self.brightness()),
            "consumption_time" => PropertyValue::Int(self.consumption_time()),
            "rssi" => PropertyValue::Int(self.rssi()),
            "identify_no" => PropertyValue::Text(self.identify_no()),
            "ip" => PropertyValue::Text(self.ip()),
            "name" => PropertyValue::Text(self.name()),
            "online" => PropertyValue::Bool(self.online()),
            "product_code" => PropertyValue::Text(self.product_code()),
            "save_flag" => PropertyValue::Bool(self.save_flag()),
            "start_time" => PropertyValue::Text(self.start_time()),
            "support_attributes" => PropertyValue::Text(self.support_attributes()),
            "switch" => PropertyValue::Bool(self.on()),
            "time_zone" => PropertyValue::Text(self.time_zone()),
            "type_code" => PropertyValue::Text(self.type_code()),
            "version" => PropertyValue::Text(self.version()),
            _ => return None,
        };
        Some(value)
    }

    // Typed accessors decode from the raw store on every access.

    /// Whether the bulb is switched on.
    pub fn on(&self) -> bool {
        lock(&self.attributes).get_bool("switch")
    }

    /// Brightness level, 0-100.
    pub fn brightness(&self) -> i64 {
        lock(&self.attributes).get_int("brightness")
    }

    pub fn consumption_time(&self) -> i64 {
        lock(&self.attributes).get_int("consumptionTime")
    }

    /// Wi-Fi signal strength as reported by the bulb.
    pub fn rssi(&self) -> i64 {
        lock(&self.attributes).get_int("deviceRssi")
    }

    pub fn identify_no(&self) -> String {
        lock(&self.attributes).get_str("identifyNO")
    }

    pub fn ip(&self) -> String {
        lock(&self.attributes).get_str("ip")
    }

    /// User-assigned bulb name.
    pub fn name(&self) -> String {
        lock(&self.attributes).get_str("name")
    }

    /// Whether the bulb is reachable from the cloud.
    pub fn online(&self) -> bool {
        lock(&self.attributes).get_bool("online")
    }

    pub fn product_code(&self) -> String {
        lock(&self.attributes).get_str("product_code")
    }

    pub fn save_flag(&self) -> bool {
        lock(&self.attributes).get_bool("save_flag")
    }

    /// Time the bulb last joined the network.
    pub fn start_time(&self) -> String {
        lock(&self.attributes).get_str("start_time")
    }

    pub fn support_attributes(&self) -> String {
        lock(&self.attributes).get_str("support_attributes")
    }

    /// Hardware type code; falls back to the directory record's value when
    /// the attribute is absent.
    pub fn type_code(&self) -> String {
        let value = lock(&self.attributes).get_str("type_code");
        if value.is_empty() {
            self.type_code.clone()
        } else {
            value
        }
    }

    pub fn time_zone(&self) -> String {
        lock(&self.attributes).get_str("time_zone")
    }

    /// Firmware version.
    pub fn version(&self) -> String {
        lock(&self.attributes).get_str("version")
    }
}

impl std::fmt::Debug for Bulb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bulb")
            .field("uuid", &self.uuid)
            .field("category", &self.category)
            .field("type_code", &self.type_code)
            .finish_non_exhaustive()
    }
}

//! Per-device topic construction.

/// Topic the broker pushes attribute deltas on: `wifielement/{uuid}/status`.
pub fn status_topic(device_uuid: &str) -> String {
    format!("wifielement/{device_uuid}/status")
}

/// Topic device commands are published to: `wifielement/{uuid}/update`.
pub fn update_topic(device_uuid: &str) -> String {
    format!("wifielement/{device_uuid}/update")
}

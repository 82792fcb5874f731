//! Canonical property naming.
//!
//! The backend mixes camelCase and snake_case attribute names. Observers see
//! one normalized vocabulary: a fixed translation table maps the camelCase
//! wire names onto their snake_case property names, and anything not in the
//! table passes through unchanged ("switch", "brightness", "ip", ...).

use once_cell::sync::Lazy;
use std::collections::HashMap;

static CANONICAL: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("consumptionTime", "consumption_time"),
        ("deviceRssi", "rssi"),
        ("identifyNO", "identify_no"),
        ("productCode", "product_code"),
        ("saveFlag", "save_flag"),
        ("startTime", "start_time"),
        ("supportAttributes", "support_attributes"),
        ("timeZone", "time_zone"),
        ("typeCode", "type_code"),
    ])
});

/// Normalize a raw attribute name to its property name.
pub fn canonical_name(attribute: &str) -> &str {
    CANONICAL.get(attribute).copied().unwrap_or(attribute)
}

/// A decoded property value handed to observers.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

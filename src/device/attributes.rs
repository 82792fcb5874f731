//! Ordered per-device attribute storage.
//!
//! Attributes arrive from the directory fetch as an ordered name/value list
//! and are mutated only by inbound status deltas. Values stay string-encoded
//! at rest; the typed accessors decode on every read and fall back to a
//! documented default (0, "", false) when a name is absent.

use serde::{Deserialize, Serialize};

/// One raw attribute as the backend reports it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// Ordered list of a device's attributes.
///
/// Names are unique within one device's list; lookups scan in order and use
/// the first match.
#[derive(Debug, Clone, Default)]
pub struct AttributeStore {
    entries: Vec<Attribute>,
}

impl AttributeStore {
    pub fn new(entries: Vec<Attribute>) -> Self {
        Self { entries }
    }

    /// Raw string value, or "" when the name is absent.
    pub fn get_str(&self, name: &str) -> String {
        self.find(name).cloned().unwrap_or_default()
    }

    /// Base-10 integer value, or 0 when the name is absent or undecodable.
    pub fn get_int(&self, name: &str) -> i64 {
        self.find(name)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0)
    }

    /// Boolean value: true iff the raw value is exactly "1".
    pub fn get_bool(&self, name: &str) -> bool {
        self.find(name).map(|v| v == "1").unwrap_or(false)
    }

    /// Apply one inbound delta.
    ///
    /// Only an existing attribute name is updated; unknown names are ignored
    /// so newer firmware can report attributes this client does not model.
    /// Returns whether anything changed.
    pub fn apply(&mut self, name: &str, value: String) -> bool {
        for attr in &mut self.entries {
            if attr.name == name {
                attr.value = value;
                return true;
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn find(&self, name: &str) -> Option<&String> {
        self.entries
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| &attr.value)
    }
}

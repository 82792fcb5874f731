//! Per-device state: the attribute store, the canonical property table, and
//! the bulb proxy that ties them to the realtime channel.

pub mod attributes;
pub mod bulb;
pub mod properties;

pub use attributes::{Attribute, AttributeStore};
pub use bulb::{Bulb, ObserverFn};
pub use properties::{canonical_name, PropertyValue};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

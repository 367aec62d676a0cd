//! Notification payloads and well-known event names.

use crate::model::instance::Instance;
use serde_json::Value;

/// Generic field change, emitted before the field-scoped variant.
pub const CHANGE: &str = "change";
/// A fresh instance was constructed through `Model::create*`.
pub const NEW: &str = "new";
pub const FETCH: &str = "fetch";
pub const SAVE: &str = "save";
pub const DELETE: &str = "delete";
/// One record was bulk-loaded into a store (type channel only).
pub const ADD: &str = "add";
/// A bulk load finished (type channel only).
pub const LOAD: &str = "load";

/// Returns the field-scoped change event name, e.g. `change:username`.
pub fn change_event(field: &str) -> String {
    format!("{CHANGE}:{field}")
}

/// One observed field transition. `None` means the field was unset.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: String,
    pub new_value: Option<Value>,
    pub old_value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Empty,
    Change(FieldChange),
    /// Free-form arguments for user-defined events.
    Args(Vec<Value>),
}

/// Event published on an instance channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub name: String,
    pub payload: Payload,
}

impl Notification {
    pub fn new(name: impl Into<String>, payload: Payload) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    pub fn change(&self) -> Option<&FieldChange> {
        match &self.payload {
            Payload::Change(change) => Some(change),
            _ => None,
        }
    }
}

/// Event published on a model type channel.
///
/// `instance` is set for every notification bridged from an instance and
/// for per-record store events; it is `None` for type-only events such as
/// `fetch` and `load` after bulk operations.
#[derive(Debug, Clone)]
pub struct TypeNotification {
    pub instance: Option<Instance>,
    pub notification: Notification,
}

impl TypeNotification {
    pub fn name(&self) -> &str {
        &self.notification.name
    }

    pub fn change(&self) -> Option<&FieldChange> {
        self.notification.change()
    }
}

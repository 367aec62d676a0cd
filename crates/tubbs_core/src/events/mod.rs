//! Notification channels shared by model types and instances.
//!
//! # Responsibility
//! - Provide one explicit subscribe/unsubscribe/publish interface used by
//!   both instance-level and type-level channels.
//! - Define the notification payloads emitted by field writes and CRUD
//!   lifecycle steps.
//!
//! # Invariants
//! - Listeners run synchronously, in registration order, on the caller's stack.
//! - No channel borrow is held while a listener runs.

pub mod emitter;
pub mod notification;

pub use emitter::{Emitter, ListenerId, NotificationChannel};
pub use notification::{
    change_event, FieldChange, Notification, Payload, TypeNotification, ADD, CHANGE, DELETE,
    FETCH, LOAD, NEW, SAVE,
};

//! Data-backed model types with field dispatch, change events and pluggable
//! storage.
//!
//! A `Model` is defined once through `ModelBuilder` (or a `ModelSchema`),
//! produces `Instance` handles, and forwards persistence to a `DataStore`.

pub mod db;
pub mod events;
pub mod logging;
pub mod model;
pub mod store;

pub use events::{
    Emitter, FieldChange, ListenerId, Notification, NotificationChannel, Payload,
    TypeNotification,
};
pub use logging::{default_log_level, init_logging, LoggingConfig, LoggingError};
pub use model::definition::{Model, ModelBuilder};
pub use model::error::ModelError;
pub use model::field::{FieldDescriptor, FieldTable};
pub use model::identity::{IdentityGenerator, ProcessIdentity, SequenceIdentity};
pub use model::instance::Instance;
pub use model::schema::ModelSchema;
pub use store::memory::MemoryStore;
pub use store::sqlite::SqliteStore;
pub use store::{
    DataStore, PendingRecord, RecordInput, RecordRef, Seed, StoreError, StoreResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}

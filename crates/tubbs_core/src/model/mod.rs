//! Model definitions, instances and their field dispatch.
//!
//! # Responsibility
//! - Turn a declarative field list into one shared field table per model type.
//! - Hold per-instance state (data map, dirty flag, identity token).
//! - Route every write through change detection and notification.
//!
//! # Invariants
//! - `Instance::is_new()` holds exactly when the primary-key field is unset.
//! - Writing a field to the value it already holds never marks dirty and
//!   never emits.
//! - Instances never share their data map, even within one model type.

pub mod definition;
pub mod error;
pub mod field;
pub mod identity;
pub mod instance;
pub mod naming;
pub mod schema;

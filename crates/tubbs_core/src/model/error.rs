//! Configuration errors raised while defining or reconfiguring a model.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Definition-time error. Never produced by ordinary field writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Field name collides with an accessor every instance already exposes.
    ReservedFieldName(String),
    InvalidFieldName(String),
    /// Field declared twice and the first declaration is not configurable.
    DuplicateField(String),
    InvalidPrimaryKey(String),
    /// The operation needs a primary key but the model has none.
    MissingPrimaryKey,
    /// Class-derived naming was requested for a model without a class name.
    MissingClassName,
    InvalidSchema(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReservedFieldName(name) => {
                write!(f, "field name `{name}` is reserved by the model accessors")
            }
            Self::InvalidFieldName(name) => write!(f, "invalid field name `{name}`"),
            Self::DuplicateField(name) => {
                write!(f, "field `{name}` is already declared and not configurable")
            }
            Self::InvalidPrimaryKey(name) => write!(f, "invalid primary key field `{name}`"),
            Self::MissingPrimaryKey => write!(f, "model has no primary key field"),
            Self::MissingClassName => {
                write!(f, "model has no class name; class-derived naming is unavailable")
            }
            Self::InvalidSchema(message) => write!(f, "invalid model schema: {message}"),
        }
    }
}

impl Error for ModelError {}

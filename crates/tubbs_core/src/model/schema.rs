//! Declarative model configuration loaded from JSON.
//!
//! Mirrors the option object accepted by `ModelBuilder`: only plain data can
//! be expressed here. Custom setters, computed fields and the data store are
//! attached to the returned builder.

use crate::model::definition::ModelBuilder;
use crate::model::error::ModelError;
use crate::model::field::FieldDescriptor;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ModelSchema {
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub primary_key: Option<String>,
    #[serde(default)]
    pub basic_properties: Vec<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldEntry>,
}

/// One entry of `fields`: either a descriptor object or a bare default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FieldEntry {
    Spec(FieldSpec),
    Default(Value),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default = "default_true")]
    pub enumerable: bool,
    /// Unset means writable, except for constant `value` fields.
    #[serde(default)]
    pub writable: Option<bool>,
}

fn default_true() -> bool {
    true
}

impl ModelSchema {
    /// Parses a JSON schema document.
    pub fn from_json(raw: &str) -> Result<Self, ModelError> {
        serde_json::from_str(raw).map_err(|err| ModelError::InvalidSchema(err.to_string()))
    }

    /// Builder preloaded with this schema. Field names are validated at
    /// `build()` time.
    pub fn into_builder(self) -> ModelBuilder {
        let mut builder = ModelBuilder::new().basic_properties(self.basic_properties);
        if let Some(class_name) = self.class_name {
            builder = builder.class_name(class_name);
        }
        if let Some(primary_key) = self.primary_key {
            builder = builder.primary_key(primary_key);
        }
        for (name, entry) in self.fields {
            builder = builder.field(entry.into_descriptor(name));
        }
        builder
    }
}

impl FieldEntry {
    fn into_descriptor(self, name: String) -> FieldDescriptor {
        match self {
            Self::Default(value) => FieldDescriptor::new(name).default(value),
            Self::Spec(spec) => {
                let mut descriptor = FieldDescriptor::new(name);
                if let Some(default) = spec.default {
                    descriptor = descriptor.default(default);
                }
                if let Some(value) = spec.value {
                    descriptor = descriptor.value(value);
                }
                if let Some(writable) = spec.writable {
                    descriptor = descriptor.writable(writable);
                }
                descriptor.enumerable(spec.enumerable)
            }
        }
    }
}

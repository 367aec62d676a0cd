//! Field descriptors and the flattened per-type field table.
//!
//! # Responsibility
//! - Describe how one named field is read and written.
//! - Resolve every declaration once, at definition time, into a table shared
//!   by all instances of a model type.
//!
//! # Invariants
//! - Field names are identifiers; they are embedded in `change:<field>`
//!   event names.
//! - Reserved accessor names are rejected, except `id` when it is the
//!   primary key.
//! - A non-configurable declaration can never be replaced.

use crate::model::error::ModelError;
use crate::model::instance::Instance;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

static FIELD_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid field name regex"));

/// Accessor names every instance exposes.
pub const RESERVED_NAMES: &[&str] = &[
    "id", "isNew", "isDirty", "toJSON", "fetch", "save", "delete", "is_new", "is_dirty",
    "to_json",
];

/// Computes a field value from the whole instance.
pub type Getter = Rc<dyn Fn(&Instance) -> Option<Value>>;
/// Takes full control of a write: `(instance, value, silent)`.
pub type Setter = Rc<dyn Fn(&Instance, Value, bool)>;
/// Maps an incoming value before it is stored.
pub type Coercion = Rc<dyn Fn(Value) -> Value>;

/// Declarative description of one field.
///
/// A descriptor with no getter/setter/coercion behaves as a basic property:
/// reads return the stored value (or the default) and writes go through
/// `Instance::set_value`.
#[derive(Clone)]
pub struct FieldDescriptor {
    name: String,
    getter: Option<Getter>,
    setter: Option<Setter>,
    coerce: Option<Coercion>,
    value: Option<Value>,
    default: Option<Value>,
    enumerable: bool,
    writable: bool,
    configurable: bool,
}

impl FieldDescriptor {
    /// Creates a writable, enumerable, non-configurable descriptor.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            getter: None,
            setter: None,
            coerce: None,
            value: None,
            default: None,
            enumerable: true,
            writable: true,
            configurable: false,
        }
    }

    /// Plain get/set passthrough field; later declarations may replace it.
    pub fn basic(name: impl Into<String>) -> Self {
        Self::new(name).configurable(true)
    }

    /// Virtual field computed from other fields; it has no backing entry.
    pub fn computed(
        name: impl Into<String>,
        getter: impl Fn(&Instance) -> Option<Value> + 'static,
    ) -> Self {
        Self::new(name).getter(getter).writable(false)
    }

    pub fn getter(mut self, getter: impl Fn(&Instance) -> Option<Value> + 'static) -> Self {
        self.getter = Some(Rc::new(getter));
        self
    }

    /// Custom setter. It replaces the default write path entirely, so it must
    /// store through `Instance::set_value` itself when storage is wanted.
    pub fn setter(mut self, setter: impl Fn(&Instance, Value, bool) + 'static) -> Self {
        self.setter = Some(Rc::new(setter));
        self
    }

    /// Value mapping applied before the default write path stores the value.
    pub fn coerce(mut self, coerce: impl Fn(Value) -> Value + 'static) -> Self {
        self.coerce = Some(Rc::new(coerce));
        self
    }

    /// Constant value; makes the field read-only unless `writable(true)`
    /// follows.
    pub fn value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self.writable = false;
        self
    }

    /// Default seeded into every new instance and returned while unset.
    pub fn default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn enumerable(mut self, enumerable: bool) -> Self {
        self.enumerable = enumerable;
        self
    }

    pub fn writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    pub fn configurable(mut self, configurable: bool) -> Self {
        self.configurable = configurable;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn is_enumerable(&self) -> bool {
        self.enumerable
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn is_configurable(&self) -> bool {
        self.configurable
    }

    pub fn is_computed(&self) -> bool {
        self.getter.is_some()
    }

    pub fn has_setter(&self) -> bool {
        self.setter.is_some()
    }

    pub(crate) fn read(&self, instance: &Instance) -> Option<Value> {
        if let Some(getter) = &self.getter {
            return getter(instance);
        }
        instance
            .get(&self.name)
            .or_else(|| self.value.clone())
            .or_else(|| self.default.clone())
    }

    /// Applies one write. Returns `false` when the field ignored it.
    pub(crate) fn write(&self, instance: &Instance, value: Value, silent: bool) -> bool {
        if let Some(setter) = &self.setter {
            setter(instance, value, silent);
            return true;
        }
        if !self.writable {
            return false;
        }
        let value = match &self.coerce {
            Some(coerce) => coerce(value),
            None => value,
        };
        instance.set_value(&self.name, value, silent);
        true
    }

    /// Value seeded at construction, if any.
    pub(crate) fn initial_value(&self) -> Option<&Value> {
        if self.getter.is_some() {
            return None;
        }
        self.default.as_ref()
    }
}

impl Debug for FieldDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("computed", &self.getter.is_some())
            .field("setter", &self.setter.is_some())
            .field("coerce", &self.coerce.is_some())
            .field("value", &self.value)
            .field("default", &self.default)
            .field("enumerable", &self.enumerable)
            .field("writable", &self.writable)
            .field("configurable", &self.configurable)
            .finish()
    }
}

/// Flattened name -> descriptor table, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct FieldTable {
    order: Vec<String>,
    descriptors: HashMap<String, FieldDescriptor>,
}

impl FieldTable {
    /// Resolves all declarations for one model type.
    ///
    /// The primary key is declared as a basic property when no explicit
    /// descriptor names it.
    ///
    /// # Errors
    /// - `InvalidPrimaryKey` when the primary key is not an identifier.
    /// - `ReservedFieldName`, `InvalidFieldName`, `DuplicateField` for field
    ///   declarations.
    pub fn build(
        primary_key: Option<&str>,
        basic_properties: &[String],
        fields: Vec<FieldDescriptor>,
    ) -> Result<Self, ModelError> {
        if let Some(primary_key) = primary_key {
            validate_primary_key(primary_key)?;
        }

        let mut table = Self::default();
        for name in basic_properties {
            table.declare(FieldDescriptor::basic(name.as_str()), primary_key)?;
        }
        for descriptor in fields {
            table.declare(descriptor, primary_key)?;
        }
        if let Some(primary_key) = primary_key {
            if !table.contains(primary_key) {
                table.declare(FieldDescriptor::basic(primary_key), Some(primary_key))?;
            }
        }

        Ok(table)
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.descriptors.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// All field names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Enumerable field names in declaration order.
    pub fn enumerable_names(&self) -> Vec<&str> {
        self.iter()
            .filter(|descriptor| descriptor.is_enumerable())
            .map(FieldDescriptor::name)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.descriptors.get(name))
    }

    fn declare(
        &mut self,
        descriptor: FieldDescriptor,
        primary_key: Option<&str>,
    ) -> Result<(), ModelError> {
        let name = descriptor.name().to_string();
        validate_field_name(&name, primary_key)?;

        match self.descriptors.get(&name) {
            Some(existing) if !existing.is_configurable() => {
                return Err(ModelError::DuplicateField(name));
            }
            Some(_) => {}
            None => self.order.push(name.clone()),
        }
        self.descriptors.insert(name, descriptor);
        Ok(())
    }
}

fn validate_field_name(name: &str, primary_key: Option<&str>) -> Result<(), ModelError> {
    if !FIELD_NAME_RE.is_match(name) {
        return Err(ModelError::InvalidFieldName(name.to_string()));
    }
    if RESERVED_NAMES.contains(&name) && !(name == "id" && primary_key == Some("id")) {
        return Err(ModelError::ReservedFieldName(name.to_string()));
    }
    Ok(())
}

pub(crate) fn validate_primary_key(name: &str) -> Result<(), ModelError> {
    if !FIELD_NAME_RE.is_match(name) {
        return Err(ModelError::InvalidPrimaryKey(name.to_string()));
    }
    if RESERVED_NAMES.contains(&name) && name != "id" {
        return Err(ModelError::ReservedFieldName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{FieldDescriptor, FieldTable};
    use crate::model::error::ModelError;
    use serde_json::json;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn basic_properties_and_descriptors_keep_declaration_order() {
        let table = FieldTable::build(
            Some("id"),
            &names(&["username", "email"]),
            vec![FieldDescriptor::new("age").default(json!(1))],
        )
        .expect("field table should build");

        let order: Vec<&str> = table.names().collect();
        assert_eq!(order, vec!["username", "email", "age", "id"]);
        assert_eq!(
            table.get("age").expect("field should be declared").default_value(),
            Some(&json!(1))
        );
    }

    #[test]
    fn reserved_names_are_rejected_at_build_time() {
        let err = FieldTable::build(None, &names(&["save"]), Vec::new())
            .expect_err("invalid field table must be rejected");
        assert_eq!(err, ModelError::ReservedFieldName("save".to_string()));

        let err = FieldTable::build(Some("uuid"), &names(&["id"]), Vec::new())
            .expect_err("invalid field table must be rejected");
        assert_eq!(err, ModelError::ReservedFieldName("id".to_string()));
    }

    #[test]
    fn id_is_allowed_when_it_is_the_primary_key() {
        let table = FieldTable::build(Some("id"), &names(&["id"]), Vec::new())
            .expect("field table should build");
        assert!(table.contains("id"));
    }

    #[test]
    fn invalid_names_are_rejected() {
        let err = FieldTable::build(None, &names(&["change:x"]), Vec::new())
            .expect_err("invalid field table must be rejected");
        assert_eq!(err, ModelError::InvalidFieldName("change:x".to_string()));

        let err = FieldTable::build(Some("bad key"), &[], Vec::new())
            .expect_err("invalid field table must be rejected");
        assert_eq!(err, ModelError::InvalidPrimaryKey("bad key".to_string()));
    }

    #[test]
    fn configurable_declarations_are_replaced_but_fixed_ones_are_not() {
        let table = FieldTable::build(
            None,
            &names(&["age"]),
            vec![FieldDescriptor::new("age").default(json!(30))],
        )
        .expect("field table should build");
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.get("age").expect("field should be declared").default_value(),
            Some(&json!(30))
        );

        let err = FieldTable::build(
            None,
            &[],
            vec![FieldDescriptor::new("age"), FieldDescriptor::new("age")],
        )
        .expect_err("invalid field table must be rejected");
        assert_eq!(err, ModelError::DuplicateField("age".to_string()));
    }

    #[test]
    fn hidden_fields_are_not_enumerable() {
        let table = FieldTable::build(
            None,
            &names(&["first"]),
            vec![FieldDescriptor::new("secret").enumerable(false)],
        )
        .expect("field table should build");
        assert_eq!(table.enumerable_names(), vec!["first"]);
        assert_eq!(table.len(), 2);
    }
}

//! Storage adapter protocol and bundled adapters.
//!
//! # Responsibility
//! - Define the callback-style `DataStore` contract used by model types.
//! - Provide the shared key assignment and record wrapping rules.
//!
//! # Invariants
//! - Every callback is invoked at most once, with an error or a result.
//! - Adapters store `Instance::to_json()` snapshots, never live handles.
//! - Generated keys reach the instance only after the adapter's write
//!   succeeded.
//! - Lookup keys are normalized strings (`normalize_key`), so `1` and `"1"`
//!   address the same record.

use crate::db::DbError;
use crate::model::definition::Model;
use crate::model::error::ModelError;
use crate::model::instance::Instance;
use log::debug;
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod memory;
pub mod sqlite;

pub type StoreResult<T> = Result<T, StoreError>;
/// One-shot completion callback handed to every adapter operation.
pub type Callback<T> = Box<dyn FnOnce(StoreResult<T>)>;
/// Filter used by `find_where`: `(instance, args) -> keep`.
pub type Predicate = Box<dyn Fn(&Instance, &Value) -> bool>;
/// Free-form adapter options for bulk `fetch`.
pub type FetchOptions = Map<String, Value>;

#[derive(Debug)]
pub enum StoreError {
    /// No record at the given key.
    NotFound(String),
    Db(DbError),
    /// A stored record could not be interpreted.
    InvalidData(String),
    Serialization(serde_json::Error),
    /// The model is not usable with this adapter.
    Configuration(ModelError),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(key) => write!(f, "document not found: {key}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid stored record: {message}"),
            Self::Serialization(err) => write!(f, "record serialization failed: {err}"),
            Self::Configuration(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::Configuration(err) => Some(err),
            Self::NotFound(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::from(value))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

impl From<ModelError> for StoreError {
    fn from(value: ModelError) -> Self {
        Self::Configuration(value)
    }
}

/// Record accepted by `save`: an instance or raw field data.
#[derive(Debug, Clone)]
pub enum RecordInput {
    Instance(Instance),
    Data(Map<String, Value>),
}

impl From<Instance> for RecordInput {
    fn from(value: Instance) -> Self {
        Self::Instance(value)
    }
}

impl From<&Instance> for RecordInput {
    fn from(value: &Instance) -> Self {
        Self::Instance(value.clone())
    }
}

impl From<Map<String, Value>> for RecordInput {
    fn from(value: Map<String, Value>) -> Self {
        Self::Data(value)
    }
}

/// Target accepted by `delete`: an instance or a bare key.
#[derive(Debug, Clone)]
pub enum RecordRef {
    Instance(Instance),
    Key(Value),
}

impl RecordRef {
    /// Normalized lookup key, if the target can address a record at all.
    pub fn lookup_key(&self) -> Option<String> {
        match self {
            Self::Instance(instance) => Some(instance.record_key()),
            Self::Key(key) => normalize_key(key),
        }
    }
}

impl From<Instance> for RecordRef {
    fn from(value: Instance) -> Self {
        Self::Instance(value)
    }
}

impl From<Value> for RecordRef {
    fn from(value: Value) -> Self {
        Self::Key(value)
    }
}

impl From<&str> for RecordRef {
    fn from(value: &str) -> Self {
        Self::Key(Value::String(value.to_string()))
    }
}

/// Input of `use_records`: a list of records or a key -> record map.
#[derive(Debug, Clone)]
pub enum Seed {
    List(Vec<RecordInput>),
    Keyed(Vec<(String, RecordInput)>),
}

impl Seed {
    /// Interprets a JSON array or object of records.
    pub fn from_json(value: Value) -> StoreResult<Self> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(record_from_json)
                .collect::<StoreResult<Vec<_>>>()
                .map(Self::List),
            Value::Object(entries) => entries
                .into_iter()
                .map(|(key, item)| record_from_json(item).map(|record| (key, record)))
                .collect::<StoreResult<Vec<_>>>()
                .map(Self::Keyed),
            other => Err(StoreError::InvalidData(format!(
                "seed must be an array or an object, got {other}"
            ))),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::List(items) => items.len(),
            Self::Keyed(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<RecordInput>> for Seed {
    fn from(value: Vec<RecordInput>) -> Self {
        Self::List(value)
    }
}

impl From<Vec<Map<String, Value>>> for Seed {
    fn from(value: Vec<Map<String, Value>>) -> Self {
        Self::List(value.into_iter().map(RecordInput::Data).collect())
    }
}

fn record_from_json(value: Value) -> StoreResult<RecordInput> {
    match value {
        Value::Object(data) => Ok(RecordInput::Data(data)),
        other => Err(StoreError::InvalidData(format!(
            "seed record must be an object, got {other}"
        ))),
    }
}

/// Canonical string form of a scalar key. Null, arrays and objects have none.
pub fn normalize_key(key: &Value) -> Option<String> {
    match key {
        Value::String(value) => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        Value::Bool(value) => Some(value.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Key and snapshot an adapter is about to write for one instance.
///
/// A new record of a model with a primary key gets a fresh UUID, merged into
/// `snapshot` only. The instance is untouched until `commit`, so a failed
/// write leaves it new and silent.
#[derive(Debug, Clone)]
pub struct PendingRecord {
    pub key: String,
    pub snapshot: Map<String, Value>,
    generated_field: Option<String>,
}

impl PendingRecord {
    pub fn prepare(instance: &Instance) -> Self {
        let mut snapshot = instance.to_json();
        let primary_key = instance.model().primary_key().filter(|_| instance.is_new());
        match primary_key {
            Some(primary_key) => {
                let key = Uuid::new_v4().to_string();
                debug!("event=store_assign_key module=store key={key}");
                snapshot.insert(primary_key.clone(), Value::String(key.clone()));
                Self {
                    key,
                    snapshot,
                    generated_field: Some(primary_key),
                }
            }
            None => Self {
                key: instance.record_key(),
                snapshot,
                generated_field: None,
            },
        }
    }

    /// Writes a generated key back to `instance` once the record is stored.
    ///
    /// The write is non-silent, so `change:<primary key>` fires.
    pub fn commit(self, instance: &Instance) -> String {
        if let Some(field) = self.generated_field {
            instance.set_value(&field, Value::String(self.key.clone()), false);
        }
        self.key
    }
}

/// Builds the instance stored for one `use_records` entry.
///
/// For keyed seeds the map key becomes the primary-key value unless the
/// record carries its own.
pub fn seed_instance(model: &Model, key: Option<&str>, record: RecordInput) -> Instance {
    let instance = model.wrap_record(record);
    if let (Some(key), Some(primary_key)) = (key, model.primary_key()) {
        if instance.is_new() {
            instance.set_value(&primary_key, Value::String(key.to_string()), true);
        }
    }
    instance
}

/// Callback-style storage backend bound to model types.
///
/// Adapters may call back synchronously or later; the model layer only
/// relies on each callback firing at most once.
pub trait DataStore {
    /// Record at `id`, or `StoreError::NotFound`.
    fn find(&self, model: &Model, id: Value, cb: Callback<Instance>);

    /// Records for which `predicate(record, &args)` holds, in store order.
    fn find_where(&self, model: &Model, args: Value, predicate: Predicate, cb: Callback<Vec<Instance>>);

    fn all(&self, model: &Model, cb: Callback<Vec<Instance>>);

    /// Refreshes one instance from the backend.
    fn fetch_one(&self, instance: &Instance, cb: Callback<()>);

    /// Bulk refresh from an upstream source.
    fn fetch(&self, model: &Model, options: FetchOptions, cb: Callback<()>);

    /// Stores every seed entry and emits `add` on the model per entry.
    fn use_records(&self, model: &Model, seed: Seed, cb: Callback<Vec<Instance>>);

    /// Stores `record`, assigning a key when it is new.
    fn save(&self, model: &Model, record: RecordInput, cb: Callback<Instance>);

    /// Removes the record addressed by `target`, or `StoreError::NotFound`.
    fn delete(&self, model: &Model, target: RecordRef, cb: Callback<()>);
}

//! In-process reference adapter.
//!
//! # Invariants
//! - Records are kept in first-insertion order; overwriting a key keeps its
//!   position.
//! - Every read hydrates fresh instances, so callers never share state with
//!   the stored snapshot.

use crate::events::{self, Payload};
use crate::model::definition::Model;
use crate::model::instance::Instance;
use crate::store::{
    normalize_key, seed_instance, Callback, DataStore, FetchOptions, PendingRecord, Predicate,
    RecordInput, RecordRef, Seed, StoreError,
};
use log::debug;
use serde_json::{Map, Value};
use std::cell::RefCell;

type Snapshot = Map<String, Value>;

/// Adapter holding snapshots in memory for the lifetime of the store.
///
/// One store backs one collection; bind a separate store per model type.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RefCell<Vec<(String, Snapshot)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    /// Stored keys in iteration order.
    pub fn keys(&self) -> Vec<String> {
        self.records
            .borrow()
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Raw stored snapshot at `key`.
    pub fn snapshot(&self, key: &str) -> Option<Snapshot> {
        self.records
            .borrow()
            .iter()
            .find(|(stored, _)| stored == key)
            .map(|(_, snapshot)| snapshot.clone())
    }

    fn upsert(&self, key: String, snapshot: Snapshot) {
        let mut records = self.records.borrow_mut();
        match records.iter_mut().find(|(stored, _)| *stored == key) {
            Some((_, existing)) => *existing = snapshot,
            None => records.push((key, snapshot)),
        }
    }

    fn remove(&self, key: &str) -> bool {
        let mut records = self.records.borrow_mut();
        let before = records.len();
        records.retain(|(stored, _)| stored != key);
        records.len() != before
    }

    fn hydrate_all(&self, model: &Model) -> Vec<Instance> {
        let records = self.records.borrow().clone();
        records
            .into_iter()
            .map(|(key, snapshot)| model.hydrate_keyed(&key, snapshot))
            .collect()
    }

    fn store(&self, instance: &Instance) -> String {
        let pending = PendingRecord::prepare(instance);
        self.upsert(pending.key.clone(), pending.snapshot.clone());
        pending.commit(instance)
    }
}

impl DataStore for MemoryStore {
    fn find(&self, model: &Model, id: Value, cb: Callback<Instance>) {
        let Some(key) = normalize_key(&id) else {
            cb(Err(StoreError::NotFound(id.to_string())));
            return;
        };
        match self.snapshot(&key) {
            Some(snapshot) => cb(Ok(model.hydrate_keyed(&key, snapshot))),
            None => {
                debug!("event=store_find module=store adapter=memory status=not_found key={key}");
                cb(Err(StoreError::NotFound(key)));
            }
        }
    }

    fn find_where(
        &self,
        model: &Model,
        args: Value,
        predicate: Predicate,
        cb: Callback<Vec<Instance>>,
    ) {
        let matches = self
            .hydrate_all(model)
            .into_iter()
            .filter(|instance| predicate(instance, &args))
            .collect();
        cb(Ok(matches));
    }

    fn all(&self, model: &Model, cb: Callback<Vec<Instance>>) {
        cb(Ok(self.hydrate_all(model)));
    }

    fn fetch_one(&self, _instance: &Instance, cb: Callback<()>) {
        cb(Ok(()));
    }

    fn fetch(&self, _model: &Model, _options: FetchOptions, cb: Callback<()>) {
        cb(Ok(()));
    }

    fn use_records(&self, model: &Model, seed: Seed, cb: Callback<Vec<Instance>>) {
        let entries: Vec<(Option<String>, RecordInput)> = match seed {
            Seed::List(items) => items.into_iter().map(|record| (None, record)).collect(),
            Seed::Keyed(entries) => entries
                .into_iter()
                .map(|(key, record)| (Some(key), record))
                .collect(),
        };

        let mut loaded = Vec::with_capacity(entries.len());
        for (seed_key, record) in entries {
            let instance = seed_instance(model, seed_key.as_deref(), record);
            self.store(&instance);
            instance.mark_clean();
            model.emit_for(&instance, events::ADD, Payload::Empty);
            loaded.push(instance);
        }
        debug!(
            "event=store_use module=store adapter=memory status=ok count={}",
            loaded.len()
        );
        cb(Ok(loaded));
    }

    fn save(&self, model: &Model, record: RecordInput, cb: Callback<Instance>) {
        let instance = model.wrap_record(record);
        let key = self.store(&instance);
        debug!("event=store_save module=store adapter=memory status=ok key={key}");
        cb(Ok(instance));
    }

    fn delete(&self, _model: &Model, target: RecordRef, cb: Callback<()>) {
        let Some(key) = target.lookup_key() else {
            cb(Err(StoreError::NotFound("<invalid key>".to_string())));
            return;
        };
        if self.remove(&key) {
            debug!("event=store_delete module=store adapter=memory status=ok key={key}");
            cb(Ok(()));
        } else {
            cb(Err(StoreError::NotFound(key)));
        }
    }
}

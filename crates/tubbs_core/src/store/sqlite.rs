//! SQLite-backed durable adapter.
//!
//! # Responsibility
//! - Persist record snapshots as JSON bodies, namespaced by collection name.
//! - Keep SQL details inside the store boundary.
//!
//! # Invariants
//! - The wrapped connection has every migration applied.
//! - `(collection, record_key)` is unique; overwriting a key keeps its `seq`,
//!   so iteration order is first-insertion order.
//! - Corrupt bodies are reported as `InvalidData`, never skipped.

use crate::db::{migrations, open_db, open_db_in_memory, DbError};
use crate::events::{self, Payload};
use crate::model::definition::Model;
use crate::model::instance::Instance;
use crate::store::{
    normalize_key, seed_instance, Callback, DataStore, FetchOptions, PendingRecord, Predicate,
    RecordInput, RecordRef, Seed, StoreError, StoreResult,
};
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::path::Path;

type Snapshot = Map<String, Value>;

/// Adapter over one migrated SQLite connection.
///
/// Several model types may share one store; each needs a class name, which
/// selects its collection.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Wraps an already migrated connection.
    ///
    /// # Errors
    /// - `DbError::UninitializedConnection` when the schema version does not
    ///   match the latest migration.
    pub fn try_new(conn: Connection) -> StoreResult<Self> {
        let actual_version = migrations::current_user_version(&conn)?;
        let expected_version = migrations::latest_version();
        if actual_version != expected_version {
            return Err(DbError::UninitializedConnection {
                expected_version,
                actual_version,
            }
            .into());
        }
        Ok(Self { conn })
    }

    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::try_new(open_db(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::try_new(open_db_in_memory()?)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Number of rows stored for `model`'s collection.
    pub fn count(&self, model: &Model) -> StoreResult<usize> {
        let collection = model.collection_name()?;
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE collection = ?1;",
            params![collection],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn load(&self, collection: &str, key: &str) -> StoreResult<Option<Snapshot>> {
        let body = self
            .conn
            .query_row(
                "SELECT body FROM records WHERE collection = ?1 AND record_key = ?2;",
                params![collection, key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        body.map(|body| parse_body(key, &body)).transpose()
    }

    fn load_all(&self, collection: &str) -> StoreResult<Vec<(String, Snapshot)>> {
        let mut stmt = self.conn.prepare(
            "SELECT record_key, body FROM records WHERE collection = ?1 ORDER BY seq ASC;",
        )?;
        let rows = stmt.query_map(params![collection], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut snapshots = Vec::new();
        for row in rows {
            let (key, body) = row?;
            let snapshot = parse_body(&key, &body)?;
            snapshots.push((key, snapshot));
        }
        Ok(snapshots)
    }

    fn upsert(&self, collection: &str, key: &str, snapshot: &Snapshot) -> StoreResult<()> {
        let body = serde_json::to_string(snapshot)?;
        self.conn.execute(
            "INSERT INTO records (collection, record_key, body)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(collection, record_key) DO UPDATE SET
                body = excluded.body,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![collection, key, body],
        )?;
        Ok(())
    }

    fn remove(&self, collection: &str, key: &str) -> StoreResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM records WHERE collection = ?1 AND record_key = ?2;",
            params![collection, key],
        )?;
        Ok(changed > 0)
    }

    fn find_instance(&self, model: &Model, id: &Value) -> StoreResult<Instance> {
        let collection = model.collection_name()?;
        let key = normalize_key(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        match self.load(&collection, &key)? {
            Some(snapshot) => Ok(model.hydrate_keyed(&key, snapshot)),
            None => Err(StoreError::NotFound(key)),
        }
    }

    fn hydrate_all(&self, model: &Model) -> StoreResult<Vec<Instance>> {
        let collection = model.collection_name()?;
        Ok(self
            .load_all(&collection)?
            .into_iter()
            .map(|(key, snapshot)| model.hydrate_keyed(&key, snapshot))
            .collect())
    }

    fn refresh(&self, instance: &Instance) -> StoreResult<()> {
        let collection = instance.model().collection_name()?;
        let key = instance.record_key();
        match self.load(&collection, &key)? {
            Some(snapshot) => {
                instance.set_data(snapshot);
                Ok(())
            }
            None => Err(StoreError::NotFound(key)),
        }
    }

    fn store_instance(&self, instance: &Instance) -> StoreResult<String> {
        let collection = instance.model().collection_name()?;
        let pending = PendingRecord::prepare(instance);
        self.upsert(&collection, &pending.key, &pending.snapshot)?;
        Ok(pending.commit(instance))
    }

    fn load_seed(&self, model: &Model, seed: Seed) -> StoreResult<Vec<Instance>> {
        let collection = model.collection_name()?;
        let entries: Vec<(Option<String>, RecordInput)> = match seed {
            Seed::List(items) => items.into_iter().map(|record| (None, record)).collect(),
            Seed::Keyed(entries) => entries
                .into_iter()
                .map(|(key, record)| (Some(key), record))
                .collect(),
        };

        let tx = self.conn.unchecked_transaction()?;
        let mut staged = Vec::with_capacity(entries.len());
        for (seed_key, record) in entries {
            let instance = seed_instance(model, seed_key.as_deref(), record);
            let pending = PendingRecord::prepare(&instance);
            self.upsert(&collection, &pending.key, &pending.snapshot)?;
            staged.push((instance, pending));
        }
        tx.commit()?;

        Ok(staged
            .into_iter()
            .map(|(instance, pending)| {
                pending.commit(&instance);
                instance.mark_clean();
                instance
            })
            .collect())
    }
}

fn parse_body(key: &str, body: &str) -> StoreResult<Snapshot> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(snapshot)) => Ok(snapshot),
        Ok(other) => Err(StoreError::InvalidData(format!(
            "record `{key}` body is not an object: {other}"
        ))),
        Err(err) => Err(StoreError::InvalidData(format!(
            "record `{key}` body is not valid JSON: {err}"
        ))),
    }
}

impl DataStore for SqliteStore {
    fn find(&self, model: &Model, id: Value, cb: Callback<Instance>) {
        cb(self.find_instance(model, &id));
    }

    fn find_where(
        &self,
        model: &Model,
        args: Value,
        predicate: Predicate,
        cb: Callback<Vec<Instance>>,
    ) {
        let result = self.hydrate_all(model).map(|instances| {
            instances
                .into_iter()
                .filter(|instance| predicate(instance, &args))
                .collect()
        });
        cb(result);
    }

    fn all(&self, model: &Model, cb: Callback<Vec<Instance>>) {
        cb(self.hydrate_all(model));
    }

    fn fetch_one(&self, instance: &Instance, cb: Callback<()>) {
        cb(self.refresh(instance));
    }

    fn fetch(&self, model: &Model, _options: FetchOptions, cb: Callback<()>) {
        match self.count(model) {
            Ok(count) => {
                debug!("event=store_fetch module=store adapter=sqlite status=ok rows={count}");
                cb(Ok(()));
            }
            Err(err) => cb(Err(err)),
        }
    }

    fn use_records(&self, model: &Model, seed: Seed, cb: Callback<Vec<Instance>>) {
        match self.load_seed(model, seed) {
            Ok(loaded) => {
                debug!(
                    "event=store_use module=store adapter=sqlite status=ok count={}",
                    loaded.len()
                );
                for instance in &loaded {
                    model.emit_for(instance, events::ADD, Payload::Empty);
                }
                cb(Ok(loaded));
            }
            Err(err) => {
                warn!("event=store_use module=store adapter=sqlite status=error error={err}");
                cb(Err(err));
            }
        }
    }

    fn save(&self, model: &Model, record: RecordInput, cb: Callback<Instance>) {
        let instance = model.wrap_record(record);
        match self.store_instance(&instance) {
            Ok(key) => {
                debug!("event=store_save module=store adapter=sqlite status=ok key={key}");
                cb(Ok(instance));
            }
            Err(err) => {
                warn!("event=store_save module=store adapter=sqlite status=error error={err}");
                cb(Err(err));
            }
        }
    }

    fn delete(&self, model: &Model, target: RecordRef, cb: Callback<()>) {
        let result = model
            .collection_name()
            .map_err(StoreError::from)
            .and_then(|collection| {
                let key = target
                    .lookup_key()
                    .ok_or_else(|| StoreError::NotFound("<invalid key>".to_string()))?;
                if self.remove(&collection, &key)? {
                    debug!("event=store_delete module=store adapter=sqlite status=ok key={key}");
                    Ok(())
                } else {
                    Err(StoreError::NotFound(key))
                }
            });
        cb(result);
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.conn.path())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_body, SqliteStore};
    use crate::db::{open_db_in_memory, DbError};
    use crate::store::StoreError;
    use rusqlite::Connection;

    #[test]
    fn try_new_rejects_unmigrated_connection() {
        let conn = Connection::open_in_memory().expect("raw connection should open");
        let err = SqliteStore::try_new(conn).expect_err("unmigrated connection must be rejected");
        assert!(matches!(
            err,
            StoreError::Db(DbError::UninitializedConnection {
                actual_version: 0,
                ..
            })
        ));
    }

    #[test]
    fn try_new_accepts_migrated_connection() {
        let conn = open_db_in_memory().expect("in-memory db should open");
        assert!(SqliteStore::try_new(conn).is_ok());
    }

    #[test]
    fn parse_body_rejects_non_objects() {
        assert!(matches!(
            parse_body("k", "[1, 2]"),
            Err(StoreError::InvalidData(_))
        ));
        assert!(matches!(
            parse_body("k", "{broken"),
            Err(StoreError::InvalidData(_))
        ));
        assert_eq!(parse_body("k", r#"{"a":1}"#).expect("object body should parse")["a"], 1);
    }
}

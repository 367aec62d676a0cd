//! Model instances: field state, change detection and instance CRUD.
//!
//! # Responsibility
//! - Own one record's data map, dirty flag and identity token.
//! - Detect real value changes and emit `change` / `change:<field>`.
//! - Forward instance CRUD to the model's store and emit lifecycle events.
//!
//! # Invariants
//! - No `RefCell` borrow is held while listeners, setters or store callbacks
//!   run.
//! - Every emission reaches the owning model type (see `Instance::emit`).
//! - The identity token is generated on first access and never changes.
//!   Records of a model without a primary key are read back under the key
//!   they were stored with.

use crate::events::{
    self, Emitter, FieldChange, ListenerId, Notification, NotificationChannel, Payload,
};
use crate::model::definition::Model;
use crate::model::error::ModelError;
use crate::store::{normalize_key, RecordInput, RecordRef, StoreResult};
use log::{debug, trace, warn};
use once_cell::unsync::OnceCell;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

#[derive(Default)]
struct InstanceState {
    data: Map<String, Value>,
    dirty: bool,
}

struct InstanceInner {
    model: Model,
    state: RefCell<InstanceState>,
    cid: OnceCell<String>,
    events: Emitter<Notification>,
}

/// Handle to one model record.
///
/// Cloning the handle does not copy the record; equality is identity.
#[derive(Clone)]
pub struct Instance {
    inner: Rc<InstanceInner>,
}

impl Instance {
    /// Creates an empty instance without defaults or events; see
    /// `Model::create` and `Model::hydrate`.
    pub(crate) fn empty(model: Model) -> Self {
        Self::from_parts(model, OnceCell::new())
    }

    /// Creates an empty instance whose identity token is already `token`.
    pub(crate) fn with_identity(model: Model, token: String) -> Self {
        Self::from_parts(model, OnceCell::with_value(token))
    }

    fn from_parts(model: Model, cid: OnceCell<String>) -> Self {
        Self {
            inner: Rc::new(InstanceInner {
                model,
                state: RefCell::new(InstanceState::default()),
                cid,
                events: Emitter::new(),
            }),
        }
    }

    pub fn model(&self) -> &Model {
        &self.inner.model
    }

    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Process-unique identity token, generated on first access.
    pub fn cid(&self) -> &str {
        self.inner
            .cid
            .get_or_init(|| self.inner.model.next_identity_token())
    }

    /// Raw stored value. No defaults, getters or side effects.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner.state.borrow().data.get(name).cloned()
    }

    /// Property read: computed getter, stored value, then declared default.
    pub fn read(&self, name: &str) -> Option<Value> {
        match self.model().field(name) {
            Some(descriptor) => descriptor.read(self),
            None => self.get(name),
        }
    }

    /// Generic write entry point.
    ///
    /// Resolves `name` in the model's field table: custom setters and
    /// coercions run, read-only fields ignore the write, and everything else
    /// falls back to `set_value`.
    pub fn set(&self, name: &str, value: Value, silent: bool) -> &Self {
        match self.model().field(name) {
            Some(descriptor) => {
                if !descriptor.write(self, value, silent) {
                    debug!("event=field_write module=instance status=ignored field={name}");
                }
            }
            None => {
                self.set_value(name, value, silent);
            }
        }
        self
    }

    /// Stores `value` and, unless `silent`, marks dirty and emits when it
    /// differs from the previous value.
    pub fn set_value(&self, name: &str, value: Value, silent: bool) -> &Self {
        self.write_entry(name, Some(value), silent)
    }

    /// Removes the stored value with the same change rules as `set_value`.
    pub fn unset(&self, name: &str, silent: bool) -> &Self {
        self.write_entry(name, None, silent)
    }

    /// Replaces the whole data map and clears the dirty flag. Emits nothing.
    pub fn set_data(&self, data: Map<String, Value>) -> &Self {
        let mut state = self.inner.state.borrow_mut();
        state.data = data;
        state.dirty = false;
        self
    }

    /// Serialized form: every stored field whose value is not null.
    pub fn to_json(&self) -> Map<String, Value> {
        self.inner
            .state
            .borrow()
            .data
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.state.borrow().dirty
    }

    pub fn is_new(&self) -> bool {
        self.persisted_key().is_none()
    }

    /// Persisted primary-key value, or the identity token while new.
    pub fn id(&self) -> Value {
        self.persisted_key()
            .unwrap_or_else(|| Value::String(self.cid().to_string()))
    }

    /// Writes the primary-key field (non-silently).
    pub fn set_id(&self, value: Value) -> Result<&Self, ModelError> {
        let primary_key = self
            .model()
            .primary_key()
            .ok_or(ModelError::MissingPrimaryKey)?;
        Ok(self.set_value(&primary_key, value, false))
    }

    /// Normalized lookup key used by stores.
    pub fn record_key(&self) -> String {
        normalize_key(&self.id()).unwrap_or_else(|| self.cid().to_string())
    }

    /// Subscribes to one event on this instance only.
    pub fn on(
        &self,
        event: impl Into<String>,
        listener: impl Fn(&Notification) + 'static,
    ) -> ListenerId {
        self.inner.events.on(event, listener)
    }

    pub fn once(
        &self,
        event: impl Into<String>,
        listener: impl Fn(&Notification) + 'static,
    ) -> ListenerId {
        self.inner.events.once(event, listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.events.off(id)
    }

    /// Instance notification channel.
    pub fn events(&self) -> &Emitter<Notification> {
        &self.inner.events
    }

    /// Publishes on this instance, then on the owning model type with this
    /// instance attached.
    ///
    /// Returns the number of instance-level listeners invoked.
    pub fn emit(&self, event: &str, payload: Payload) -> usize {
        let notification = Notification::new(event, payload);
        let invoked = self.inner.events.publish(event, &notification);
        self.model().notify_type(self, notification);
        invoked
    }

    /// Refreshes this instance from the store.
    ///
    /// On success the dirty flag is cleared, `cb` runs, then `fetch` is
    /// emitted.
    pub fn fetch(&self, cb: impl FnOnce(StoreResult<Instance>) + 'static) {
        let store = self.model().data_store();
        let instance = self.clone();
        store.fetch_one(
            self,
            Box::new(move |result| match result {
                Ok(_) => {
                    instance.mark_clean();
                    cb(Ok(instance.clone()));
                    instance.emit(events::FETCH, Payload::Empty);
                }
                Err(err) => {
                    warn!(
                        "event=instance_fetch module=instance status=error key={} error={}",
                        instance.record_key(),
                        err
                    );
                    cb(Err(err));
                }
            }),
        );
    }

    /// Persists this instance, assigning a key when it is new.
    ///
    /// On success the dirty flag is cleared, `cb` runs, then `save` is
    /// emitted.
    pub fn save(&self, cb: impl FnOnce(StoreResult<Instance>) + 'static) {
        let store = self.model().data_store();
        store.save(
            self.model(),
            RecordInput::Instance(self.clone()),
            Box::new(move |result| match result {
                Ok(saved) => {
                    saved.mark_clean();
                    cb(Ok(saved.clone()));
                    saved.emit(events::SAVE, Payload::Empty);
                }
                Err(err) => {
                    warn!("event=instance_save module=instance status=error error={err}");
                    cb(Err(err));
                }
            }),
        );
    }

    /// Removes this instance's record from the store.
    ///
    /// The handle stays usable afterwards; later `find` calls for its id fail.
    pub fn delete(&self, cb: impl FnOnce(StoreResult<Instance>) + 'static) {
        let store = self.model().data_store();
        let instance = self.clone();
        store.delete(
            self.model(),
            RecordRef::Instance(self.clone()),
            Box::new(move |result| match result {
                Ok(()) => {
                    cb(Ok(instance.clone()));
                    instance.emit(events::DELETE, Payload::Empty);
                }
                Err(err) => {
                    warn!(
                        "event=instance_delete module=instance status=error key={} error={}",
                        instance.record_key(),
                        err
                    );
                    cb(Err(err));
                }
            }),
        );
    }

    pub(crate) fn mark_clean(&self) {
        self.inner.state.borrow_mut().dirty = false;
    }

    fn persisted_key(&self) -> Option<Value> {
        let primary_key = self.model().primary_key()?;
        self.get(&primary_key).filter(|value| !value.is_null())
    }

    fn write_entry(&self, name: &str, value: Option<Value>, silent: bool) -> &Self {
        let previous = {
            let mut state = self.inner.state.borrow_mut();
            let previous = match &value {
                Some(value) => state.data.insert(name.to_string(), value.clone()),
                None => state.data.remove(name),
            };
            if previous == value || silent {
                return self;
            }
            state.dirty = true;
            previous
        };

        trace!("event=field_change module=instance field={name}");
        let change = FieldChange {
            field: name.to_string(),
            new_value: value,
            old_value: previous,
        };
        self.emit(events::CHANGE, Payload::Change(change.clone()));
        self.emit(&events::change_event(name), Payload::Change(change));
        self
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Instance {}

impl Serialize for Instance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl Debug for Instance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("Instance");
        debug.field("model", &self.model().raw_class_name());
        debug.field("cid", &self.inner.cid.get());
        match self.inner.state.try_borrow() {
            Ok(state) => debug.field("data", &state.data).field("dirty", &state.dirty),
            Err(_) => debug.field("data", &"<borrowed>"),
        };
        debug.finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::events::{self, Payload};
    use crate::model::definition::Model;
    use crate::model::identity::SequenceIdentity;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn people() -> Model {
        Model::builder()
            .primary_key("id")
            .basic_properties(["first", "last"])
            .identity_generator(Rc::new(SequenceIdentity::new("cid", 100)))
            .build()
            .expect("model should build")
    }

    #[test]
    fn cid_is_lazy_and_memoized() {
        let model = people();
        let first = model.create();
        let second = model.create();

        assert_eq!(second.cid(), "cid100");
        assert_eq!(first.cid(), "cid101");
        assert_eq!(first.cid(), "cid101");
    }

    #[test]
    fn unset_reports_removed_value() {
        let model = people();
        let person = model.create();
        person.set_value("first", json!("Ada"), true);

        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        person.on(events::CHANGE, move |notification| {
            *sink.borrow_mut() = notification.change().cloned();
        });
        person.unset("first", false);

        let change = seen.borrow().clone().expect("change should be recorded");
        assert_eq!(change.old_value, Some(json!("Ada")));
        assert_eq!(change.new_value, None);
        assert!(person.get("first").is_none());
        assert!(person.is_dirty());
    }

    #[test]
    fn set_data_replaces_map_and_clears_dirty() {
        let model = people();
        let person = model.create();
        person.set_value("first", json!("Ada"), false);
        assert!(person.is_dirty());

        person.set_data(
            serde_json::from_value(json!({"last": "Lovelace"}))
                .expect("test data should be a JSON object"),
        );
        assert!(!person.is_dirty());
        assert!(person.get("first").is_none());
        assert_eq!(person.get("last"), Some(json!("Lovelace")));
    }

    #[test]
    fn null_primary_key_counts_as_new_and_is_not_serialized() {
        let model = people();
        let person = model.create();
        person.set_value("id", serde_json::Value::Null, true);

        assert!(person.is_new());
        assert!(!person.to_json().contains_key("id"));
        assert_eq!(person.id(), json!(person.cid()));
    }

    #[test]
    fn custom_events_report_local_listener_count() {
        let model = people();
        let person = model.create();
        person.on("ping", |_| {});

        assert_eq!(person.emit("ping", Payload::Args(vec![json!(1)])), 1);
        assert_eq!(person.emit("pong", Payload::Empty), 0);
    }

    #[test]
    fn instance_serializes_as_its_json_map() {
        let model = people();
        let person = model.create();
        person.set_value("first", json!("Ada"), true);
        person.set_value("last", serde_json::Value::Null, true);

        let value = serde_json::to_value(&person).expect("instance should serialize");
        assert_eq!(value, json!({"first": "Ada"}));
    }
}

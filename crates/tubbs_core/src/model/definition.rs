//! Model types: definition, construction and type-level forwarding.
//!
//! # Responsibility
//! - Validate model options and resolve the shared field table once.
//! - Construct instances of the type and relay their notifications.
//! - Forward type-level CRUD calls to the bound data store.
//!
//! # Invariants
//! - Every instance notification is re-published on the type channel with
//!   the instance attached.
//! - The field table is immutable after `ModelBuilder::build`.

use crate::events::{
    self, Emitter, ListenerId, Notification, NotificationChannel, Payload, TypeNotification,
};
use crate::model::error::ModelError;
use crate::model::field::{validate_primary_key, FieldDescriptor, FieldTable};
use crate::model::identity::{IdentityGenerator, ProcessIdentity};
use crate::model::instance::Instance;
use crate::model::naming;
use crate::store::memory::MemoryStore;
use crate::store::{DataStore, FetchOptions, RecordInput, Seed, StoreResult};
use log::{debug, info};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// Collects model options before the field table is resolved.
#[derive(Default)]
pub struct ModelBuilder {
    class_name: Option<String>,
    primary_key: Option<String>,
    store: Option<Rc<dyn DataStore>>,
    basic_properties: Vec<String>,
    fields: Vec<FieldDescriptor>,
    identity: Option<Rc<dyn IdentityGenerator>>,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw class name, e.g. `user_account`. Drives `collection_name`.
    pub fn class_name(mut self, raw: impl Into<String>) -> Self {
        self.class_name = Some(raw.into());
        self
    }

    pub fn primary_key(mut self, name: impl Into<String>) -> Self {
        self.primary_key = Some(name.into());
        self
    }

    /// Storage adapter; defaults to a fresh `MemoryStore`.
    pub fn data_store(mut self, store: Rc<dyn DataStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn basic_properties<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.basic_properties
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn basic_property(mut self, name: impl Into<String>) -> Self {
        self.basic_properties.push(name.into());
        self
    }

    pub fn field(mut self, descriptor: FieldDescriptor) -> Self {
        self.fields.push(descriptor);
        self
    }

    pub fn identity_generator(mut self, generator: Rc<dyn IdentityGenerator>) -> Self {
        self.identity = Some(generator);
        self
    }

    /// Validates the options and produces the model type.
    ///
    /// # Errors
    /// - `MissingClassName` when an empty class name was given.
    /// - Field table errors from `FieldTable::build`.
    pub fn build(self) -> Result<Model, ModelError> {
        let class_name = match self.class_name {
            Some(raw) if raw.trim().is_empty() => return Err(ModelError::MissingClassName),
            other => other,
        };
        let fields = FieldTable::build(
            self.primary_key.as_deref(),
            &self.basic_properties,
            self.fields,
        )?;

        let model = Model {
            inner: Rc::new(ModelInner {
                class_name,
                primary_key: RefCell::new(self.primary_key),
                store: RefCell::new(
                    self.store
                        .unwrap_or_else(|| Rc::new(MemoryStore::new()) as Rc<dyn DataStore>),
                ),
                fields,
                identity: self
                    .identity
                    .unwrap_or_else(|| Rc::new(ProcessIdentity) as Rc<dyn IdentityGenerator>),
                events: Emitter::new(),
            }),
        };

        info!(
            "event=model_define module=model status=ok class={} primary_key={} fields={}",
            model.raw_class_name().unwrap_or("-"),
            model.primary_key().as_deref().unwrap_or("-"),
            model.fields().len()
        );
        Ok(model)
    }
}

struct ModelInner {
    class_name: Option<String>,
    primary_key: RefCell<Option<String>>,
    store: RefCell<Rc<dyn DataStore>>,
    fields: FieldTable,
    identity: Rc<dyn IdentityGenerator>,
    events: Emitter<TypeNotification>,
}

/// Handle to one model type. Clones share the same type.
#[derive(Clone)]
pub struct Model {
    inner: Rc<ModelInner>,
}

impl Model {
    pub fn builder() -> ModelBuilder {
        ModelBuilder::new()
    }

    pub fn ptr_eq(&self, other: &Model) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn raw_class_name(&self) -> Option<&str> {
        self.inner.class_name.as_deref()
    }

    /// Camelized class name, e.g. `UserAccount`.
    pub fn class_name(&self) -> Result<String, ModelError> {
        self.raw_class_name()
            .map(naming::camelize)
            .ok_or(ModelError::MissingClassName)
    }

    /// Pluralized class name, e.g. `UserAccounts`.
    pub fn collection_name(&self) -> Result<String, ModelError> {
        self.raw_class_name()
            .map(naming::collection_name)
            .ok_or(ModelError::MissingClassName)
    }

    pub fn primary_key(&self) -> Option<String> {
        self.inner.primary_key.borrow().clone()
    }

    /// Rebinds the primary-key field for instances read from now on.
    pub fn set_primary_key(&self, name: impl Into<String>) -> Result<(), ModelError> {
        let name = name.into();
        validate_primary_key(&name)?;
        *self.inner.primary_key.borrow_mut() = Some(name);
        Ok(())
    }

    pub fn data_store(&self) -> Rc<dyn DataStore> {
        self.inner.store.borrow().clone()
    }

    pub fn set_data_store(&self, store: Rc<dyn DataStore>) {
        *self.inner.store.borrow_mut() = store;
    }

    pub fn fields(&self) -> &FieldTable {
        &self.inner.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.inner.fields.get(name)
    }

    /// Enumerable field names in declaration order.
    pub fn field_names(&self) -> Vec<&str> {
        self.inner.fields.enumerable_names()
    }

    /// Constructs an empty instance and emits `new`.
    pub fn create(&self) -> Instance {
        self.create_with(Map::new())
    }

    /// Constructs an instance from `data` and emits `new`.
    ///
    /// Defaults are seeded first, then `data` goes through `Instance::set`
    /// silently so coercions and custom setters apply.
    pub fn create_with(&self, data: Map<String, Value>) -> Instance {
        let instance = self.construct(data);
        instance.emit(events::NEW, Payload::Empty);
        instance
    }

    /// Builds an instance from a stored snapshot. Emits nothing.
    pub fn hydrate(&self, data: Map<String, Value>) -> Instance {
        let instance = Instance::empty(self.clone());
        instance.set_data(data);
        instance
    }

    /// Builds an instance from the snapshot stored at `key`. Emits nothing.
    ///
    /// Without a primary key the stored key becomes the identity token, so
    /// the instance keeps addressing the same record.
    pub fn hydrate_keyed(&self, key: &str, data: Map<String, Value>) -> Instance {
        if self.primary_key().is_some() {
            return self.hydrate(data);
        }
        let instance = Instance::with_identity(self.clone(), key.to_string());
        instance.set_data(data);
        instance
    }

    /// Returns `record` as an instance of this model type.
    ///
    /// Instances of this type pass through unchanged; raw data and instances
    /// of other types are copied into a fresh instance without emitting `new`.
    pub fn wrap_record(&self, record: RecordInput) -> Instance {
        match record {
            RecordInput::Instance(instance) if instance.model().ptr_eq(self) => instance,
            RecordInput::Instance(foreign) => self.construct(foreign.to_json()),
            RecordInput::Data(data) => self.construct(data),
        }
    }

    pub(crate) fn next_identity_token(&self) -> String {
        self.inner.identity.next_token()
    }

    /// Re-publishes an instance notification on the type channel.
    pub(crate) fn notify_type(&self, instance: &Instance, notification: Notification) {
        let name = notification.name.clone();
        let type_notification = TypeNotification {
            instance: Some(instance.clone()),
            notification,
        };
        self.inner.events.publish(&name, &type_notification);
    }

    /// Publishes on the type channel only, with `instance` attached.
    pub fn emit_for(&self, instance: &Instance, event: &str, payload: Payload) -> usize {
        let type_notification = TypeNotification {
            instance: Some(instance.clone()),
            notification: Notification::new(event, payload),
        };
        self.inner.events.publish(event, &type_notification)
    }

    /// Publishes a type-level notification not tied to an instance.
    pub fn emit(&self, event: &str, payload: Payload) -> usize {
        let type_notification = TypeNotification {
            instance: None,
            notification: Notification::new(event, payload),
        };
        self.inner.events.publish(event, &type_notification)
    }

    pub fn on(
        &self,
        event: impl Into<String>,
        listener: impl Fn(&TypeNotification) + 'static,
    ) -> ListenerId {
        self.inner.events.on(event, listener)
    }

    pub fn once(
        &self,
        event: impl Into<String>,
        listener: impl Fn(&TypeNotification) + 'static,
    ) -> ListenerId {
        self.inner.events.once(event, listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.events.off(id)
    }

    /// Type notification channel.
    pub fn events(&self) -> &Emitter<TypeNotification> {
        &self.inner.events
    }

    pub fn find(
        &self,
        id: impl Into<Value>,
        cb: impl FnOnce(StoreResult<Instance>) + 'static,
    ) {
        let id = id.into();
        debug!("event=model_find module=model key={id}");
        self.data_store().find(self, id, Box::new(cb));
    }

    /// Instances for which `predicate(instance, args)` holds, in store order.
    pub fn find_where(
        &self,
        args: Value,
        predicate: impl Fn(&Instance, &Value) -> bool + 'static,
        cb: impl FnOnce(StoreResult<Vec<Instance>>) + 'static,
    ) {
        self.data_store()
            .find_where(self, args, Box::new(predicate), Box::new(cb));
    }

    pub fn all(&self, cb: impl FnOnce(StoreResult<Vec<Instance>>) + 'static) {
        self.data_store().all(self, Box::new(cb));
    }

    pub fn fetch(&self, cb: impl FnOnce(StoreResult<()>) + 'static) {
        self.fetch_with(FetchOptions::new(), cb);
    }

    /// Bulk refresh from the store; emits `fetch` on the type after `cb`.
    pub fn fetch_with(&self, options: FetchOptions, cb: impl FnOnce(StoreResult<()>) + 'static) {
        let model = self.clone();
        self.data_store().fetch(
            self,
            options,
            Box::new(move |result| {
                let ok = result.is_ok();
                cb(result);
                if ok {
                    model.emit(events::FETCH, Payload::Empty);
                }
            }),
        );
    }

    /// Bulk-loads `seed` into the store; emits `load` on the type after `cb`.
    pub fn use_records(
        &self,
        seed: impl Into<Seed>,
        cb: impl FnOnce(StoreResult<Vec<Instance>>) + 'static,
    ) {
        let model = self.clone();
        self.data_store().use_records(
            self,
            seed.into(),
            Box::new(move |result| {
                let ok = result.is_ok();
                cb(result);
                if ok {
                    model.emit(events::LOAD, Payload::Empty);
                }
            }),
        );
    }

    /// Wraps `record` in an instance of this type and saves it.
    pub fn save(
        &self,
        record: impl Into<RecordInput>,
        cb: impl FnOnce(StoreResult<Instance>) + 'static,
    ) {
        self.wrap_record(record.into()).save(cb);
    }

    /// Finds the record at `id` and deletes it through the instance path.
    pub fn delete(
        &self,
        id: impl Into<Value>,
        cb: impl FnOnce(StoreResult<Instance>) + 'static,
    ) {
        self.find(id, move |result| match result {
            Ok(instance) => instance.delete(cb),
            Err(err) => cb(Err(err)),
        });
    }

    fn construct(&self, data: Map<String, Value>) -> Instance {
        let instance = Instance::empty(self.clone());
        for descriptor in self.inner.fields.iter() {
            if let Some(value) = descriptor.initial_value() {
                instance.set_value(descriptor.name(), value.clone(), true);
            }
        }
        for (name, value) in data {
            instance.set(&name, value, true);
        }
        instance
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Model {}

impl Debug for Model {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("class_name", &self.inner.class_name)
            .field("primary_key", &self.inner.primary_key.try_borrow().ok())
            .field("fields", &self.inner.fields.len())
            .field("events", &self.inner.events)
            .finish()
    }
}

//! A single in-memory record.
//!
//! # Invariants
//! - An override exists only while it differs from the committed coerced
//!   value, so a record with no overrides has no dirty attributes.
//! - Cached reads return the same `Arc` until the underlying raw value or
//!   override changes.
//! - Once assigned, the primary key never changes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;
use parking_lot::Mutex;
use serde_json::{Map, Value as JsonValue};
use tokio::sync::watch;
use uuid::Uuid;

use crate::LogLevel;
use crate::error::{Result, StoreError};
use crate::model::typedescriptor::{AttributeDefinition, TypeDescriptor};
use crate::model::value::{PrimaryKey, RawData, Value};

/// Progress of populating a record from its source.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LoadState {
    /// Identity shell, nothing requested.
    Empty,
    /// An adapter fetch is in flight.
    Loading,
    /// Raw data is present.
    Loaded,
    /// The last fetch failed; the record stays unloaded.
    Failed(StoreError),
}

/// An attribute whose current value differs from its committed value.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeChange {
    pub name: String,
    /// Committed value, or the default when nothing is committed.
    pub committed: Arc<Value>,
    pub current: Arc<Value>,
}

/// Overrides captured when a save was issued.
pub(crate) type SentChanges = Vec<(String, Arc<Value>)>;

struct RecordState {
    primary_key: Option<PrimaryKey>,
    raw: RawData,
    /// Coerced raw values.
    cache: HashMap<String, Arc<Value>>,
    /// Pending coerced values set by the application.
    overrides: HashMap<String, Arc<Value>>,
}

struct RecordInner {
    client_id: Uuid,
    descriptor: Arc<TypeDescriptor>,
    log_level: LogLevel,
    state: Mutex<RecordState>,
    load_state: watch::Sender<LoadState>,
    saving: AtomicBool,
}

/// Marks a save as in flight until dropped.
pub(crate) struct SaveGuard<'a> {
    record: &'a Record,
}

impl Drop for SaveGuard<'_> {
    fn drop(&mut self) {
        self.record.inner.saving.store(false, Ordering::Release);
    }
}

/// Handle to one logical entity.
///
/// Clones share the same instance; equality is identity.
#[derive(Clone)]
pub struct Record {
    inner: Arc<RecordInner>,
}

impl Record {
    fn create(
        descriptor: Arc<TypeDescriptor>,
        primary_key: Option<PrimaryKey>,
        load_state: LoadState,
        log_level: LogLevel,
    ) -> Self {
        let (sender, _) = watch::channel(load_state);
        Self {
            inner: Arc::new(RecordInner {
                client_id: Uuid::new_v4(),
                descriptor,
                log_level,
                state: Mutex::new(RecordState {
                    primary_key,
                    raw: RawData::new(),
                    cache: HashMap::new(),
                    overrides: HashMap::new(),
                }),
                load_state: sender,
                saving: AtomicBool::new(false),
            }),
        }
    }

    /// An unloaded record standing in for a known identity.
    pub(crate) fn shell(
        descriptor: Arc<TypeDescriptor>,
        primary_key: PrimaryKey,
        log_level: LogLevel,
    ) -> Self {
        Self::create(descriptor, Some(primary_key), LoadState::Empty, log_level)
    }

    /// A record created locally that has never been persisted.
    pub(crate) fn unsaved(descriptor: Arc<TypeDescriptor>, log_level: LogLevel) -> Self {
        Self::create(descriptor, None, LoadState::Loaded, log_level)
    }

    /// Process-unique identifier of this instance.
    pub fn client_id(&self) -> Uuid {
        self.inner.client_id
    }

    /// Descriptor of the record's type.
    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.inner.descriptor
    }

    /// Name of the record's type.
    pub fn type_name(&self) -> &str {
        self.inner.descriptor.name()
    }

    /// True when both handles refer to the same instance.
    pub fn ptr_eq(&self, other: &Record) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The primary key, or the pending key of a record not yet persisted.
    pub fn id(&self) -> Option<PrimaryKey> {
        let state = self.inner.state.lock();
        state.primary_key.clone().or_else(|| {
            state
                .overrides
                .get(self.inner.descriptor.primary_key_name())
                .and_then(|value| PrimaryKey::from_value(value))
        })
    }

    /// True once raw data has been applied.
    pub fn is_loaded(&self) -> bool {
        matches!(*self.inner.load_state.borrow(), LoadState::Loaded)
    }

    /// True while the record has no server-confirmed primary key.
    pub fn is_new(&self) -> bool {
        self.inner.state.lock().primary_key.is_none()
    }

    /// True if the record was never persisted or any attribute differs
    /// from its committed value.
    pub fn is_dirty(&self) -> bool {
        let state = self.inner.state.lock();
        state.primary_key.is_none() || !state.overrides.is_empty()
    }

    /// True if `name` has a pending override.
    pub fn is_attribute_dirty(&self, name: &str) -> bool {
        self.inner.state.lock().overrides.contains_key(name)
    }

    /// Read an attribute's effective value.
    ///
    /// Override first, then the coerced raw value, then the default.
    pub fn get(&self, name: &str) -> Result<Arc<Value>> {
        let descriptor = &self.inner.descriptor;
        let Some(definition) = descriptor.attribute(name) else {
            if name == descriptor.primary_key_name() {
                return Ok(self.primary_key_value());
            }
            return Err(StoreError::UnknownAttribute {
                type_name: descriptor.name().to_string(),
                attribute: name.to_string(),
            });
        };

        let mut state = self.inner.state.lock();
        if let Some(value) = state.overrides.get(name) {
            return Ok(Arc::clone(value));
        }
        match self.committed_value(&mut state, definition)? {
            Some(value) => Ok(value),
            None => Ok(definition.default_value()),
        }
    }

    /// Assign an attribute.
    ///
    /// Assigning a value whose coerced form equals the committed value
    /// clears the override instead of recording one.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let descriptor = &self.inner.descriptor;
        if name == descriptor.primary_key_name() {
            return self.set_primary_key(value);
        }

        let definition = descriptor.require_attribute(name)?;
        let coerced = definition.coerce(descriptor.name(), &value)?;

        let mut state = self.inner.state.lock();
        let differs = match self.committed_value(&mut state, definition) {
            Ok(Some(committed)) => coerced != *committed,
            Ok(None) => coerced != *definition.default_value(),
            // A malformed committed value never equals a valid assignment.
            Err(_) => true,
        };

        if differs {
            state.overrides.insert(name.to_string(), Arc::new(coerced));
        } else {
            state.overrides.remove(name);
        }

        if matches!(self.inner.log_level, LogLevel::Debug) {
            debug!(
                "{} {:?}: set `{}`, dirty={}",
                descriptor.name(),
                state.primary_key,
                name,
                state.overrides.contains_key(name)
            );
        }
        Ok(())
    }

    fn set_primary_key(&self, value: Value) -> Result<()> {
        let descriptor = &self.inner.descriptor;
        let name = descriptor.primary_key_name();
        let value = match descriptor.attribute(name) {
            Some(definition) => definition.coerce(descriptor.name(), &value)?,
            None => value,
        };

        let mut state = self.inner.state.lock();
        if let Some(id) = &state.primary_key {
            if PrimaryKey::from_value(&value).as_ref() == Some(id) {
                return Ok(());
            }
            return Err(StoreError::PrimaryKeyImmutable {
                type_name: descriptor.name().to_string(),
                id: id.clone(),
            });
        }

        if value.is_null() {
            state.overrides.remove(name);
        } else {
            state.overrides.insert(name.to_string(), Arc::new(value));
        }
        Ok(())
    }

    /// Value of an undeclared primary key, memoized like attribute reads.
    fn primary_key_value(&self) -> Arc<Value> {
        let name = self.inner.descriptor.primary_key_name();
        let mut state = self.inner.state.lock();
        if let Some(pending) = state.overrides.get(name) {
            return Arc::clone(pending);
        }
        if let Some(value) = state.cache.get(name) {
            return Arc::clone(value);
        }
        let value = Arc::new(
            state
                .primary_key
                .as_ref()
                .map(PrimaryKey::to_value)
                .unwrap_or(Value::Null),
        );
        state.cache.insert(name.to_string(), Arc::clone(&value));
        value
    }

    /// Coerced raw value of an attribute, memoized until the raw value changes.
    fn committed_value(
        &self,
        state: &mut RecordState,
        definition: &AttributeDefinition,
    ) -> Result<Option<Arc<Value>>> {
        let name = definition.name();
        if let Some(value) = state.cache.get(name) {
            return Ok(Some(Arc::clone(value)));
        }
        let Some(raw) = state.raw.get(name) else {
            return Ok(None);
        };
        let coerced = Arc::new(definition.coerce(self.inner.descriptor.name(), raw)?);
        state.cache.insert(name.to_string(), Arc::clone(&coerced));
        Ok(Some(coerced))
    }

    /// Attributes whose current value differs from the committed value, in
    /// declaration order.
    pub fn changed_attributes(&self) -> Vec<AttributeChange> {
        let mut state = self.inner.state.lock();
        let mut changes = Vec::new();
        for definition in self.inner.descriptor.attributes() {
            let Some(current) = state.overrides.get(definition.name()).cloned() else {
                continue;
            };
            let committed = self
                .committed_value(&mut state, definition)
                .ok()
                .flatten()
                .unwrap_or_else(|| definition.default_value());
            changes.push(AttributeChange {
                name: definition.name().to_string(),
                committed,
                current,
            });
        }
        changes
    }

    /// Discard every pending override.
    pub fn rollback(&self) {
        self.inner.state.lock().overrides.clear();
    }

    /// Fold pending overrides into raw data, as after a successful save.
    pub fn commit(&self) {
        let mut state = self.inner.state.lock();
        let overrides: SentChanges = state.overrides.drain().collect();
        self.fold_into_raw(&mut state, overrides);
    }

    /// Snapshot of the pending overrides, taken when a save is issued.
    pub(crate) fn pending_changes(&self) -> SentChanges {
        self.inner
            .state
            .lock()
            .overrides
            .iter()
            .map(|(name, value)| (name.clone(), Arc::clone(value)))
            .collect()
    }

    /// Commit the overrides a save sent.
    ///
    /// Overrides assigned after the snapshot stay pending.
    pub(crate) fn commit_sent(&self, sent: SentChanges) {
        let mut state = self.inner.state.lock();
        let unchanged: SentChanges = sent
            .into_iter()
            .filter(|(name, value)| state.overrides.get(name) == Some(value))
            .collect();
        for (name, _) in &unchanged {
            state.overrides.remove(name);
        }
        self.fold_into_raw(&mut state, unchanged);
    }

    fn fold_into_raw(&self, state: &mut RecordState, values: SentChanges) {
        let descriptor = &self.inner.descriptor;
        for (name, value) in values {
            let raw = match descriptor.attribute(&name) {
                Some(definition) => definition.attribute_type().serialize(&value),
                None => (*value).clone(),
            };
            state.cache.remove(&name);
            state.raw.insert(name, raw);
        }
    }

    /// Merge server-confirmed raw data. Never marks the record dirty.
    pub(crate) fn apply_load(&self, raw: RawData) {
        let descriptor = &self.inner.descriptor;
        {
            let mut state = self.inner.state.lock();
            for (name, value) in raw {
                state.cache.remove(&name);
                state.raw.insert(name, value);
            }

            // Drop overrides the server now agrees with.
            let pending: Vec<String> = state.overrides.keys().cloned().collect();
            for name in pending {
                let Some(definition) = descriptor.attribute(&name) else {
                    continue;
                };
                let matches_committed = match self.committed_value(&mut state, definition) {
                    Ok(Some(committed)) => state.overrides.get(&name) == Some(&committed),
                    _ => false,
                };
                if matches_committed {
                    state.overrides.remove(&name);
                }
            }
        }
        self.inner.load_state.send_replace(LoadState::Loaded);
    }

    /// Fails if the record already holds a different key.
    pub(crate) fn check_primary_key(&self, primary_key: &PrimaryKey) -> Result<()> {
        match &self.inner.state.lock().primary_key {
            Some(existing) if existing != primary_key => Err(StoreError::PrimaryKeyImmutable {
                type_name: self.type_name().to_string(),
                id: existing.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Assign the server-confirmed key of a new record.
    pub(crate) fn assign_primary_key(&self, primary_key: PrimaryKey) -> Result<()> {
        self.check_primary_key(&primary_key)?;
        let name = self.inner.descriptor.primary_key_name();
        let mut state = self.inner.state.lock();
        state.overrides.remove(name);
        state.cache.remove(name);
        state.raw.insert(name.to_string(), primary_key.to_value());
        state.primary_key = Some(primary_key);
        Ok(())
    }

    /// Mark a save as in flight. Returns `None` while another save of this
    /// record is running.
    pub(crate) fn begin_saving(&self) -> Option<SaveGuard<'_>> {
        self.inner
            .saving
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SaveGuard { record: self })
    }

    /// Mark a fetch as in flight. Returns false when the record is already
    /// loaded or being loaded.
    pub(crate) fn begin_loading(&self) -> bool {
        self.inner.load_state.send_if_modified(|state| match state {
            LoadState::Empty | LoadState::Failed(_) => {
                *state = LoadState::Loading;
                true
            }
            LoadState::Loading | LoadState::Loaded => false,
        })
    }

    /// Record the failure of an in-flight fetch; loaded data is kept.
    pub(crate) fn fail_loading(&self, error: StoreError) {
        self.inner.load_state.send_if_modified(|state| {
            if matches!(state, LoadState::Loading) {
                *state = LoadState::Failed(error);
                true
            } else {
                false
            }
        });
    }

    pub(crate) fn load_state(&self) -> LoadState {
        self.inner.load_state.borrow().clone()
    }

    /// Wait until the record is loaded or its fetch fails.
    ///
    /// Never resolves for a shell whose fetch never completes.
    pub async fn loaded(&self) -> Result<()> {
        let mut receiver = self.inner.load_state.subscribe();
        let state = receiver
            .wait_for(|state| matches!(state, LoadState::Loaded | LoadState::Failed(_)))
            .await
            .map(|state| (*state).clone())
            .unwrap_or(LoadState::Empty);
        match state {
            LoadState::Failed(error) => Err(error),
            _ => Ok(()),
        }
    }

    /// Wire-shaped JSON of every declared attribute plus the primary key.
    pub fn to_json(&self) -> Result<JsonValue> {
        let mut object = Map::new();
        for definition in self.inner.descriptor.attributes() {
            let value = self.get(definition.name())?;
            let wire = definition.attribute_type().serialize(&value);
            object.insert(definition.name().to_string(), wire.to_json());
        }
        if let Some(id) = self.id() {
            object.insert(
                self.inner.descriptor.primary_key_name().to_string(),
                id.to_json(),
            );
        }
        Ok(JsonValue::Object(object))
    }

    /// Wire-shaped JSON of the changed attributes only.
    pub fn changes_json(&self) -> JsonValue {
        let mut object = Map::new();
        for change in self.changed_attributes() {
            let wire = match self.inner.descriptor.attribute(&change.name) {
                Some(definition) => definition.attribute_type().serialize(&change.current),
                None => (*change.current).clone(),
            };
            object.insert(change.name, wire.to_json());
        }
        JsonValue::Object(object)
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Record {}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("type", &self.type_name())
            .field("id", &self.id())
            .field("client_id", &self.inner.client_id)
            .field("load_state", &self.load_state())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attributetype::{AttributeTypeRegistry, DefaultValue};

    fn person() -> Arc<TypeDescriptor> {
        let registry = AttributeTypeRegistry::default();
        TypeDescriptor::builder("person")
            .attribute("name", registry.get("string").unwrap())
            .attribute("age", registry.get("number").unwrap())
            .attribute_with_default(
                "nickname",
                registry.get("string").unwrap(),
                DefaultValue::value("none"),
            )
            .build()
    }

    fn loaded(raw: &[(&str, Value)]) -> Record {
        let record = Record::shell(person(), PrimaryKey::Int(1), LogLevel::Information);
        record.apply_load(
            raw.iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
        );
        record
    }

    #[test]
    fn cached_reads_share_an_instance() {
        let record = loaded(&[("age", Value::from("31"))]);
        let first = record.get("age").unwrap();
        let second = record.get("age").unwrap();
        assert_eq!(*first, Value::Int(31));
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn load_invalidates_cached_value() {
        let record = loaded(&[("name", Value::from("Peter"))]);
        let before = record.get("name").unwrap();

        record.apply_load(RawData::from([("name".to_string(), Value::from("Paul"))]));

        let after = record.get("name").unwrap();
        assert_eq!(*before, Value::from("Peter"));
        assert_eq!(*after, Value::from("Paul"));
        assert!(!record.is_dirty());
    }

    #[test]
    fn load_drops_overrides_the_server_agrees_with() {
        let record = loaded(&[("name", Value::from("Peter"))]);
        record.set("name", "Paul").unwrap();
        assert!(record.is_dirty());

        record.apply_load(RawData::from([("name".to_string(), Value::from("Paul"))]));
        assert!(!record.is_dirty());
    }

    #[test]
    fn commit_moves_overrides_into_raw_data() {
        let record = loaded(&[("age", Value::Int(30))]);
        record.set("age", "31").unwrap();
        assert!(record.is_attribute_dirty("age"));

        record.commit();

        assert!(!record.is_dirty());
        assert_eq!(*record.get("age").unwrap(), Value::Int(31));
        record.set("age", 31).unwrap();
        assert!(!record.is_dirty());
    }

    #[test]
    fn rollback_discards_overrides() {
        let record = loaded(&[("name", Value::from("Peter"))]);
        record.set("name", "Paul").unwrap();
        record.rollback();
        assert!(!record.is_dirty());
        assert_eq!(*record.get("name").unwrap(), Value::from("Peter"));
    }

    #[test]
    fn malformed_raw_value_surfaces_on_read() {
        let record = loaded(&[("age", Value::from("old"))]);
        assert!(matches!(
            record.get("age"),
            Err(StoreError::AttributeCoercion { ref attribute, .. }) if attribute == "age"
        ));
    }

    #[test]
    fn malformed_assignment_is_rejected_and_leaves_state_alone() {
        let record = loaded(&[("age", Value::Int(30))]);
        assert!(record.set("age", "thirty-one").is_err());
        assert!(!record.is_dirty());
        assert_eq!(*record.get("age").unwrap(), Value::Int(30));
    }

    #[test]
    fn primary_key_is_immutable_once_assigned() {
        let record = loaded(&[]);
        assert!(record.set("id", 1).is_ok());
        assert!(matches!(
            record.set("id", 2),
            Err(StoreError::PrimaryKeyImmutable { .. })
        ));
        assert_eq!(record.id(), Some(PrimaryKey::Int(1)));
    }

    #[test]
    fn changed_attributes_report_both_sides() {
        let record = loaded(&[("name", Value::from("Peter"))]);
        record.set("name", "Paul").unwrap();
        record.set("nickname", "P").unwrap();

        let changes = record.changed_attributes();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].name, "name");
        assert_eq!(*changes[0].committed, Value::from("Peter"));
        assert_eq!(*changes[0].current, Value::from("Paul"));
        assert_eq!(*changes[1].committed, Value::from("none"));
        assert_eq!(
            record.changes_json(),
            serde_json::json!({ "name": "Paul", "nickname": "P" })
        );
    }

    #[test]
    fn commit_sent_keeps_later_assignments_pending() {
        let record = loaded(&[("name", Value::from("Peter")), ("age", Value::Int(30))]);
        record.set("age", 31).unwrap();
        record.set("name", "Paul").unwrap();
        let sent = record.pending_changes();

        record.set("name", "Mary").unwrap();
        record.commit_sent(sent);

        assert!(!record.is_attribute_dirty("age"));
        assert_eq!(*record.get("age").unwrap(), Value::Int(31));
        assert!(record.is_attribute_dirty("name"));
        assert_eq!(*record.get("name").unwrap(), Value::from("Mary"));
    }

    #[test]
    fn primary_key_reads_are_stable() {
        let record = loaded(&[]);
        let first = record.get("id").unwrap();
        assert_eq!(*first, Value::Int(1));
        assert!(Arc::ptr_eq(&first, &record.get("id").unwrap()));

        let unsaved = Record::unsaved(person(), LogLevel::Information);
        assert_eq!(*unsaved.get("id").unwrap(), Value::Null);
        unsaved.assign_primary_key(PrimaryKey::Int(4)).unwrap();
        let assigned = unsaved.get("id").unwrap();
        assert_eq!(*assigned, Value::Int(4));
        assert!(Arc::ptr_eq(&assigned, &unsaved.get("id").unwrap()));
    }

    #[test]
    fn only_one_save_runs_at_a_time() {
        let record = loaded(&[]);
        let guard = record.begin_saving();
        assert!(guard.is_some());
        assert!(record.begin_saving().is_none());

        drop(guard);
        assert!(record.begin_saving().is_some());
    }

    #[test]
    fn begin_loading_is_granted_once() {
        let record = Record::shell(person(), PrimaryKey::Int(9), LogLevel::Information);
        assert!(record.begin_loading());
        assert!(!record.begin_loading());

        record.fail_loading(StoreError::NoAdapter);
        assert!(!record.is_loaded());
        assert!(record.begin_loading());
    }
}

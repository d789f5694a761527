//! Store orchestration.
//!
//! # Responsibility
//! - Own one identity map per record type.
//! - Merge server-confirmed data into records without dirtying them.
//! - Route fetches and saves to the adapter.
//!
//! # Invariants
//! - At most one record instance exists per (type name, primary key).
//! - At most one adapter fetch and one save are in flight per record.
//! - A rejected batch leaves every identity map untouched.
//! - Record locks are never held while the identity map lock is taken.
//! - Types are identified by descriptor instance; two descriptors sharing a
//!   name keep separate identity maps.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::LogLevel;
use crate::error::{AdapterError, Result, StoreError};
use crate::model::record::Record;
use crate::model::typedescriptor::TypeDescriptor;
use crate::model::value::{PrimaryKey, RawData, Value};
use crate::store::adapter::Adapter;
use crate::store::identitymap::IdentityMap;
use crate::store::parse::{extract_primary_key, parse_raw_data};

/// Store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Verbosity of store diagnostics.
    #[serde(default)]
    pub log_level: LogLevel,
}

struct StoreInner {
    config: StoreConfig,
    adapter: Option<Arc<dyn Adapter>>,
    maps: Mutex<HashMap<usize, IdentityMap>>,
}

/// Identity-map key of a descriptor. Each map keeps its descriptor alive,
/// so the address is not reused while the map exists.
fn type_key(descriptor: &TypeDescriptor) -> usize {
    std::ptr::from_ref(descriptor).addr()
}

/// Identity-mapped record store.
///
/// Clones share the same identity maps.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl Store {
    /// Create a store without an adapter; unloaded records stay shells.
    pub fn new(config: StoreConfig) -> Self {
        Self::build(config, None)
    }

    pub fn with_adapter(config: StoreConfig, adapter: Arc<dyn Adapter>) -> Self {
        Self::build(config, Some(adapter))
    }

    fn build(config: StoreConfig, adapter: Option<Arc<dyn Adapter>>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                config,
                adapter,
                maps: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Settings the store was created with.
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    fn debug_enabled(&self) -> bool {
        matches!(self.inner.config.log_level, LogLevel::Debug)
    }

    fn adapter(&self) -> Result<Arc<dyn Adapter>> {
        self.inner.adapter.clone().ok_or(StoreError::NoAdapter)
    }

    /// Run `f` on the identity map of `descriptor`'s type while holding the map lock.
    fn with_map<R>(
        &self,
        descriptor: &Arc<TypeDescriptor>,
        f: impl FnOnce(&mut IdentityMap) -> R,
    ) -> R {
        let mut maps = self.inner.maps.lock();
        let map = maps
            .entry(type_key(descriptor))
            .or_insert_with(|| IdentityMap::new(Arc::clone(descriptor), self.inner.config.log_level));
        f(map)
    }

    fn prepare(
        descriptor: &TypeDescriptor,
        index: usize,
        data: &JsonValue,
    ) -> Result<(PrimaryKey, RawData)> {
        let raw = parse_raw_data(data).map_err(StoreError::InvalidPayload)?;
        let id = extract_primary_key(&raw, descriptor.primary_key_name()).ok_or_else(|| {
            StoreError::MissingPrimaryKey {
                type_name: descriptor.name().to_string(),
                primary_key_name: descriptor.primary_key_name().to_string(),
                index,
            }
        })?;
        Ok((id, raw))
    }

    /// Merge one server-confirmed attribute hash and return its record.
    pub fn load(&self, descriptor: &Arc<TypeDescriptor>, data: JsonValue) -> Result<Record> {
        let (id, raw) = Self::prepare(descriptor, 0, &data)?;
        let record = self.with_map(descriptor, |map| {
            let record = map.record_for(id);
            record.apply_load(raw);
            record
        });
        if self.debug_enabled() {
            debug!("loaded {} {:?}", descriptor.name(), record.id());
        }
        Ok(record)
    }

    /// Merge a batch of attribute hashes in order.
    ///
    /// Every element is validated before any record is touched; one bad
    /// element rejects the whole batch.
    pub fn load_many<I>(&self, descriptor: &Arc<TypeDescriptor>, data: I) -> Result<Vec<Record>>
    where
        I: IntoIterator<Item = JsonValue>,
    {
        let prepared = data
            .into_iter()
            .enumerate()
            .map(|(index, item)| Self::prepare(descriptor, index, &item))
            .collect::<Result<Vec<_>>>()
            .inspect_err(|e| warn!("rejected {} batch: {}", descriptor.name(), e))?;

        let records = self.with_map(descriptor, |map| {
            prepared
                .into_iter()
                .map(|(id, raw)| {
                    let record = map.record_for(id);
                    record.apply_load(raw);
                    record
                })
                .collect::<Vec<_>>()
        });
        if self.debug_enabled() {
            debug!("loaded {} {} record(s)", records.len(), descriptor.name());
        }
        Ok(records)
    }

    /// Return the record for `id`, scheduling an adapter fetch if it is not
    /// loaded yet.
    ///
    /// The returned record is populated in place when the fetch completes.
    /// Duplicate calls while a fetch is in flight do not issue another.
    pub fn find(&self, descriptor: &Arc<TypeDescriptor>, id: impl Into<PrimaryKey>) -> Record {
        let id = id.into();
        let record = self.with_map(descriptor, |map| map.record_for(id.clone()));
        if record.is_loaded() {
            return record;
        }

        let Some(adapter) = self.inner.adapter.clone() else {
            if self.debug_enabled() {
                debug!("{} {} not loaded and no adapter configured", descriptor.name(), id);
            }
            return record;
        };

        if !record.begin_loading() {
            if self.debug_enabled() {
                debug!("{} {} fetch already in flight", descriptor.name(), id);
            }
            return record;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                if self.debug_enabled() {
                    debug!("fetching {} {}", descriptor.name(), id);
                }
                handle.spawn(self.clone().run_fetch(
                    adapter,
                    Arc::clone(descriptor),
                    id,
                    record.clone(),
                ));
            }
            Err(e) => {
                warn!("cannot fetch {} {}: {}", descriptor.name(), id, e);
                record.fail_loading(StoreError::Adapter(AdapterError::Request(format!(
                    "no async runtime: {e}"
                ))));
            }
        }
        record
    }

    async fn run_fetch(
        self,
        adapter: Arc<dyn Adapter>,
        descriptor: Arc<TypeDescriptor>,
        id: PrimaryKey,
        record: Record,
    ) {
        let result = adapter
            .find(&descriptor, &id)
            .await
            .map_err(|e| match e {
                AdapterError::NotFound => StoreError::RecordNotFound {
                    type_name: descriptor.name().to_string(),
                    id: id.clone(),
                },
                other => StoreError::Adapter(other),
            })
            .and_then(|json| parse_raw_data(&json).map_err(StoreError::InvalidPayload));

        match result {
            Ok(raw) => {
                self.with_map(&descriptor, |_| record.apply_load(raw));
                if self.debug_enabled() {
                    debug!("fetched {} {}", descriptor.name(), id);
                }
            }
            Err(e) => {
                warn!("fetch of {} {} failed: {}", descriptor.name(), id, e);
                record.fail_loading(e);
            }
        }
    }

    /// Find a record and wait until it is loaded.
    pub async fn fetch(
        &self,
        descriptor: &Arc<TypeDescriptor>,
        id: impl Into<PrimaryKey>,
    ) -> Result<Record> {
        let record = self.find(descriptor, id);
        if record.is_loaded() {
            return Ok(record);
        }
        self.adapter()?;
        record.loaded().await?;
        Ok(record)
    }

    /// Return a resident record without fetching.
    pub fn peek(&self, descriptor: &TypeDescriptor, id: &PrimaryKey) -> Option<Record> {
        self.inner
            .maps
            .lock()
            .get(&type_key(descriptor))
            .and_then(|map| map.get(id))
    }

    /// True if a loaded record for `id` is resident.
    pub fn is_loaded(&self, descriptor: &TypeDescriptor, id: &PrimaryKey) -> bool {
        self.peek(descriptor, id)
            .is_some_and(|record| record.is_loaded())
    }

    /// Snapshot of the loaded records of a type, in insertion order.
    pub fn all_loaded(&self, descriptor: &TypeDescriptor) -> Vec<Record> {
        self.inner
            .maps
            .lock()
            .get(&type_key(descriptor))
            .map(|map| map.all_loaded().collect())
            .unwrap_or_default()
    }

    /// Create a new, unsaved record with every attribute at its default.
    pub fn create_record(&self, descriptor: &Arc<TypeDescriptor>) -> Record {
        if self.debug_enabled() {
            debug!("created new {}", descriptor.name());
        }
        Record::unsaved(Arc::clone(descriptor), self.inner.config.log_level)
    }

    /// Create a new, unsaved record and assign `attributes` to it.
    ///
    /// Values equal to an attribute's default leave that attribute clean.
    pub fn create_record_with<I, K, V>(
        &self,
        descriptor: &Arc<TypeDescriptor>,
        attributes: I,
    ) -> Result<Record>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let record = self.create_record(descriptor);
        for (name, value) in attributes {
            record.set(name.as_ref(), value)?;
        }
        Ok(record)
    }

    /// Persist a record through the adapter.
    ///
    /// New records are created and receive their primary key; dirty
    /// persisted records send their changed attributes. Only the overrides
    /// present when the save was issued are committed, so assignments made
    /// while it is in flight stay pending. On failure the record keeps its
    /// overrides. A second save of the same record fails with
    /// [`StoreError::SaveInFlight`] until the first one finishes.
    pub async fn save(&self, record: &Record) -> Result<()> {
        let adapter = self.adapter()?;
        let descriptor = Arc::clone(record.descriptor());
        let Some(_saving) = record.begin_saving() else {
            return Err(StoreError::SaveInFlight {
                type_name: descriptor.name().to_string(),
                id: record.id(),
            });
        };

        if record.is_new() {
            return self.save_new(adapter.as_ref(), &descriptor, record).await;
        }

        if !record.is_dirty() {
            return Ok(());
        }

        let Some(id) = record.id() else {
            return Ok(());
        };
        let sent = record.pending_changes();
        let changes = record.changes_json();
        let response = adapter.update_record(&descriptor, &id, changes).await?;
        let raw = match &response {
            JsonValue::Null => RawData::new(),
            other => parse_raw_data(other).map_err(StoreError::InvalidPayload)?,
        };
        self.with_map(&descriptor, |_| {
            record.commit_sent(sent);
            record.apply_load(raw);
        });
        if self.debug_enabled() {
            debug!("updated {} {}", descriptor.name(), id);
        }
        Ok(())
    }

    async fn save_new(
        &self,
        adapter: &dyn Adapter,
        descriptor: &Arc<TypeDescriptor>,
        record: &Record,
    ) -> Result<()> {
        let sent = record.pending_changes();
        let payload = record.to_json()?;
        let response = adapter.create_record(descriptor, payload).await?;
        let (id, raw) = Self::prepare(descriptor, 0, &response)?;

        let displaced = self.with_map(descriptor, |map| -> Result<Option<Record>> {
            record.check_primary_key(&id)?;
            let displaced = map.insert(id.clone(), record)?;
            record.assign_primary_key(id.clone())?;
            record.commit_sent(sent);
            record.apply_load(raw.clone());
            if let Some(shell) = &displaced {
                shell.apply_load(raw);
            }
            Ok(displaced)
        })?;

        if displaced.is_some() {
            warn!(
                "created {} {} replaced an unloaded shell for the same key",
                descriptor.name(),
                id
            );
        }
        info!("created {} {}", descriptor.name(), id);
        Ok(())
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;

use crate::error::AdapterError;
use crate::model::typedescriptor::TypeDescriptor;
use crate::model::value::PrimaryKey;
use crate::store::adapter::Adapter;

/// In-memory adapter serving attribute hashes from fixtures.
///
/// Created records get the next free integer key of their type.
#[derive(Default)]
pub struct FixtureAdapter {
    fixtures: Mutex<HashMap<String, Vec<JsonValue>>>,
    latency: Option<Duration>,
    find_calls: AtomicUsize,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
}

impl FixtureAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Seed attribute hashes for `type_name`.
    pub fn with_fixtures<I>(self, type_name: &str, fixtures: I) -> Self
    where
        I: IntoIterator<Item = JsonValue>,
    {
        self.fixtures
            .lock()
            .entry(type_name.to_string())
            .or_default()
            .extend(fixtures);
        self
    }

    /// Add one attribute hash after construction.
    pub fn add_fixture(&self, type_name: &str, fixture: JsonValue) {
        self.fixtures
            .lock()
            .entry(type_name.to_string())
            .or_default()
            .push(fixture);
    }

    /// Current fixtures of a type, including created and updated records.
    pub fn fixtures(&self, type_name: &str) -> Vec<JsonValue> {
        self.fixtures
            .lock()
            .get(type_name)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of `find` requests served so far.
    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn matches_key(fixture: &JsonValue, primary_key_name: &str, id: &JsonValue) -> bool {
    fixture.get(primary_key_name) == Some(id)
}

#[async_trait]
impl Adapter for FixtureAdapter {
    async fn find(
        &self,
        descriptor: &TypeDescriptor,
        id: &PrimaryKey,
    ) -> Result<JsonValue, AdapterError> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        let key = id.to_json();
        self.fixtures
            .lock()
            .get(descriptor.name())
            .and_then(|fixtures| {
                fixtures
                    .iter()
                    .find(|fixture| matches_key(fixture, descriptor.primary_key_name(), &key))
                    .cloned()
            })
            .ok_or(AdapterError::NotFound)
    }

    async fn create_record(
        &self,
        descriptor: &TypeDescriptor,
        payload: JsonValue,
    ) -> Result<JsonValue, AdapterError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        let JsonValue::Object(mut object) = payload else {
            return Err(AdapterError::InvalidResponse(
                "create payload must be an object".to_string(),
            ));
        };

        let mut fixtures = self.fixtures.lock();
        let existing = fixtures.entry(descriptor.name().to_string()).or_default();
        let primary_key_name = descriptor.primary_key_name();
        let has_key = object
            .get(primary_key_name)
            .is_some_and(|value| !value.is_null());
        if !has_key {
            let next = existing
                .iter()
                .filter_map(|fixture| fixture.get(primary_key_name).and_then(JsonValue::as_i64))
                .max()
                .unwrap_or(0)
                + 1;
            object.insert(primary_key_name.to_string(), JsonValue::from(next));
        }

        let created = JsonValue::Object(object);
        existing.push(created.clone());
        Ok(created)
    }

    async fn update_record(
        &self,
        descriptor: &TypeDescriptor,
        id: &PrimaryKey,
        changes: JsonValue,
    ) -> Result<JsonValue, AdapterError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        let key = id.to_json();
        let mut fixtures = self.fixtures.lock();
        let fixture = fixtures
            .get_mut(descriptor.name())
            .and_then(|fixtures| {
                fixtures
                    .iter_mut()
                    .find(|fixture| matches_key(fixture, descriptor.primary_key_name(), &key))
            })
            .ok_or(AdapterError::NotFound)?;

        if let (JsonValue::Object(target), JsonValue::Object(changes)) = (&mut *fixture, changes) {
            target.extend(changes);
        }
        Ok(fixture.clone())
    }
}

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use record_store::store::fixtureadapter::FixtureAdapter;
use record_store::{
    Adapter, AdapterError, AttributeTypeRegistry, DefaultValue, PrimaryKey, TypeDescriptor,
};
use serde_json::Value as JsonValue;
use tokio::sync::Semaphore;

pub fn person() -> Arc<TypeDescriptor> {
    let registry = AttributeTypeRegistry::default();
    TypeDescriptor::builder("person")
        .attribute("name", registry.get("string").unwrap())
        .attribute("isDrugAddict", registry.get("boolean").unwrap())
        .attribute("firstName", registry.get("string").unwrap())
        .build()
}

pub fn post() -> Arc<TypeDescriptor> {
    let registry = AttributeTypeRegistry::default();
    TypeDescriptor::builder("post")
        .attribute("title", registry.get("string").unwrap())
        .attribute("updatedAt", registry.get("date").unwrap())
        .attribute("rating", registry.get("decimal").unwrap())
        .attribute("views", registry.get("number").unwrap())
        .build()
}

pub fn tag() -> Arc<TypeDescriptor> {
    let registry = AttributeTypeRegistry::default();
    TypeDescriptor::builder("tag")
        .attribute_with_default(
            "name",
            registry.get("string").unwrap(),
            DefaultValue::value("unknown"),
        )
        .attribute("color", registry.get("string").unwrap())
        .build()
}

/// Adapter whose `find` never completes.
pub struct PendingAdapter;

#[async_trait]
impl Adapter for PendingAdapter {
    async fn find(&self, _: &TypeDescriptor, _: &PrimaryKey) -> Result<JsonValue, AdapterError> {
        std::future::pending().await
    }

    async fn create_record(
        &self,
        _: &TypeDescriptor,
        _: JsonValue,
    ) -> Result<JsonValue, AdapterError> {
        std::future::pending().await
    }

    async fn update_record(
        &self,
        _: &TypeDescriptor,
        _: &PrimaryKey,
        _: JsonValue,
    ) -> Result<JsonValue, AdapterError> {
        std::future::pending().await
    }
}

/// Fixture adapter whose `find` waits for an explicit release.
pub struct GatedAdapter {
    pub fixtures: FixtureAdapter,
    gate: Semaphore,
    pub find_calls: AtomicUsize,
}

impl GatedAdapter {
    pub fn new(fixtures: FixtureAdapter) -> Self {
        Self {
            fixtures,
            gate: Semaphore::new(0),
            find_calls: AtomicUsize::new(0),
        }
    }

    pub fn release(&self, fetches: usize) {
        self.gate.add_permits(fetches);
    }

    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Adapter for GatedAdapter {
    async fn find(
        &self,
        descriptor: &TypeDescriptor,
        id: &PrimaryKey,
    ) -> Result<JsonValue, AdapterError> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| AdapterError::Request(e.to_string()))?;
        permit.forget();
        self.fixtures.find(descriptor, id).await
    }

    async fn create_record(
        &self,
        descriptor: &TypeDescriptor,
        payload: JsonValue,
    ) -> Result<JsonValue, AdapterError> {
        self.fixtures.create_record(descriptor, payload).await
    }

    async fn update_record(
        &self,
        descriptor: &TypeDescriptor,
        id: &PrimaryKey,
        changes: JsonValue,
    ) -> Result<JsonValue, AdapterError> {
        self.fixtures.update_record(descriptor, id, changes).await
    }
}

/// Adapter that rejects every write.
pub struct RejectingAdapter;

#[async_trait]
impl Adapter for RejectingAdapter {
    async fn find(&self, _: &TypeDescriptor, _: &PrimaryKey) -> Result<JsonValue, AdapterError> {
        Err(AdapterError::NotFound)
    }

    async fn create_record(
        &self,
        _: &TypeDescriptor,
        _: JsonValue,
    ) -> Result<JsonValue, AdapterError> {
        Err(AdapterError::Status {
            status: 422,
            body: "name is taken".to_string(),
        })
    }

    async fn update_record(
        &self,
        _: &TypeDescriptor,
        _: &PrimaryKey,
        _: JsonValue,
    ) -> Result<JsonValue, AdapterError> {
        Err(AdapterError::Request("connection reset".to_string()))
    }
}

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::AdapterError;
use crate::model::typedescriptor::TypeDescriptor;
use crate::model::value::PrimaryKey;

/// Capability a [`Store`](crate::store::datastore::Store) calls into to
/// fetch and persist records.
///
/// Payloads are wire-shaped attribute hashes (JSON objects).
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Fetch the attribute hash of one record.
    ///
    /// Return [`AdapterError::NotFound`] when the source has no such record.
    async fn find(
        &self,
        descriptor: &TypeDescriptor,
        id: &PrimaryKey,
    ) -> Result<JsonValue, AdapterError>;

    /// Persist a new record.
    ///
    /// The returned hash must carry the assigned primary key.
    async fn create_record(
        &self,
        descriptor: &TypeDescriptor,
        payload: JsonValue,
    ) -> Result<JsonValue, AdapterError>;

    /// Persist changed attributes of an existing record.
    ///
    /// The returned hash is merged into the record; an empty object or
    /// `null` means the source confirmed the change as sent.
    async fn update_record(
        &self,
        descriptor: &TypeDescriptor,
        id: &PrimaryKey,
        changes: JsonValue,
    ) -> Result<JsonValue, AdapterError>;
}

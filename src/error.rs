use thiserror::Error;

use crate::model::value::PrimaryKey;

/// Failures reported by an [`Adapter`](crate::store::adapter::Adapter).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    /// The remote source has no record for the requested key.
    #[error("record not found")]
    NotFound,

    /// The request could not be sent or completed.
    #[error("Request failed: {0}")]
    Request(String),

    /// The remote source answered with a non-success status.
    #[error("Remote API error ({status}): {body}")]
    Status { status: u16, body: String },

    /// The response body could not be interpreted.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Errors surfaced by records and stores.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// A raw or assigned value cannot be converted to the attribute's type.
    #[error("cannot coerce `{type_name}.{attribute}` to `{attribute_type}`: {message}")]
    AttributeCoercion {
        type_name: String,
        attribute: String,
        attribute_type: String,
        message: String,
    },

    /// A raw data hash has no usable primary key.
    #[error("{type_name} data at index {index} has no usable primary key `{primary_key_name}`")]
    MissingPrimaryKey {
        type_name: String,
        primary_key_name: String,
        index: usize,
    },

    /// The adapter reported that the record does not exist.
    #[error("{type_name} with id {id} not found")]
    RecordNotFound { type_name: String, id: PrimaryKey },

    /// Two distinct record instances were observed for the same identity.
    #[error("duplicate identity for {type_name} with id {id}")]
    DuplicateIdentity { type_name: String, id: PrimaryKey },

    /// The attribute is not declared on the record's type.
    #[error("`{type_name}` has no attribute `{attribute}`")]
    UnknownAttribute { type_name: String, attribute: String },

    /// No attribute type is registered under the name.
    #[error("unknown attribute type `{0}`")]
    UnknownAttributeType(String),

    /// The primary key of a persisted record cannot change.
    #[error("primary key of {type_name} {id} is immutable")]
    PrimaryKeyImmutable { type_name: String, id: PrimaryKey },

    /// Another save of the same record has not finished yet.
    #[error("a save of {type_name} {id:?} is already in flight")]
    SaveInFlight {
        type_name: String,
        id: Option<PrimaryKey>,
    },

    /// Raw data was not shaped as an attribute hash.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The operation needs an adapter but the store has none.
    #[error("store has no adapter")]
    NoAdapter,

    /// The adapter failed.
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

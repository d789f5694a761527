/// Error types shared by the model and store layers.
pub mod error;
/// Typed values, attribute types, type descriptors and records.
pub mod model;
/// Identity map, store orchestration and adapter capabilities.
pub mod store;

pub use error::{AdapterError, Result, StoreError};
pub use model::attributetype::{AttributeType, AttributeTypeRegistry, DefaultValue};
pub use model::record::Record;
pub use model::typedescriptor::TypeDescriptor;
pub use model::value::{PrimaryKey, RawData, Value};
pub use store::adapter::Adapter;
pub use store::datastore::{Store, StoreConfig};
pub use store::fixtureadapter::FixtureAdapter;
pub use store::restadapter::{RestAdapter, RestAdapterConfig};

/// Logging verbosity for store operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Emit verbose debug output.
    Debug,
    /// Emit standard informational output.
    Information,
}

impl Default for LogLevel {
    /// Defaults to `Information` logging.
    fn default() -> Self {
        LogLevel::Information
    }
}

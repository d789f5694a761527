/// Capability the store uses to fetch and persist records.
pub mod adapter;
/// Store orchestration and configuration.
pub mod datastore;
/// In-memory fixture adapter.
pub mod fixtureadapter;
/// Per-type identity maps.
pub mod identitymap;
/// Wire JSON to raw data.
pub(crate) mod parse;
/// JSON-over-HTTP adapter.
pub mod restadapter;

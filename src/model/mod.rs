/// Named coercion contracts and their registry.
pub mod attributetype;
/// In-memory record instances.
pub mod record;
/// Per-type attribute declarations.
pub mod typedescriptor;
/// Typed values and primary keys.
pub mod value;

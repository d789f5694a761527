pub mod dirty;
pub mod identity;

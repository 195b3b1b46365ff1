//! Records and the per-client descriptor registry

pub mod record;
pub mod registry;

pub use record::Record;
pub use registry::EntityRegistry;

//! Common data types used throughout the client

pub mod batch;
pub mod descriptor;
pub mod fields;
pub mod operation;
pub mod unit;

pub use batch::{BatchError, BatchItem, BatchResult};
pub use descriptor::{
    EntityDescriptor, EntityDescriptorBuilder, FieldNormalizer, LookupKey, LookupRule,
    LookupShape, Mutability,
};
pub use fields::{field_map, has_value, key_string, present, FieldMap};
pub use operation::Operation;
pub use unit::{CorrelationKey, PendingWriteUnit, RetryHandle};

//! Common types and traits shared across `geoverlay` crates.
//!
//! This crate provides the record model (schemas, features, values) and the
//! persistence traits that are shared between `geoverlay-core` and format
//! implementation crates, preventing circular dependencies.

pub mod feature;
pub mod schema;
pub mod store;

// Re-export commonly used types
pub use feature::{Feature, FeatureId, ValidationError, Value, validate};
pub use schema::{
    Crs, Field, FieldKind, FieldUnionPolicy, GeometryKind, Schema, SchemaError, derive_schema,
};
pub use store::{CancelFlag, FeatureStore, MemoryStore, NullProgress, ProgressListener};

//! `GeoJSON` support for `geoverlay`.
//!
//! Reads `GeoJSON` files (a `FeatureCollection`, a single feature or
//! geometry, or newline-delimited features) into schema-bound features, and
//! writes operation results through [`GeoJsonFileStore`], which only replaces
//! the target file when a run commits.

pub mod error;
pub mod parser;
pub mod reader;
pub mod store;
pub mod writer;

pub use error::{GeoJsonError, GeoJsonResult, SourcePosition};
pub use reader::{GEOMETRY_FIELD, GeoJsonDataset, read_geojson, read_geojson_bytes};
pub use store::GeoJsonFileStore;
pub use writer::{GeoJsonWriter, GeoJsonWriterOptions, write_geojson_to_bytes};

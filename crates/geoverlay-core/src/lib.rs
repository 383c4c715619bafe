//! `geoverlay-core` is the processing library of the `geoverlay` project: a
//! streaming feature transformation and overlay engine for vector data.
//!
//! This crate includes:
//! - **Pipeline**: lazy, pull-based stages (buffer, overlay, merge, explode,
//!   point derivation, spatial aggregate joins) composed as collections.
//! - **CRS & Units**: CRS comparison, built-in reprojection and linear unit
//!   conversion, with secondary inputs aligned to the primary CRS.
//! - **Geodetic buffering**: true-distance buffers on geographic data.
//! - **Spatial index**: an R-tree over a materialized collection, used by the
//!   joining stages.
//! - **Writer**: all-or-nothing persistence of a run into a
//!   [`FeatureStore`](geoverlay_core_common::FeatureStore).
//! - **Operations**: typed, validated entry points over the pipeline.

pub mod buffer;
pub mod crs;
pub mod error;
pub mod index;
pub mod kernel;
pub mod operations;
pub mod pipeline;
pub mod types;
pub mod units;
pub mod writer;

pub use error::{GeoverlayError, Result};
pub use operations::OperationInput;
pub use pipeline::{FeatureCollection, FeatureCursor, MemoryCollection, SharedCollection};
pub use units::DistanceUnit;
pub use writer::{FeatureWriter, run_operation};

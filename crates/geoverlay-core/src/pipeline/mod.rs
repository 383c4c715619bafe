//! Lazy, pull-based transformation stages.
//!
//! Every stage is a [`FeatureCollection`] wrapping its inputs; opening it
//! opens the inputs, and its cursor computes one output feature at a time
//! on demand. Stages that join two inputs reproject the secondary input into
//! the primary input's CRS and index it when the cursor is opened.

pub mod aggregate;
pub mod buffer;
pub mod cursor;
pub mod explode;
pub mod merge;
pub mod near;
pub mod overlay;
pub mod points;
pub mod reproject;
pub mod shape;

pub use aggregate::{AggregateMeasure, SpatialAggregateJoin};
pub use buffer::{BUFFER_DISTANCE_FIELD, BufferCollection, DistanceExpr};
pub use cursor::{
    FeatureCollection, FeatureCursor, IdSequence, MemoryCollection, Produce, SharedCollection,
    StageCursor, Upstream, collect, pull,
};
pub use explode::ExplodeCollection;
pub use merge::{MergeCollection, RenameCollection};
pub use near::NearCollection;
pub use overlay::{DifferenceCollection, IntersectCollection, union, update};
pub use points::{PointLocation, ToPointCollection, VerticesToPointsCollection};
pub use reproject::{ReprojectCollection, align, reproject};
pub use shape::{ShapeCollection, ShapeKind};

use geoverlay_core_common::{GeometryKind, Schema};

use crate::error::{GeometryError, Result};

/// Fails unless the declared geometry kind of `schema` satisfies `accepts`.
pub(crate) fn require_kind(
    role: &str,
    schema: &Schema,
    expected: &str,
    accepts: impl Fn(GeometryKind) -> bool,
) -> Result<()> {
    let found = schema.geometry_kind();
    if accepts(found) {
        return Ok(());
    }
    Err(GeometryError::WrongGeometryKind {
        role: role.to_string(),
        expected: expected.to_string(),
        found,
    }
    .into())
}

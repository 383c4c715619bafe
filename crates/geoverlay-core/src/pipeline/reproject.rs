//! CRS alignment of collections.

use std::sync::Arc;

use geoverlay_core_common::{Crs, Feature, Schema};
use log::warn;

use super::cursor::{
    FeatureCollection, FeatureCursor, Produce, SharedCollection, StageCursor, Upstream,
};
use crate::crs::{ProjReprojector, Reprojector, Transformation, same_crs};
use crate::error::{CrsError, Result};

/// Collection whose geometries are transformed into another CRS.
#[derive(Debug)]
pub struct ReprojectCollection {
    source: SharedCollection,
    schema: Schema,
    transformation: Arc<dyn Transformation>,
}

impl ReprojectCollection {
    /// Wraps `source`, transforming from its CRS into `to`.
    ///
    /// # Errors
    ///
    /// Returns [`CrsError::UnsupportedTransform`] when `source` has no CRS or
    /// `reprojector` cannot resolve one of the two systems.
    pub fn new(source: SharedCollection, to: Crs, reprojector: &dyn Reprojector) -> Result<Self> {
        let from = source.schema().crs().cloned().ok_or_else(|| CrsError::UnsupportedTransform {
            from: "Unknown".to_string(),
            to: to.identifier(),
        })?;
        let transformation = reprojector.transformation(&from, &to)?;
        let schema = source.schema().clone().with_crs(Some(to));
        Ok(Self {
            source,
            schema,
            transformation,
        })
    }
}

struct Transform {
    upstream: Upstream,
    transformation: Arc<dyn Transformation>,
}

impl Produce for Transform {
    fn produce(&mut self) -> Result<Option<Feature>> {
        let Some(mut feature) = self.upstream.pull()? else {
            return Ok(None);
        };
        if let Some(geometry) = &feature.geometry {
            feature.geometry = Some(self.transformation.apply(geometry)?);
        }
        Ok(Some(feature))
    }

    fn release(&mut self) {
        self.upstream.release();
    }
}

impl FeatureCollection for ReprojectCollection {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn features(&self) -> Result<Box<dyn FeatureCursor>> {
        Ok(StageCursor::boxed(Transform {
            upstream: Upstream::new(self.source.features()?),
            transformation: Arc::clone(&self.transformation),
        }))
    }
}

/// Returns `source` in `to`, wrapping it only when the CRS differ.
///
/// With `automatic` the transformation is logged as a warning, since the
/// caller did not ask for it.
///
/// # Errors
///
/// Returns [`CrsError::UnsupportedTransform`] when a system cannot be
/// resolved.
pub fn reproject(
    source: SharedCollection,
    to: Option<&Crs>,
    automatic: bool,
) -> Result<SharedCollection> {
    reproject_with(source, to, automatic, &ProjReprojector)
}

/// [`reproject`] with an explicit [`Reprojector`].
///
/// # Errors
///
/// Returns [`CrsError::UnsupportedTransform`] when no transformation exists.
pub fn reproject_with(
    source: SharedCollection,
    to: Option<&Crs>,
    automatic: bool,
    reprojector: &dyn Reprojector,
) -> Result<SharedCollection> {
    let Some(to) = to else {
        return Ok(source);
    };
    if same_crs(source.schema().crs(), Some(to)) {
        return Ok(source);
    }
    if automatic {
        warn!(
            "Reprojecting '{}' from {} to {}",
            source.schema().type_name(),
            source.schema().crs().map_or_else(|| "Unknown".to_string(), Crs::identifier),
            to.identifier()
        );
    }
    Ok(Arc::new(ReprojectCollection::new(source, to.clone(), reprojector)?))
}

/// Brings the secondary operand of a binary stage into the primary's CRS.
///
/// # Errors
///
/// Returns [`CrsError::UnsupportedTransform`] when no transformation exists.
pub fn align(primary: &Schema, secondary: SharedCollection) -> Result<SharedCollection> {
    reproject(secondary, primary.crs(), true)
}

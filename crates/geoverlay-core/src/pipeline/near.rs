//! Nearest-feature lookup against a second collection.

use geoverlay_core_common::{Feature, Field, FieldKind, Schema, Value, derive_schema};

use super::cursor::{
    FeatureCollection, FeatureCursor, IdSequence, Produce, SharedCollection, StageCursor, Upstream,
};
use super::reproject::align;
use crate::crs::resolve_linear_unit;
use crate::error::{ConfigError, Result};
use crate::index::SpatialIndex;
use crate::kernel;
use crate::units::{DistanceUnit, convert_distance};

/// Field receiving the id (or chosen attribute) of the nearest feature.
pub const NEAR_ID_FIELD: &str = "near_fid";
/// Field receiving the distance to the nearest feature.
pub const NEAR_DISTANCE_FIELD: &str = "near_dist";

/// Appends the nearest feature of `near` and its distance to every input
/// feature.
///
/// Distances are planar. `max_distance` and the reported distance are in
/// `unit` (CRS units for [`DistanceUnit::Default`]). Inputs without a match
/// within range get `Null` values; inputs without geometry are skipped.
#[derive(Debug)]
pub struct NearCollection {
    input: SharedCollection,
    near: SharedCollection,
    schema: Schema,
    id_field: Option<String>,
    max_distance: Option<f64>,
    crs_unit: DistanceUnit,
    unit: DistanceUnit,
}

impl NearCollection {
    /// Creates the stage, reprojecting `near` into the CRS of `input`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when `id_field` is not an attribute of
    /// `near`, a schema error when an output field collides, or a CRS error.
    pub fn new(
        input: SharedCollection,
        near: SharedCollection,
        id_field: Option<String>,
        max_distance: Option<f64>,
        unit: DistanceUnit,
    ) -> Result<Self> {
        if let Some(name) = &id_field {
            if !near.schema().field(name).is_some_and(|f| !f.is_geometry()) {
                return Err(ConfigError::InvalidOption {
                    option: "near id field".to_string(),
                    message: format!(
                        "'{name}' is not an attribute of '{}'",
                        near.schema().type_name()
                    ),
                }
                .into());
            }
        }
        let near = align(input.schema(), near)?;
        let schema = derive_schema(
            input.schema(),
            &[
                Field::new(NEAR_ID_FIELD, FieldKind::Text).with_length(50),
                Field::new(NEAR_DISTANCE_FIELD, FieldKind::Float).with_length(38),
            ],
        )?;
        let crs_unit = resolve_linear_unit(input.schema().crs());
        Ok(Self {
            input,
            near,
            schema,
            id_field,
            max_distance,
            crs_unit,
            unit,
        })
    }
}

struct Nearest {
    upstream: Upstream,
    index: SpatialIndex,
    id_field: Option<String>,
    max_distance: Option<f64>,
    crs_unit: DistanceUnit,
    unit: DistanceUnit,
    ids: IdSequence,
}

impl Nearest {
    fn identify(&self, near: &Feature) -> Value {
        match &self.id_field {
            Some(name) => near
                .get(name)
                .map_or(Value::Null, |v| v.coerce(FieldKind::Text)),
            None => Value::Text(near.id.to_string()),
        }
    }
}

impl Produce for Nearest {
    fn produce(&mut self) -> Result<Option<Feature>> {
        let limit = self
            .max_distance
            .map(|d| convert_distance(d, self.unit, self.crs_unit));
        while let Some(source) = self.upstream.pull()? {
            let Some(geometry) = source.geometry.as_ref().filter(|g| !kernel::is_empty(Some(*g)))
            else {
                continue;
            };
            let found = self
                .index
                .nearest(geometry, limit)
                .and_then(|(id, d)| self.index.get(id).map(|near| (near, d)));
            let (near_id, near_distance) = match found {
                Some((near, d)) => (
                    self.identify(near),
                    Value::Float(convert_distance(d, self.crs_unit, self.unit)),
                ),
                None => (Value::Null, Value::Null),
            };

            let mut feature = Feature::new(self.ids.next_id(), source.geometry);
            feature.attributes = source.attributes;
            feature.set(NEAR_ID_FIELD, near_id);
            feature.set(NEAR_DISTANCE_FIELD, near_distance);
            return Ok(Some(feature));
        }
        Ok(None)
    }

    fn release(&mut self) {
        self.upstream.release();
    }
}

impl FeatureCollection for NearCollection {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn features(&self) -> Result<Box<dyn FeatureCursor>> {
        let index = SpatialIndex::from_collection(self.near.as_ref())?;
        Ok(StageCursor::boxed(Nearest {
            upstream: Upstream::new(self.input.features()?),
            index,
            id_field: self.id_field.clone(),
            max_distance: self.max_distance,
            crs_unit: self.crs_unit,
            unit: self.unit,
            ids: IdSequence::for_schema(&self.schema),
        }))
    }
}

//! Per-polygon aggregation over an indexed line or point collection.

use geo::Intersects;
use geo_types::Geometry;
use geoverlay_core_common::{Feature, Field, FieldKind, GeometryKind, Schema, Value, derive_schema};
use log::debug;

use super::cursor::{
    FeatureCollection, FeatureCursor, IdSequence, Produce, SharedCollection, StageCursor, Upstream,
};
use super::reproject::align;
use super::require_kind;
use crate::crs::is_geographic;
use crate::error::Result;
use crate::index::SpatialIndex;
use crate::kernel;

/// Default name of the summed line length field.
pub const DEFAULT_LENGTH_FIELD: &str = "sum_len";
/// Default name of the intersecting line count field.
pub const DEFAULT_LINE_COUNT_FIELD: &str = "line_cnt";
/// Default name of the contained point count field.
pub const DEFAULT_POINT_COUNT_FIELD: &str = "pnt_cnt";

/// What is aggregated for each polygon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateMeasure {
    /// Sum of the lengths of line pieces inside the polygon, plus the number
    /// of lines contributing.
    SumLength {
        /// Field receiving the summed length
        length_field: String,
        /// Field receiving the number of lines
        count_field: String,
    },
    /// Number of point features inside the polygon.
    CountPoints {
        /// Field receiving the count
        count_field: String,
    },
}

impl AggregateMeasure {
    fn fields(&self) -> Vec<Field> {
        match self {
            Self::SumLength {
                length_field,
                count_field,
            } => vec![
                Field::new(length_field.as_str(), FieldKind::Float).with_length(38),
                Field::new(count_field.as_str(), FieldKind::Integer).with_length(5),
            ],
            Self::CountPoints { count_field } => {
                vec![Field::new(count_field.as_str(), FieldKind::Integer).with_length(9)]
            },
        }
    }
}

/// Spatial aggregate join: every polygon with a non-empty geometry, plus
/// the aggregate of the "many" side features it intersects.
///
/// Polygons without matches are emitted with zero aggregates. Lengths are
/// planar in CRS units, or geodesic meters when the polygons use a
/// geographic CRS.
#[derive(Debug)]
pub struct SpatialAggregateJoin {
    polygons: SharedCollection,
    many: SharedCollection,
    schema: Schema,
    measure: AggregateMeasure,
    geodesic: bool,
}

impl SpatialAggregateJoin {
    /// Creates the stage.
    ///
    /// # Errors
    ///
    /// Returns a geometry-kind error when `polygons` is not a polygon
    /// collection or `many` does not match the measure, a schema error when
    /// an output field collides, or a CRS error when `many` cannot be
    /// reprojected.
    pub fn new(
        polygons: SharedCollection,
        many: SharedCollection,
        measure: AggregateMeasure,
    ) -> Result<Self> {
        require_kind("polygonFeatures", polygons.schema(), "polygon", GeometryKind::is_polygon)?;
        match &measure {
            AggregateMeasure::SumLength { .. } => {
                require_kind("lineFeatures", many.schema(), "line", GeometryKind::is_line)?;
            },
            AggregateMeasure::CountPoints { .. } => {
                require_kind("pointFeatures", many.schema(), "point", GeometryKind::is_point)?;
            },
        }
        let many = align(polygons.schema(), many)?;
        let schema = derive_schema(polygons.schema(), &measure.fields())?;
        let geodesic = polygons.schema().crs().is_some_and(is_geographic);
        Ok(Self {
            polygons,
            many,
            schema,
            measure,
            geodesic,
        })
    }
}

struct Aggregating {
    upstream: Upstream,
    index: SpatialIndex,
    schema: Schema,
    measure: AggregateMeasure,
    geodesic: bool,
    ids: IdSequence,
}

impl Aggregating {
    fn sum_length(&self, polygon: &Geometry<f64>) -> (f64, i64) {
        let mut total = 0.0;
        let mut count = 0;
        for id in self.index.candidates(polygon) {
            let Some(line) = self.index.get(id).and_then(|f| f.geometry.as_ref()) else {
                continue;
            };
            if !line.intersects(polygon) {
                continue;
            }
            // lines touching only the boundary count with zero length
            count += 1;
            if let Some(clipped) = kernel::intersection(line, polygon) {
                total += kernel::length(&clipped, self.geodesic);
            }
        }
        (total, count)
    }

    fn count_points(&self, polygon: &Geometry<f64>) -> i64 {
        self.index
            .candidates(polygon)
            .into_iter()
            .filter_map(|id| self.index.get(id).and_then(|f| f.geometry.as_ref()))
            .filter(|point| point.intersects(polygon))
            .count() as i64
    }

    /// Value coerced to the declared kind of `field`.
    fn typed(&self, field: &str, value: Value) -> Value {
        match self.schema.field(field) {
            Some(descriptor) => value.coerce(descriptor.kind),
            None => value,
        }
    }
}

impl Produce for Aggregating {
    fn produce(&mut self) -> Result<Option<Feature>> {
        while let Some(source) = self.upstream.pull()? {
            let Some(polygon) = source.geometry.filter(|g| !kernel::is_empty(Some(g))) else {
                continue;
            };
            let mut feature = Feature::new(self.ids.next_id(), None);
            feature.attributes = source.attributes;
            match &self.measure {
                AggregateMeasure::SumLength {
                    length_field,
                    count_field,
                } => {
                    let (total, count) = self.sum_length(&polygon);
                    feature.set(length_field.as_str(), self.typed(length_field, total.into()));
                    feature.set(count_field.as_str(), self.typed(count_field, count.into()));
                },
                AggregateMeasure::CountPoints { count_field } => {
                    let count = self.count_points(&polygon);
                    feature.set(count_field.as_str(), self.typed(count_field, count.into()));
                },
            }
            feature.geometry = Some(polygon);
            return Ok(Some(feature));
        }
        Ok(None)
    }

    fn release(&mut self) {
        self.upstream.release();
    }
}

impl FeatureCollection for SpatialAggregateJoin {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn features(&self) -> Result<Box<dyn FeatureCursor>> {
        let index = SpatialIndex::from_collection(self.many.as_ref())?;
        debug!(
            "Aggregating {} candidate feature(s) onto '{}'",
            index.len(),
            self.schema.type_name()
        );
        Ok(StageCursor::boxed(Aggregating {
            upstream: Upstream::new(self.polygons.features()?),
            index,
            schema: self.schema.clone(),
            measure: self.measure.clone(),
            geodesic: self.geodesic,
            ids: IdSequence::for_schema(&self.schema),
        }))
    }
}

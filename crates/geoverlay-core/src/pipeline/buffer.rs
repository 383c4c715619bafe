//! Per-feature buffering with literal or attribute-driven distances.

use std::fmt;

use geo_types::Geometry;
use geoverlay_core_common::{Feature, Field, FieldKind, GeometryKind, Schema, Value, derive_schema};
use log::debug;

use super::cursor::{
    FeatureCollection, FeatureCursor, IdSequence, Produce, SharedCollection, StageCursor, Upstream,
};
use crate::buffer::{BufferBuilder, BufferMode};
use crate::crs::{is_geographic, resolve_linear_unit};
use crate::error::{ConfigError, Result, invalid_parameter};
use crate::kernel;
use crate::units::{DistanceUnit, convert_distance};

/// Name of the field recording the distance each feature was buffered by.
pub const BUFFER_DISTANCE_FIELD: &str = "buf_dist";

/// Where a feature's buffer distance comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum DistanceExpr {
    /// The same distance for every feature.
    Literal(f64),
    /// A numeric attribute of the feature.
    Field(String),
}

impl DistanceExpr {
    /// Distance for `feature`; `None` when the attribute is null or not
    /// numeric.
    #[must_use]
    pub fn evaluate(&self, feature: &Feature) -> Option<f64> {
        match self {
            Self::Literal(d) => Some(*d),
            Self::Field(name) => feature
                .get(name)
                .and_then(Value::as_f64)
                .filter(|d| d.is_finite()),
        }
    }
}

impl fmt::Display for DistanceExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(d) => write!(f, "{d}"),
            Self::Field(name) => write!(f, "[{name}]"),
        }
    }
}

/// Buffer distance and builder chosen for a source CRS.
#[derive(Debug, Clone, Copy)]
struct Strategy {
    builder: BufferBuilder,
    from: DistanceUnit,
    to: DistanceUnit,
}

impl Strategy {
    /// `Default` buffers in CRS units; explicit units on a geographic CRS
    /// buffer geodetically in meters; explicit units on a projected CRS are
    /// converted to its linear unit.
    fn resolve(schema: &Schema, unit: DistanceUnit, quadrant_segments: u32) -> Self {
        let geographic = schema.crs().is_some_and(is_geographic);
        if unit != DistanceUnit::Default && geographic {
            return Self {
                builder: BufferBuilder::geodetic(quadrant_segments),
                from: unit,
                to: DistanceUnit::Meter,
            };
        }
        Self {
            builder: BufferBuilder::planar(quadrant_segments),
            from: unit,
            to: resolve_linear_unit(schema.crs()),
        }
    }
}

/// Buffers every feature of a source collection.
///
/// The output schema is the source schema plus [`BUFFER_DISTANCE_FIELD`],
/// with geometry kind `MultiPolygon`. Features with a null/empty geometry,
/// no distance, or an empty buffer are skipped.
#[derive(Debug)]
pub struct BufferCollection {
    source: SharedCollection,
    schema: Schema,
    distance: DistanceExpr,
    strategy: Strategy,
}

impl BufferCollection {
    /// Creates the stage.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the distance field is not a numeric
    /// attribute of the source, an invalid parameter error for a negative
    /// literal distance buffered geodetically, or a schema error when
    /// `buf_dist` already exists with another kind.
    pub fn new(
        source: SharedCollection,
        distance: DistanceExpr,
        unit: DistanceUnit,
        quadrant_segments: u32,
    ) -> Result<Self> {
        if let DistanceExpr::Field(name) = &distance {
            let is_attribute = source
                .schema()
                .field(name)
                .is_some_and(|f| !f.is_geometry());
            if !is_attribute {
                return Err(ConfigError::InvalidOption {
                    option: "distance field".to_string(),
                    message: format!(
                        "'{name}' is not an attribute of '{}'",
                        source.schema().type_name()
                    ),
                }
                .into());
            }
        }

        let schema = derive_schema(
            source.schema(),
            &[Field::new(BUFFER_DISTANCE_FIELD, FieldKind::Float)
                .with_length(19)
                .with_precision(9)],
        )?
        .with_geometry_kind(GeometryKind::MultiPolygon);
        let strategy = Strategy::resolve(source.schema(), unit, quadrant_segments);
        if let DistanceExpr::Literal(d) = distance {
            if d < 0.0 && strategy.builder.mode() == BufferMode::Geodetic {
                return Err(invalid_parameter(
                    "distance",
                    format!("geodetic buffers need a non-negative distance, got {d}"),
                ));
            }
        }
        debug!(
            "Buffer '{}' by {distance} {unit} ({:?}, {} -> {})",
            source.schema().type_name(),
            strategy.builder.mode(),
            strategy.from,
            strategy.to
        );

        Ok(Self {
            source,
            schema,
            distance,
            strategy,
        })
    }

    /// Returns `true` if buffers are built geodetically.
    #[must_use]
    pub fn is_geodetic(&self) -> bool {
        self.strategy.builder.mode() == BufferMode::Geodetic
    }
}

struct Buffering {
    upstream: Upstream,
    distance: DistanceExpr,
    strategy: Strategy,
    ids: IdSequence,
    skipped: u64,
}

impl Buffering {
    fn buffer(&self, geometry: &Geometry<f64>, distance: f64) -> Result<Option<Geometry<f64>>> {
        let converted = convert_distance(distance, self.strategy.from, self.strategy.to);
        let buffered = self.strategy.builder.buffer(geometry, converted)?;
        if buffered.0.is_empty() {
            return Ok(None);
        }
        Ok(Some(Geometry::MultiPolygon(buffered)))
    }
}

impl Produce for Buffering {
    fn produce(&mut self) -> Result<Option<Feature>> {
        while let Some(source) = self.upstream.pull()? {
            let Some(distance) = self.distance.evaluate(&source) else {
                self.skipped += 1;
                continue;
            };
            let geometry = match &source.geometry {
                Some(g) if !kernel::is_empty(Some(g)) => self.buffer(g, distance)?,
                _ => None,
            };
            let Some(geometry) = geometry else {
                self.skipped += 1;
                continue;
            };

            let mut feature = Feature::new(self.ids.next_id(), Some(geometry));
            feature.attributes = source.attributes;
            feature.set(BUFFER_DISTANCE_FIELD, distance);
            return Ok(Some(feature));
        }
        Ok(None)
    }

    fn release(&mut self) {
        if self.skipped > 0 {
            debug!("Buffer skipped {} feature(s)", self.skipped);
        }
        self.upstream.release();
    }
}

impl FeatureCollection for BufferCollection {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn features(&self) -> Result<Box<dyn FeatureCursor>> {
        Ok(StageCursor::boxed(Buffering {
            upstream: Upstream::new(self.source.features()?),
            distance: self.distance.clone(),
            strategy: self.strategy,
            ids: IdSequence::for_schema(&self.schema),
            skipped: 0,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{MemoryCollection, collect};
    use geo::Area;
    use geo_types::{Point, line_string};
    use geoverlay_core_common::{Crs, FeatureId};

    fn wells(crs: Option<Crs>) -> SharedCollection {
        let schema = Schema::new("wells", "geom", GeometryKind::Point, crs)
            .with_field(Field::new("radius", FieldKind::Float))
            .unwrap();
        let well = |n: u64, xy: Option<f64>, radius: Value| {
            let geometry = xy.map(|c| Geometry::Point(Point::new(c, c)));
            Feature::new(FeatureId::sequential("wells", n), geometry)
                .with_attribute("radius", radius)
        };
        MemoryCollection::shared(
            schema,
            vec![
                well(1, Some(0.0), Value::Float(1.0)),
                well(2, None, Value::Float(1.0)),
                well(3, Some(5.0), Value::Null),
                well(4, Some(9.0), Value::Float(0.0)),
                well(5, Some(3.0), Value::Float(2.0)),
            ],
        )
    }

    #[test]
    fn skips_null_geometry_missing_distance_and_empty_buffer() {
        let stage = BufferCollection::new(
            wells(None),
            DistanceExpr::Field("radius".to_string()),
            DistanceUnit::Default,
            8,
        )
        .unwrap();
        let features = collect(&stage).unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].id.as_str(), "wells.1");
        assert_eq!(features[1].id.as_str(), "wells.2");
        assert_eq!(features[1].get(BUFFER_DISTANCE_FIELD), Some(&Value::Float(2.0)));
        assert_eq!(features[1].get("radius"), Some(&Value::Float(2.0)));
    }

    #[test]
    fn schema_appends_distance_field() {
        let stage =
            BufferCollection::new(wells(None), DistanceExpr::Literal(1.0), DistanceUnit::Default, 8)
                .unwrap();
        let schema = stage.schema();
        assert_eq!(schema.geometry_kind(), GeometryKind::MultiPolygon);
        assert_eq!(schema.fields().last().unwrap().name, BUFFER_DISTANCE_FIELD);
        assert!(schema.contains("radius"));
    }

    #[test]
    fn unknown_distance_field_is_rejected() {
        let err = BufferCollection::new(
            wells(None),
            DistanceExpr::Field("depth".to_string()),
            DistanceUnit::Default,
            8,
        )
        .unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn explicit_unit_on_geographic_crs_is_geodetic() {
        let stage = BufferCollection::new(
            wells(Some(Crs::wgs84())),
            DistanceExpr::Literal(1.0),
            DistanceUnit::Kilometer,
            8,
        )
        .unwrap();
        assert!(stage.is_geodetic());

        let default_unit = BufferCollection::new(
            wells(Some(Crs::wgs84())),
            DistanceExpr::Literal(0.01),
            DistanceUnit::Default,
            8,
        )
        .unwrap();
        assert!(!default_unit.is_geodetic());
    }

    #[test]
    fn negative_geodetic_distance_is_rejected_up_front() {
        let err = BufferCollection::new(
            wells(Some(Crs::wgs84())),
            DistanceExpr::Literal(-5.0),
            DistanceUnit::Meter,
            8,
        )
        .unwrap_err();
        assert!(err.to_string().contains("distance"));

        let planar = BufferCollection::new(
            wells(Some(Crs::web_mercator())),
            DistanceExpr::Literal(-5.0),
            DistanceUnit::Meter,
            8,
        );
        assert!(planar.is_ok());
    }

    #[test]
    fn projected_units_are_converted() {
        let schema =
            Schema::new("roads", "geom", GeometryKind::LineString, Some(Crs::web_mercator()));
        let roads = MemoryCollection::shared(
            schema,
            vec![Feature::new(
                FeatureId::new("roads.1"),
                Some(Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 1000.0, y: 0.0)])),
            )],
        );
        let stage =
            BufferCollection::new(roads, DistanceExpr::Literal(0.1), DistanceUnit::Kilometer, 16)
                .unwrap();
        let features = collect(&stage).unwrap();
        let Some(Geometry::MultiPolygon(mp)) = &features[0].geometry else {
            panic!("expected multipolygon");
        };
        // 1000 x 200 corridor plus a circle of radius 100
        let expected = 200_000.0 + std::f64::consts::PI * 10_000.0;
        assert!((mp.unsigned_area() - expected).abs() / expected < 0.01);
    }
}

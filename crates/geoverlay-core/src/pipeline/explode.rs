//! Multi-part to single-part conversion.

use std::collections::VecDeque;

use geo_types::Geometry;
use geoverlay_core_common::{Feature, Schema};

use super::cursor::{
    FeatureCollection, FeatureCursor, IdSequence, Produce, SharedCollection, StageCursor, Upstream,
};
use crate::error::Result;
use crate::kernel;

/// Splits every multi-part feature into one feature per part.
///
/// Each part keeps the source attributes and gets a fresh id. The schema
/// geometry kind is narrowed to the single-part kind.
#[derive(Debug)]
pub struct ExplodeCollection {
    source: SharedCollection,
    schema: Schema,
}

impl ExplodeCollection {
    /// Creates the stage.
    #[must_use]
    pub fn new(source: SharedCollection) -> Self {
        let schema = source
            .schema()
            .clone()
            .with_geometry_kind(source.schema().geometry_kind().single_part());
        Self { source, schema }
    }
}

/// Single-part members of a geometry.
pub(crate) fn parts(geometry: Geometry<f64>) -> Vec<Geometry<f64>> {
    match geometry {
        Geometry::MultiPoint(mp) => mp.0.into_iter().map(Geometry::Point).collect(),
        Geometry::MultiLineString(mls) => mls.0.into_iter().map(Geometry::LineString).collect(),
        Geometry::MultiPolygon(mp) => mp.0.into_iter().map(Geometry::Polygon).collect(),
        Geometry::GeometryCollection(gc) => gc.0.into_iter().flat_map(parts).collect(),
        single => vec![single],
    }
}

struct Exploding {
    upstream: Upstream,
    ids: IdSequence,
    pending: VecDeque<Feature>,
}

impl Produce for Exploding {
    fn produce(&mut self) -> Result<Option<Feature>> {
        loop {
            if let Some(feature) = self.pending.pop_front() {
                return Ok(Some(feature));
            }
            let Some(source) = self.upstream.pull()? else {
                return Ok(None);
            };
            let Some(geometry) = source.geometry else {
                continue;
            };
            for part in parts(geometry) {
                if kernel::is_empty(Some(&part)) {
                    continue;
                }
                let mut feature = Feature::new(self.ids.next_id(), Some(part));
                feature.attributes.clone_from(&source.attributes);
                self.pending.push_back(feature);
            }
        }
    }

    fn release(&mut self) {
        self.pending.clear();
        self.upstream.release();
    }
}

impl FeatureCollection for ExplodeCollection {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn features(&self) -> Result<Box<dyn FeatureCursor>> {
        Ok(StageCursor::boxed(Exploding {
            upstream: Upstream::new(self.source.features()?),
            ids: IdSequence::for_schema(&self.schema),
            pending: VecDeque::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{MemoryCollection, collect};
    use geo_types::{MultiPoint, Point};
    use geoverlay_core_common::{FeatureId, GeometryKind};

    #[test]
    fn multipoint_becomes_points_with_fresh_ids() {
        let schema = Schema::new("stops", "geom", GeometryKind::MultiPoint, None);
        let source = MemoryCollection::shared(
            schema,
            vec![
                Feature::new(
                    FeatureId::new("stops.7"),
                    Some(Geometry::MultiPoint(MultiPoint::new(vec![
                        Point::new(0.0, 0.0),
                        Point::new(1.0, 1.0),
                        Point::new(2.0, 2.0),
                    ]))),
                )
                .with_attribute("line", "A"),
                Feature::new(FeatureId::new("stops.8"), None).with_attribute("line", "B"),
                Feature::new(FeatureId::new("stops.9"), Some(Geometry::Point(Point::new(5.0, 5.0))))
                    .with_attribute("line", "C"),
            ],
        );
        let stage = ExplodeCollection::new(source);
        assert_eq!(stage.schema().geometry_kind(), GeometryKind::Point);

        let features = collect(&stage).unwrap();
        let ids: Vec<&str> = features.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, ["stops.1", "stops.2", "stops.3", "stops.4"]);
        assert_eq!(features[1].get("line").unwrap().to_string(), "A");
        assert_eq!(features[3].get("line").unwrap().to_string(), "C");
    }
}

//! Point derivation: representative points and vertex extraction.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use geo::{Centroid, InteriorPoint, LineInterpolatePoint};
use geo_types::{Geometry, LineString, Point};
use geoverlay_core_common::{Feature, GeometryKind, Schema};

use super::cursor::{
    FeatureCollection, FeatureCursor, IdSequence, Produce, SharedCollection, StageCursor, Upstream,
};
use crate::error::{ConfigError, Result};
use crate::kernel;

/// One point per feature: its centroid, or a point guaranteed to lie on the
/// geometry when `inside` is set.
#[derive(Debug)]
pub struct ToPointCollection {
    source: SharedCollection,
    schema: Schema,
    inside: bool,
}

impl ToPointCollection {
    /// Creates the stage.
    #[must_use]
    pub fn new(source: SharedCollection, inside: bool) -> Self {
        let schema = source.schema().clone().with_geometry_kind(GeometryKind::Point);
        Self {
            source,
            schema,
            inside,
        }
    }
}

struct ToPoint {
    upstream: Upstream,
    inside: bool,
    ids: IdSequence,
}

impl Produce for ToPoint {
    fn produce(&mut self) -> Result<Option<Feature>> {
        while let Some(source) = self.upstream.pull()? {
            let Some(geometry) = source.geometry.as_ref() else {
                continue;
            };
            let point = if self.inside {
                geometry.interior_point()
            } else {
                geometry.centroid()
            };
            let Some(point) = point else {
                continue;
            };
            let mut feature = Feature::new(self.ids.next_id(), Some(Geometry::Point(point)));
            feature.attributes = source.attributes;
            return Ok(Some(feature));
        }
        Ok(None)
    }

    fn release(&mut self) {
        self.upstream.release();
    }
}

impl FeatureCollection for ToPointCollection {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn features(&self) -> Result<Box<dyn FeatureCursor>> {
        Ok(StageCursor::boxed(ToPoint {
            upstream: Upstream::new(self.source.features()?),
            inside: self.inside,
            ids: IdSequence::for_schema(&self.schema),
        }))
    }
}

/// Which vertices of each line part become points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointLocation {
    /// Every vertex.
    #[default]
    All,
    /// First vertex.
    Start,
    /// Last vertex.
    End,
    /// First and last vertex.
    BothEnds,
    /// Point halfway along the part.
    Mid,
}

impl PointLocation {
    fn points(self, part: &LineString<f64>) -> Vec<Point<f64>> {
        let (Some(first), Some(last)) = (part.points().next(), part.points().last()) else {
            return Vec::new();
        };
        match self {
            Self::All => part.points().collect(),
            Self::Start => vec![first],
            Self::End => vec![last],
            Self::BothEnds => vec![first, last],
            Self::Mid => part.line_interpolate_point(0.5).into_iter().collect(),
        }
    }
}

impl fmt::Display for PointLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::All => "all",
            Self::Start => "start",
            Self::End => "end",
            Self::BothEnds => "both-ends",
            Self::Mid => "mid",
        };
        f.write_str(name)
    }
}

impl FromStr for PointLocation {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "all" => Ok(Self::All),
            "start" => Ok(Self::Start),
            "end" => Ok(Self::End),
            "both-ends" | "bothends" => Ok(Self::BothEnds),
            "mid" | "middle" => Ok(Self::Mid),
            other => Err(ConfigError::InvalidOption {
                option: "point location".to_string(),
                message: format!("unknown location '{other}'"),
            }),
        }
    }
}

/// Points taken from a geometry according to `location`.
///
/// Polygons contribute their rings; points are passed through.
fn vertices(geometry: &Geometry<f64>, location: PointLocation) -> Vec<Point<f64>> {
    if let Some(points) = kernel::as_multi_point(geometry) {
        return points.0;
    }
    if let Some(lines) = kernel::as_multi_line(geometry) {
        return lines.iter().flat_map(|part| location.points(part)).collect();
    }
    if let Some(polygons) = kernel::as_multi_polygon(geometry) {
        return polygons
            .iter()
            .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
            .flat_map(|ring| location.points(ring))
            .collect();
    }
    match geometry {
        Geometry::GeometryCollection(gc) => gc.iter().flat_map(|g| vertices(g, location)).collect(),
        _ => Vec::new(),
    }
}

/// One point feature per selected vertex.
#[derive(Debug)]
pub struct VerticesToPointsCollection {
    source: SharedCollection,
    schema: Schema,
    location: PointLocation,
}

impl VerticesToPointsCollection {
    /// Creates the stage.
    #[must_use]
    pub fn new(source: SharedCollection, location: PointLocation) -> Self {
        let schema = source.schema().clone().with_geometry_kind(GeometryKind::Point);
        Self {
            source,
            schema,
            location,
        }
    }
}

struct Vertices {
    upstream: Upstream,
    location: PointLocation,
    ids: IdSequence,
    pending: VecDeque<Feature>,
}

impl Produce for Vertices {
    fn produce(&mut self) -> Result<Option<Feature>> {
        loop {
            if let Some(feature) = self.pending.pop_front() {
                return Ok(Some(feature));
            }
            let Some(source) = self.upstream.pull()? else {
                return Ok(None);
            };
            let Some(geometry) = source.geometry.as_ref() else {
                continue;
            };
            for point in vertices(geometry, self.location) {
                let mut feature = Feature::new(self.ids.next_id(), Some(Geometry::Point(point)));
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

impl FeatureCollection for VerticesToPointsCollection {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn features(&self) -> Result<Box<dyn FeatureCursor>> {
        Ok(StageCursor::boxed(Vertices {
            upstream: Upstream::new(self.source.features()?),
            location: self.location,
            ids: IdSequence::for_schema(&self.schema),
            pending: VecDeque::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{MemoryCollection, collect};
    use geo::Intersects;
    use geo_types::{line_string, polygon};
    use geoverlay_core_common::FeatureId;

    fn single(kind: GeometryKind, geometry: Geometry<f64>) -> SharedCollection {
        let schema = Schema::new("src", "geom", kind, None);
        let feature = Feature::new(FeatureId::new("src.1"), Some(geometry));
        MemoryCollection::shared(schema, vec![feature])
    }

    fn points_of(collection: &dyn FeatureCollection) -> Vec<Point<f64>> {
        collect(collection)
            .unwrap()
            .into_iter()
            .filter_map(|f| match f.geometry {
                Some(Geometry::Point(p)) => Some(p),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn centroid_of_square() {
        let square = Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 2.0), (x: 0.0, y: 2.0),
        ]);
        let stage = ToPointCollection::new(single(GeometryKind::Polygon, square), false);
        assert_eq!(stage.schema().geometry_kind(), GeometryKind::Point);
        assert_eq!(points_of(&stage), [Point::new(1.0, 1.0)]);
    }

    #[test]
    fn inside_point_lies_on_concave_polygon() {
        let horseshoe = Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0), (x: 3.0, y: 0.0), (x: 3.0, y: 3.0), (x: 2.0, y: 3.0),
            (x: 2.0, y: 1.0), (x: 1.0, y: 1.0), (x: 1.0, y: 3.0), (x: 0.0, y: 3.0),
        ]);
        let stage = ToPointCollection::new(single(GeometryKind::Polygon, horseshoe.clone()), true);
        let points = points_of(&stage);
        assert_eq!(points.len(), 1);
        assert!(horseshoe.intersects(&points[0]));
    }

    #[test]
    fn vertex_locations() {
        let line = Geometry::LineString(line_string![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 4.0, y: 0.0),
        ]);
        let run = |location| {
            points_of(&VerticesToPointsCollection::new(
                single(GeometryKind::LineString, line.clone()),
                location,
            ))
        };
        assert_eq!(run(PointLocation::All).len(), 3);
        assert_eq!(run(PointLocation::Start), [Point::new(0.0, 0.0)]);
        assert_eq!(run(PointLocation::End), [Point::new(4.0, 0.0)]);
        assert_eq!(run(PointLocation::BothEnds).len(), 2);
        assert_eq!(run(PointLocation::Mid), [Point::new(2.0, 0.0)]);
    }

    #[test]
    fn parse_locations() {
        assert_eq!("both_ends".parse::<PointLocation>().unwrap(), PointLocation::BothEnds);
        assert!("corner".parse::<PointLocation>().is_err());
    }
}

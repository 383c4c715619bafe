//! Per-feature shape replacement: envelopes, convex hulls, bounding circles
//! and boundaries.

use geo::{ConvexHull, CoordsIter};
use geo_types::{Coord, Geometry, LineString, MultiLineString, MultiPoint, Point, Polygon};
use geoverlay_core_common::{Feature, GeometryKind, Schema};

use super::cursor::{
    FeatureCollection, FeatureCursor, IdSequence, Produce, SharedCollection, StageCursor, Upstream,
};
use crate::buffer::{BufferBuilder, DEFAULT_QUADRANT_SEGMENTS};
use crate::error::Result;
use crate::kernel;

/// Replacement shape computed for each feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    /// Bounding rectangle as a polygon.
    Envelope,
    /// Convex hull polygon.
    ConvexHull,
    /// Smallest enclosing circle, sampled as a polygon.
    BoundingCircle,
    /// Polygon rings as lines; lines pass through.
    Boundary,
}

impl ShapeKind {
    fn output_kind(self) -> GeometryKind {
        match self {
            Self::Envelope | Self::ConvexHull | Self::BoundingCircle => GeometryKind::Polygon,
            Self::Boundary => GeometryKind::MultiLineString,
        }
    }

    fn apply(self, geometry: &Geometry<f64>) -> Option<Geometry<f64>> {
        match self {
            Self::Envelope => kernel::envelope(geometry).map(|r| Geometry::Polygon(r.to_polygon())),
            Self::ConvexHull => hull(geometry).map(Geometry::Polygon),
            Self::BoundingCircle => {
                let ring = hull(geometry)?;
                let (center, radius) = enclosing_circle(&ring.exterior().0)?;
                (radius > 0.0).then(|| {
                    let sampler = BufferBuilder::planar(DEFAULT_QUADRANT_SEGMENTS);
                    Geometry::Polygon(sampler.circle(center, radius))
                })
            },
            Self::Boundary => boundary(geometry).map(Geometry::MultiLineString),
        }
    }
}

fn hull(geometry: &Geometry<f64>) -> Option<Polygon<f64>> {
    let points: MultiPoint<f64> = geometry
        .coords_iter()
        .map(Point::from)
        .collect::<Vec<_>>()
        .into();
    (!points.0.is_empty()).then(|| points.convex_hull())
}

fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

fn encloses(circle: (Coord<f64>, f64), p: Coord<f64>) -> bool {
    let (center, radius) = circle;
    distance(center, p) <= radius + 1e-9 * radius.max(1.0)
}

fn diametral(a: Coord<f64>, b: Coord<f64>) -> (Coord<f64>, f64) {
    let center = Coord {
        x: (a.x + b.x) / 2.0,
        y: (a.y + b.y) / 2.0,
    };
    (center, distance(a, b) / 2.0)
}

/// Circle through `a`, `b` and `c`; collinear points span their farthest pair.
fn circumcircle(a: Coord<f64>, b: Coord<f64>, c: Coord<f64>) -> (Coord<f64>, f64) {
    let d = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
    if d.abs() < f64::EPSILON {
        return [diametral(a, b), diametral(b, c), diametral(a, c)]
            .into_iter()
            .fold((a, 0.0), |widest, circle| if circle.1 > widest.1 { circle } else { widest });
    }
    let (a2, b2, c2) = (a.x * a.x + a.y * a.y, b.x * b.x + b.y * b.y, c.x * c.x + c.y * c.y);
    let center = Coord {
        x: (a2 * (b.y - c.y) + b2 * (c.y - a.y) + c2 * (a.y - b.y)) / d,
        y: (a2 * (c.x - b.x) + b2 * (a.x - c.x) + c2 * (b.x - a.x)) / d,
    };
    (center, distance(center, a))
}

/// Smallest circle enclosing `points` (Welzl, incremental form).
fn enclosing_circle(points: &[Coord<f64>]) -> Option<(Coord<f64>, f64)> {
    let mut circle = (*points.first()?, 0.0);
    for (i, &p) in points.iter().enumerate() {
        if encloses(circle, p) {
            continue;
        }
        circle = (p, 0.0);
        for (j, &q) in points[..i].iter().enumerate() {
            if encloses(circle, q) {
                continue;
            }
            circle = diametral(p, q);
            for &r in &points[..j] {
                if !encloses(circle, r) {
                    circle = circumcircle(p, q, r);
                }
            }
        }
    }
    Some(circle)
}

fn boundary(geometry: &Geometry<f64>) -> Option<MultiLineString<f64>> {
    if let Some(lines) = kernel::as_multi_line(geometry) {
        return Some(lines);
    }
    let polygons = kernel::as_multi_polygon(geometry)?;
    let rings: Vec<LineString<f64>> = polygons
        .iter()
        .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
        .filter(|ring| ring.0.len() > 1)
        .cloned()
        .collect();
    (!rings.is_empty()).then(|| MultiLineString::new(rings))
}

/// Replaces each feature's geometry by a derived shape.
#[derive(Debug)]
pub struct ShapeCollection {
    source: SharedCollection,
    schema: Schema,
    shape: ShapeKind,
}

impl ShapeCollection {
    /// Creates the stage.
    #[must_use]
    pub fn new(source: SharedCollection, shape: ShapeKind) -> Self {
        let schema = source.schema().clone().with_geometry_kind(shape.output_kind());
        Self {
            source,
            schema,
            shape,
        }
    }

    /// Envelope polygon per feature.
    #[must_use]
    pub fn envelopes(source: SharedCollection) -> Self {
        Self::new(source, ShapeKind::Envelope)
    }

    /// Convex hull per feature.
    #[must_use]
    pub fn convex_hulls(source: SharedCollection) -> Self {
        Self::new(source, ShapeKind::ConvexHull)
    }

    /// Minimum bounding circle per feature.
    #[must_use]
    pub fn bounding_circles(source: SharedCollection) -> Self {
        Self::new(source, ShapeKind::BoundingCircle)
    }

    /// Polygon boundaries as lines.
    #[must_use]
    pub fn to_lines(source: SharedCollection) -> Self {
        Self::new(source, ShapeKind::Boundary)
    }
}

struct Shaping {
    upstream: Upstream,
    shape: ShapeKind,
    ids: IdSequence,
}

impl Produce for Shaping {
    fn produce(&mut self) -> Result<Option<Feature>> {
        while let Some(source) = self.upstream.pull()? {
            let Some(shape) = source.geometry.as_ref().and_then(|g| self.shape.apply(g)) else {
                continue;
            };
            let mut feature = Feature::new(self.ids.next_id(), Some(shape));
            feature.attributes = source.attributes;
            return Ok(Some(feature));
        }
        Ok(None)
    }

    fn release(&mut self) {
        self.upstream.release();
    }
}

impl FeatureCollection for ShapeCollection {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn features(&self) -> Result<Box<dyn FeatureCursor>> {
        Ok(StageCursor::boxed(Shaping {
            upstream: Upstream::new(self.source.features()?),
            shape: self.shape,
            ids: IdSequence::for_schema(&self.schema),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{MemoryCollection, collect};
    use geo_types::{line_string, polygon};
    use geoverlay_core_common::FeatureId;

    fn shapes(kind: GeometryKind, geometries: Vec<Geometry<f64>>) -> SharedCollection {
        let schema = Schema::new("shapes", "geom", kind, None);
        let features = geometries
            .into_iter()
            .enumerate()
            .map(|(i, g)| Feature::new(FeatureId::sequential("shapes", i as u64 + 1), Some(g)))
            .collect();
        MemoryCollection::shared(schema, features)
    }

    #[test]
    fn envelope_of_diagonal_line() {
        let line = Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 2.0, y: 3.0)]);
        let stage = ShapeCollection::envelopes(shapes(GeometryKind::LineString, vec![line]));
        assert_eq!(stage.schema().geometry_kind(), GeometryKind::Polygon);
        let features = collect(&stage).unwrap();
        assert!((kernel::area(features[0].geometry.as_ref().unwrap()) - 6.0).abs() < 1e-12);
    }

    #[test]
    fn convex_hull_fills_concavity() {
        let horseshoe = Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0), (x: 3.0, y: 0.0), (x: 3.0, y: 3.0), (x: 2.0, y: 3.0),
            (x: 2.0, y: 1.0), (x: 1.0, y: 1.0), (x: 1.0, y: 3.0), (x: 0.0, y: 3.0),
        ]);
        let stage = ShapeCollection::convex_hulls(shapes(GeometryKind::Polygon, vec![horseshoe]));
        let features = collect(&stage).unwrap();
        assert!((kernel::area(features[0].geometry.as_ref().unwrap()) - 9.0).abs() < 1e-12);
    }

    #[test]
    fn bounding_circle_of_square_passes_through_corners() {
        let square = Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 2.0), (x: 0.0, y: 2.0),
        ]);
        let stage = ShapeCollection::bounding_circles(shapes(GeometryKind::Polygon, vec![square]));
        assert_eq!(stage.schema().geometry_kind(), GeometryKind::Polygon);
        let features = collect(&stage).unwrap();
        let area = kernel::area(features[0].geometry.as_ref().unwrap());
        let expected = std::f64::consts::PI * 2.0;
        assert!((area - expected).abs() / expected < 0.01);
    }

    #[test]
    fn obtuse_triangle_circle_spans_longest_side() {
        let (center, radius) = enclosing_circle(&[
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 2.0, y: 0.5 },
            Coord { x: 4.0, y: 0.0 },
        ])
        .unwrap();
        assert!((center.x - 2.0).abs() < 1e-12);
        assert!(center.y.abs() < 1e-12);
        assert!((radius - 2.0).abs() < 1e-12);
    }

    #[test]
    fn single_point_has_no_bounding_circle() {
        let point = Geometry::Point(Point::new(1.0, 1.0));
        let stage = ShapeCollection::bounding_circles(shapes(GeometryKind::Point, vec![point]));
        assert!(collect(&stage).unwrap().is_empty());
    }

    #[test]
    fn polygon_boundary_becomes_lines() {
        let square = Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0),
        ]);
        let point = Geometry::Point(Point::new(5.0, 5.0));
        let stage = ShapeCollection::to_lines(shapes(GeometryKind::Any, vec![square, point]));
        let features = collect(&stage).unwrap();
        assert_eq!(features.len(), 1);
        let length = kernel::length(features[0].geometry.as_ref().unwrap(), false);
        assert!((length - 4.0).abs() < 1e-12);
    }
}

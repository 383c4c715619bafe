//! Thin layer over the `geo` kernel used by pipeline stages.
//!
//! Overlay stages work on three shape families: areal (polygon), linear and
//! puntal. Set operations are computed whenever at least one operand is
//! areal; line/line and line/point intersections are not computed and yield
//! an empty result.

use geo::{
    Area, BooleanOps, BoundingRect, Euclidean, Geodesic, HasDimensions, Intersects, Length,
};
use geo_types::{
    Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon, Point,
    Polygon, Rect,
};

/// Returns `true` for a null or empty geometry.
#[must_use]
pub fn is_empty(geometry: Option<&Geometry<f64>>) -> bool {
    geometry.is_none_or(HasDimensions::is_empty)
}

/// Bounding rectangle of a geometry; `None` when empty.
#[must_use]
pub fn envelope(geometry: &Geometry<f64>) -> Option<Rect<f64>> {
    geometry.bounding_rect()
}

/// Areal view of a geometry.
#[must_use]
pub fn as_multi_polygon(geometry: &Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p.clone()])),
        Geometry::MultiPolygon(mp) => Some(mp.clone()),
        Geometry::Rect(r) => Some(MultiPolygon::new(vec![r.to_polygon()])),
        Geometry::Triangle(t) => Some(MultiPolygon::new(vec![t.to_polygon()])),
        Geometry::GeometryCollection(gc) => {
            let polygons: Vec<Polygon<f64>> = gc
                .iter()
                .filter_map(as_multi_polygon)
                .flat_map(|mp| mp.0)
                .collect();
            (!polygons.is_empty()).then(|| MultiPolygon::new(polygons))
        },
        _ => None,
    }
}

/// Linear view of a geometry.
#[must_use]
pub fn as_multi_line(geometry: &Geometry<f64>) -> Option<MultiLineString<f64>> {
    match geometry {
        Geometry::Line(l) => Some(MultiLineString::new(vec![LineString::from(vec![
            l.start, l.end,
        ])])),
        Geometry::LineString(ls) => Some(MultiLineString::new(vec![ls.clone()])),
        Geometry::MultiLineString(mls) => Some(mls.clone()),
        _ => None,
    }
}

/// Puntal view of a geometry.
#[must_use]
pub fn as_multi_point(geometry: &Geometry<f64>) -> Option<MultiPoint<f64>> {
    match geometry {
        Geometry::Point(p) => Some(MultiPoint::new(vec![*p])),
        Geometry::MultiPoint(mp) => Some(mp.clone()),
        _ => None,
    }
}

/// Unions a sequence of areal geometries.
#[must_use]
pub fn union_all(parts: impl IntoIterator<Item = MultiPolygon<f64>>) -> MultiPolygon<f64> {
    parts
        .into_iter()
        .fold(MultiPolygon::new(Vec::new()), |acc, part| {
            if acc.0.is_empty() {
                part
            } else {
                acc.union(&part)
            }
        })
}

/// Collapses single-member collections to their member.
#[must_use]
pub fn simplify_multi(geometry: Geometry<f64>) -> Geometry<f64> {
    match geometry {
        Geometry::MultiPolygon(mut mp) if mp.0.len() == 1 => Geometry::Polygon(mp.0.remove(0)),
        Geometry::MultiLineString(mut mls) if mls.0.len() == 1 => {
            Geometry::LineString(mls.0.remove(0))
        },
        Geometry::MultiPoint(mut mp) if mp.0.len() == 1 => Geometry::Point(mp.0.remove(0)),
        other => other,
    }
}

fn non_empty(geometry: Geometry<f64>) -> Option<Geometry<f64>> {
    (!geometry.is_empty()).then(|| simplify_multi(geometry))
}

fn points_matching(points: &MultiPoint<f64>, other: &Geometry<f64>, keep: bool) -> MultiPoint<f64> {
    points
        .iter()
        .filter(|p| other.intersects(*p) == keep)
        .copied()
        .collect::<Vec<Point<f64>>>()
        .into()
}

/// `geometry` minus the areal `mask`; `None` when nothing remains.
#[must_use]
pub fn difference(geometry: &Geometry<f64>, mask: &MultiPolygon<f64>) -> Option<Geometry<f64>> {
    if mask.0.is_empty() {
        return non_empty(geometry.clone());
    }
    if let Some(areal) = as_multi_polygon(geometry) {
        return non_empty(Geometry::MultiPolygon(areal.difference(mask)));
    }
    if let Some(lines) = as_multi_line(geometry) {
        return non_empty(Geometry::MultiLineString(mask.clip(&lines, true)));
    }
    if let Some(points) = as_multi_point(geometry) {
        let mask = Geometry::MultiPolygon(mask.clone());
        return non_empty(Geometry::MultiPoint(points_matching(&points, &mask, false)));
    }
    non_empty(geometry.clone())
}

/// Intersection of two geometries; `None` when empty or not computed.
#[must_use]
pub fn intersection(a: &Geometry<f64>, b: &Geometry<f64>) -> Option<Geometry<f64>> {
    let result = match (as_multi_polygon(a), as_multi_polygon(b)) {
        (Some(pa), Some(pb)) => Geometry::MultiPolygon(pa.intersection(&pb)),
        (None, Some(pb)) => clip_by(a, &pb)?,
        (Some(pa), None) => clip_by(b, &pa)?,
        (None, None) => {
            if let Some(points) = as_multi_point(a) {
                Geometry::MultiPoint(points_matching(&points, b, true))
            } else if let Some(points) = as_multi_point(b) {
                Geometry::MultiPoint(points_matching(&points, a, true))
            } else {
                return None;
            }
        },
    };
    non_empty(result)
}

fn clip_by(geometry: &Geometry<f64>, areal: &MultiPolygon<f64>) -> Option<Geometry<f64>> {
    if let Some(lines) = as_multi_line(geometry) {
        return Some(Geometry::MultiLineString(areal.clip(&lines, false)));
    }
    as_multi_point(geometry).map(|points| {
        let areal = Geometry::MultiPolygon(areal.clone());
        Geometry::MultiPoint(points_matching(&points, &areal, true))
    })
}

/// Unsigned planar area in CRS units squared.
#[must_use]
pub fn area(geometry: &Geometry<f64>) -> f64 {
    as_multi_polygon(geometry).map_or(0.0, |mp| mp.unsigned_area())
}

/// Length of a linear geometry, or perimeter of an areal one.
///
/// With `geodesic` the result is in meters along the WGS84 ellipsoid,
/// otherwise in CRS units.
#[must_use]
pub fn length(geometry: &Geometry<f64>, geodesic: bool) -> f64 {
    let measure = |ls: &LineString<f64>| {
        if geodesic {
            ls.length::<Geodesic>()
        } else {
            ls.length::<Euclidean>()
        }
    };
    if let Some(lines) = as_multi_line(geometry) {
        return lines.iter().map(measure).sum();
    }
    if let Some(areal) = as_multi_polygon(geometry) {
        return areal
            .iter()
            .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
            .map(measure)
            .sum();
    }
    match geometry {
        Geometry::GeometryCollection(GeometryCollection(members)) => {
            members.iter().map(|g| length(g, geodesic)).sum()
        },
        _ => 0.0,
    }
}

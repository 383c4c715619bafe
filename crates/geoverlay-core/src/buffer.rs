//! Planar and geodetic buffer construction.
//!
//! Both modes build buffers the same way: a sampled circle around every
//! vertex, the convex hull of consecutive circles along each segment, and the
//! union of all pieces (plus the source polygon for areal input). They differ
//! only in how a circle is sampled. Planar circles are Euclidean in CRS units;
//! geodetic circles project each sample along a geodesic with
//! [`geo::Geodesic`], so the distance is in meters on the WGS84 ellipsoid and
//! stays correct in degree-based coordinates.
//!
//! A zero distance produces an empty result in both modes.

use geo::{BooleanOps, ConvexHull, Destination, Geodesic};
use geo_types::{Coord, Geometry, LineString, MultiPoint, MultiPolygon, Point, Polygon};

use crate::error::{Result, invalid_parameter};
use crate::kernel::{as_multi_line, as_multi_point, as_multi_polygon, union_all};

/// Quadrant segments used when none (or zero) is given.
pub const DEFAULT_QUADRANT_SEGMENTS: u32 = 24;

/// How buffer circles are sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    /// Euclidean circles in CRS units.
    Planar,
    /// Geodesic circles, distance in meters.
    Geodetic,
}

/// Builds buffer polygons around geometries.
#[derive(Debug, Clone, Copy)]
pub struct BufferBuilder {
    mode: BufferMode,
    quadrant_segments: u32,
}

impl BufferBuilder {
    /// Planar builder; distances are in CRS units.
    #[must_use]
    pub fn planar(quadrant_segments: u32) -> Self {
        Self::new(BufferMode::Planar, quadrant_segments)
    }

    /// Geodetic builder; distances are in meters.
    #[must_use]
    pub fn geodetic(quadrant_segments: u32) -> Self {
        Self::new(BufferMode::Geodetic, quadrant_segments)
    }

    /// Builder for `mode`; a zero segment count falls back to
    /// [`DEFAULT_QUADRANT_SEGMENTS`].
    #[must_use]
    pub fn new(mode: BufferMode, quadrant_segments: u32) -> Self {
        let quadrant_segments = if quadrant_segments == 0 {
            DEFAULT_QUADRANT_SEGMENTS
        } else {
            quadrant_segments
        };
        Self {
            mode,
            quadrant_segments,
        }
    }

    /// Sampling mode.
    #[must_use]
    pub fn mode(&self) -> BufferMode {
        self.mode
    }

    /// Number of vertices of a full buffer circle.
    #[must_use]
    pub fn circle_vertices(&self) -> usize {
        4 * self.quadrant_segments as usize
    }

    /// Buffers `geometry` by `distance`.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::InvalidParameter`](crate::error::GeometryError)
    /// for a non-finite distance, or a negative one in geodetic mode.
    pub fn buffer(&self, geometry: &Geometry<f64>, distance: f64) -> Result<MultiPolygon<f64>> {
        if !distance.is_finite() {
            return Err(invalid_parameter("distance", format!("{distance} is not finite")));
        }
        if distance == 0.0 {
            return Ok(MultiPolygon::new(Vec::new()));
        }
        if distance < 0.0 {
            if self.mode == BufferMode::Geodetic {
                return Err(invalid_parameter(
                    "distance",
                    format!("geodetic buffer distance must be non-negative, got {distance}"),
                ));
            }
            return Ok(self.shrink(geometry, -distance));
        }
        Ok(self.expand(geometry, distance))
    }

    fn expand(&self, geometry: &Geometry<f64>, distance: f64) -> MultiPolygon<f64> {
        if let Some(points) = as_multi_point(geometry) {
            return union_all(
                points
                    .iter()
                    .map(|p| MultiPolygon::new(vec![self.circle(p.0, distance)])),
            );
        }
        if let Some(lines) = as_multi_line(geometry) {
            return union_all(lines.iter().map(|ls| self.line_buffer(ls, distance)));
        }
        if let Some(areal) = as_multi_polygon(geometry) {
            let rings = areal
                .iter()
                .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
                .map(|ring| self.line_buffer(ring, distance));
            return union_all(std::iter::once(areal.clone()).chain(rings));
        }
        match geometry {
            Geometry::GeometryCollection(gc) => {
                union_all(gc.iter().map(|member| self.expand(member, distance)))
            },
            _ => MultiPolygon::new(Vec::new()),
        }
    }

    fn shrink(&self, geometry: &Geometry<f64>, distance: f64) -> MultiPolygon<f64> {
        let Some(areal) = as_multi_polygon(geometry) else {
            return MultiPolygon::new(Vec::new());
        };
        let boundary = union_all(
            areal
                .iter()
                .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
                .map(|ring| self.line_buffer(ring, distance)),
        );
        areal.difference(&boundary)
    }

    fn line_buffer(&self, line: &LineString<f64>, distance: f64) -> MultiPolygon<f64> {
        let circles: Vec<Polygon<f64>> = line
            .coords()
            .map(|c| self.circle(*c, distance))
            .collect();
        if circles.len() == 1 {
            return MultiPolygon::new(circles);
        }
        union_all(circles.windows(2).map(|pair| {
            let hull_points: MultiPoint<f64> = pair[0]
                .exterior()
                .points()
                .chain(pair[1].exterior().points())
                .collect::<Vec<Point<f64>>>()
                .into();
            MultiPolygon::new(vec![hull_points.convex_hull()])
        }))
    }

    /// Samples a closed counter-clockwise circle of `distance` around `center`.
    pub(crate) fn circle(&self, center: Coord<f64>, distance: f64) -> Polygon<f64> {
        let n = self.circle_vertices();
        let step = 360.0 / n as f64;
        let mut coords: Vec<Coord<f64>> = (0..n)
            .rev()
            .map(|i| {
                let bearing = step * i as f64;
                match self.mode {
                    BufferMode::Planar => {
                        let theta = bearing.to_radians();
                        Coord {
                            x: center.x + distance * theta.sin(),
                            y: center.y + distance * theta.cos(),
                        }
                    },
                    BufferMode::Geodetic => {
                        Geodesic::destination(Point::from(center), bearing, distance).0
                    },
                }
            })
            .collect();
        coords.push(coords[0]);
        Polygon::new(LineString::new(coords), Vec::new())
    }
}

/// Geodesic buffer builder taking distances in meters.
///
/// Works in degree-based coordinates; each buffer circle has
/// `4 × quadrant_segments` vertices projected along geodesics.
#[derive(Debug, Clone, Copy)]
pub struct GeodeticBuilder(BufferBuilder);

impl GeodeticBuilder {
    /// Creates a builder; zero segments falls back to the default.
    #[must_use]
    pub fn new(quadrant_segments: u32) -> Self {
        Self(BufferBuilder::geodetic(quadrant_segments))
    }

    /// Buffers `geometry` by `meters`.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::InvalidParameter`](crate::error::GeometryError)
    /// for a negative or non-finite distance.
    pub fn buffer(&self, geometry: &Geometry<f64>, meters: f64) -> Result<MultiPolygon<f64>> {
        self.0.buffer(geometry, meters)
    }
}

//! Coordinate reference system resolution.
//!
//! Decides whether two CRS are practically equal, whether a CRS is geographic,
//! which linear unit it measures distances in, and reprojects geometries
//! between any two systems `proj4rs` can resolve.

use std::fmt;
use std::sync::Arc;

use geo::MapCoords;
use geo_types::{Coord, Geometry};
use geoverlay_core_common::Crs;
use log::debug;
use proj4rs::Proj;

use crate::error::{CrsError, Result};
use crate::units::DistanceUnit;

const GEOGRAPHIC_EPSG: &[u32] = &[
    4019, 4167, 4171, 4230, 4258, 4269, 4277, 4283, 4326, 4612, 4617, 4674, 4737,
];

const US_SURVEY_FOOT_EPSG: &[u32] = &[
    2227, 2228, 2229, 2230, 2231, 2232, 2263, 2272, 2276, 2277, 2278, 2868, 3435, 6420,
];

const FOOT_EPSG: &[u32] = &[2222, 2223, 2224, 2225, 2226];

/// EPSG code of a CRS, taken from the descriptor or from the last
/// `AUTHORITY["EPSG","..."]` clause of its WKT.
#[must_use]
pub fn epsg_code(crs: &Crs) -> Option<u32> {
    crs.epsg().or_else(|| crs.wkt().and_then(wkt_authority_code))
}

fn wkt_authority_code(wkt: &str) -> Option<u32> {
    let compact: String = wkt.chars().filter(|c| !c.is_whitespace()).collect();
    let upper = compact.to_ascii_uppercase();
    let start = upper.rfind("AUTHORITY[\"EPSG\",\"")? + "AUTHORITY[\"EPSG\",\"".len();
    upper[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .ok()
}

/// Uppercased WKT with whitespace and `AUTHORITY[...]` clauses removed.
fn normalize_wkt(wkt: &str) -> String {
    let compact: String = wkt
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();

    let mut out = String::with_capacity(compact.len());
    let mut rest = compact.as_str();
    while let Some(idx) = rest.find("AUTHORITY[") {
        out.push_str(rest[..idx].trim_end_matches(','));
        let mut depth = 0usize;
        let mut end = rest.len();
        for (offset, ch) in rest[idx..].char_indices() {
            match ch {
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        end = idx + offset + 1;
                        break;
                    }
                },
                _ => {},
            }
        }
        rest = &rest[end..];
    }
    out.push_str(rest);
    out
}

/// Practical equality of two CRS, ignoring metadata.
///
/// A missing CRS on either side is treated as equal: there is nothing to
/// reproject from or to.
#[must_use]
pub fn same_crs(a: Option<&Crs>, b: Option<&Crs>) -> bool {
    let (Some(a), Some(b)) = (a, b) else {
        return true;
    };
    if let (Some(x), Some(y)) = (epsg_code(a), epsg_code(b)) {
        return x == y;
    }
    match (a.wkt(), b.wkt()) {
        (Some(x), Some(y)) => normalize_wkt(x) == normalize_wkt(y),
        _ => false,
    }
}

/// Returns `true` for degree-based geographic systems.
#[must_use]
pub fn is_geographic(crs: &Crs) -> bool {
    if let Some(code) = epsg_code(crs) {
        return GEOGRAPHIC_EPSG.contains(&code);
    }
    crs.wkt().is_some_and(|wkt| {
        let upper = wkt.trim_start().to_ascii_uppercase();
        upper.starts_with("GEOGCS") || upper.starts_with("GEOGCRS")
    })
}

/// Native linear unit of a CRS.
///
/// Geographic systems measure in degrees; projected systems default to
/// meters unless the EPSG table or the WKT says otherwise. An unknown CRS
/// resolves to [`DistanceUnit::Default`].
#[must_use]
pub fn resolve_linear_unit(crs: Option<&Crs>) -> DistanceUnit {
    let Some(crs) = crs else {
        return DistanceUnit::Default;
    };
    if is_geographic(crs) {
        return DistanceUnit::Degree;
    }
    if let Some(code) = epsg_code(crs) {
        if US_SURVEY_FOOT_EPSG.contains(&code) {
            return DistanceUnit::UsSurveyFoot;
        }
        if FOOT_EPSG.contains(&code) {
            return DistanceUnit::Foot;
        }
    }
    if let Some(wkt) = crs.wkt() {
        let upper = normalize_wkt(wkt);
        if upper.contains("UNIT[\"USSURVEYFOOT\"") || upper.contains("UNIT[\"FOOT_US\"") {
            return DistanceUnit::UsSurveyFoot;
        }
        if upper.contains("UNIT[\"FOOT\"") || upper.contains("UNIT[\"INTERNATIONALFOOT\"") {
            return DistanceUnit::Foot;
        }
    }
    DistanceUnit::Meter
}

/// Resolves coordinate transformations between reference systems.
pub trait Reprojector: fmt::Debug {
    /// Prepares the transformation from `from` into `to`.
    ///
    /// # Errors
    ///
    /// Returns [`CrsError::UnsupportedTransform`] when either system cannot
    /// be resolved.
    fn transformation(&self, from: &Crs, to: &Crs) -> Result<Arc<dyn Transformation>>;
}

/// A prepared transformation between two reference systems.
pub trait Transformation: fmt::Debug {
    /// Transforms every coordinate of `geometry`.
    ///
    /// # Errors
    ///
    /// Returns [`CrsError::OutOfDomain`] for a coordinate the transformation
    /// cannot map.
    fn apply(&self, geometry: &Geometry<f64>) -> Result<Geometry<f64>>;
}

/// Transformation between practically equal systems.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Transformation for Identity {
    fn apply(&self, geometry: &Geometry<f64>) -> Result<Geometry<f64>> {
        Ok(geometry.clone())
    }
}

/// [`Reprojector`] backed by `proj4rs`, resolving systems by EPSG code.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjReprojector;

fn resolve_proj(crs: &Crs) -> Option<Proj> {
    let code = match epsg_code(crs)? {
        900_913 => 3857,
        code => code,
    };
    let code = u16::try_from(code).ok()?;
    match Proj::from_epsg_code(code) {
        Ok(proj) => Some(proj),
        Err(e) => {
            debug!("EPSG:{code} cannot be resolved: {e}");
            None
        },
    }
}

impl Reprojector for ProjReprojector {
    fn transformation(&self, from: &Crs, to: &Crs) -> Result<Arc<dyn Transformation>> {
        if same_crs(Some(from), Some(to)) {
            return Ok(Arc::new(Identity));
        }
        let unsupported = || CrsError::UnsupportedTransform {
            from: from.identifier(),
            to: to.identifier(),
        };
        let source = resolve_proj(from).ok_or_else(unsupported)?;
        let target = resolve_proj(to).ok_or_else(unsupported)?;
        Ok(Arc::new(ProjTransformation {
            source,
            target,
            from: from.identifier(),
            to: to.identifier(),
        }))
    }
}

/// Coordinate transformation between two resolved `proj4rs` systems.
///
/// Geographic systems take and return degrees; `proj4rs` works in radians.
struct ProjTransformation {
    source: Proj,
    target: Proj,
    from: String,
    to: String,
}

impl fmt::Debug for ProjTransformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjTransformation")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}

impl ProjTransformation {
    fn coord(&self, c: Coord<f64>) -> std::result::Result<Coord<f64>, CrsError> {
        let mut point = if self.source.is_latlong() {
            (c.x.to_radians(), c.y.to_radians(), 0.0)
        } else {
            (c.x, c.y, 0.0)
        };
        proj4rs::transform::transform(&self.source, &self.target, &mut point).map_err(|e| {
            debug!("Transform {} -> {} failed: {e}", self.from, self.to);
            CrsError::OutOfDomain {
                x: c.x,
                y: c.y,
                crs: self.from.clone(),
            }
        })?;
        let (x, y, _) = point;
        if !x.is_finite() || !y.is_finite() {
            return Err(CrsError::OutOfDomain {
                x: c.x,
                y: c.y,
                crs: self.from.clone(),
            });
        }
        if self.target.is_latlong() {
            Ok(Coord {
                x: x.to_degrees(),
                y: y.to_degrees(),
            })
        } else {
            Ok(Coord { x, y })
        }
    }
}

impl Transformation for ProjTransformation {
    fn apply(&self, geometry: &Geometry<f64>) -> Result<Geometry<f64>> {
        Ok(geometry.try_map_coords(|c| self.coord(c))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::Point;

    const WGS84_WKT: &str = r#"GEOGCS["WGS 84",
        DATUM["WGS_1984", SPHEROID["WGS 84",6378137,298.257223563, AUTHORITY["EPSG","7030"]],
            AUTHORITY["EPSG","6326"]],
        PRIMEM["Greenwich",0], UNIT["degree",0.0174532925199433],
        AUTHORITY["EPSG","4326"]]"#;

    #[test]
    fn wkt_and_epsg_compare_equal() {
        let wkt = Crs::from_wkt(WGS84_WKT);
        assert!(same_crs(Some(&wkt), Some(&Crs::wgs84())));
        assert!(!same_crs(Some(&wkt), Some(&Crs::web_mercator())));
    }

    #[test]
    fn wkt_metadata_is_ignored() {
        let a = Crs::from_wkt(r#"GEOGCS["x", DATUM["D", SPHEROID["S",1,2]], UNIT["degree",1]]"#);
        let b = Crs::from_wkt(
            r#"GEOGCS["x",DATUM["D",SPHEROID["S",1,2],AUTHORITY["X","1"]],UNIT["degree",1]]"#,
        );
        assert!(same_crs(Some(&a), Some(&b)));
    }

    #[test]
    fn missing_crs_is_same() {
        assert!(same_crs(None, Some(&Crs::wgs84())));
    }

    #[test]
    fn geographic_detection() {
        assert!(is_geographic(&Crs::wgs84()));
        assert!(is_geographic(&Crs::from_wkt(WGS84_WKT)));
        assert!(!is_geographic(&Crs::web_mercator()));
    }

    #[test]
    fn linear_units() {
        assert_eq!(resolve_linear_unit(Some(&Crs::wgs84())), DistanceUnit::Degree);
        assert_eq!(resolve_linear_unit(Some(&Crs::web_mercator())), DistanceUnit::Meter);
        assert_eq!(resolve_linear_unit(Some(&Crs::from_epsg(2263))), DistanceUnit::UsSurveyFoot);
        assert_eq!(resolve_linear_unit(None), DistanceUnit::Default);
    }

    fn point_of(geometry: Geometry<f64>) -> Point<f64> {
        let Geometry::Point(p) = geometry else {
            panic!("expected point")
        };
        p
    }

    #[test]
    fn mercator_round_trip() {
        let forward = ProjReprojector
            .transformation(&Crs::wgs84(), &Crs::web_mercator())
            .unwrap();
        let p = point_of(forward.apply(&Geometry::Point(Point::new(12.45, 41.90))).unwrap());
        assert!((p.x() - 1_385_945.0).abs() < 100.0);

        let back = ProjReprojector
            .transformation(&Crs::web_mercator(), &Crs::wgs84())
            .unwrap();
        let b = point_of(back.apply(&Geometry::Point(p)).unwrap());
        assert!((b.x() - 12.45).abs() < 1e-7);
        assert!((b.y() - 41.90).abs() < 1e-7);
    }

    #[test]
    fn utm_zone_is_resolved() {
        let utm = ProjReprojector
            .transformation(&Crs::wgs84(), &Crs::from_epsg(32633))
            .unwrap();
        // Central meridian of zone 33N maps to the false easting.
        let p = point_of(utm.apply(&Geometry::Point(Point::new(15.0, 0.0))).unwrap());
        assert!((p.x() - 500_000.0).abs() < 1e-3);
        assert!(p.y().abs() < 1e-3);
    }

    #[test]
    fn equal_systems_need_no_transform() {
        let identity = ProjReprojector
            .transformation(&Crs::wgs84(), &Crs::from_wkt(WGS84_WKT))
            .unwrap();
        let p = point_of(identity.apply(&Geometry::Point(Point::new(1.0, 2.0))).unwrap());
        assert_eq!(p, Point::new(1.0, 2.0));
    }

    #[test]
    fn unresolvable_system_is_unsupported() {
        let custom = Crs::from_wkt(r#"PROJCS["local grid", UNIT["metre",1]]"#);
        let err = ProjReprojector
            .transformation(&Crs::wgs84(), &custom)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::GeoverlayError::Crs(CrsError::UnsupportedTransform { .. })
        ));
    }
}

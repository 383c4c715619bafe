//! Index-accelerated overlay stages and their compositions.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use geo::Intersects;
use geo_types::Geometry;
use geoverlay_core_common::{Feature, FieldUnionPolicy, GeometryKind, Schema};
use log::{debug, warn};

use super::cursor::{
    FeatureCollection, FeatureCursor, IdSequence, Produce, SharedCollection, StageCursor, Upstream,
};
use super::merge::{MergeCollection, RenameCollection, remap};
use super::reproject::align;
use super::require_kind;
use crate::error::Result;
use crate::index::SpatialIndex;
use crate::kernel;

/// Geometries of the indexed features whose envelope overlaps `geometry`
/// and which exactly intersect it, in index order.
fn intersecting<'a>(
    index: &'a SpatialIndex,
    geometry: &'a Geometry<f64>,
) -> impl Iterator<Item = &'a Feature> + 'a {
    index
        .candidates(geometry)
        .into_iter()
        .filter_map(|id| index.get(id))
        .filter(|candidate| {
            candidate
                .geometry
                .as_ref()
                .is_some_and(|g| g.intersects(geometry))
        })
}

/// Input features minus the union of the intersecting areal erase features.
///
/// Features that end up empty are skipped; the geometry kind widens to its
/// multi-part form.
#[derive(Debug)]
pub struct DifferenceCollection {
    input: SharedCollection,
    erase: SharedCollection,
    schema: Schema,
}

impl DifferenceCollection {
    /// Creates the stage, reprojecting `erase` into the CRS of `input`.
    ///
    /// # Errors
    ///
    /// Returns a CRS error when `erase` cannot be reprojected.
    pub fn new(input: SharedCollection, erase: SharedCollection) -> Result<Self> {
        let erase = align(input.schema(), erase)?;
        let schema = input
            .schema()
            .clone()
            .with_geometry_kind(input.schema().geometry_kind().multi_part());
        Ok(Self {
            input,
            erase,
            schema,
        })
    }
}

struct Differencing {
    upstream: Upstream,
    index: SpatialIndex,
    ids: IdSequence,
}

impl Produce for Differencing {
    fn produce(&mut self) -> Result<Option<Feature>> {
        while let Some(source) = self.upstream.pull()? {
            let Some(geometry) = source.geometry.as_ref().filter(|g| !kernel::is_empty(Some(*g)))
            else {
                continue;
            };
            let mask = kernel::union_all(
                intersecting(&self.index, geometry)
                    .filter_map(|f| f.geometry.as_ref().and_then(kernel::as_multi_polygon)),
            );
            let Some(remaining) = kernel::difference(geometry, &mask) else {
                continue;
            };
            let mut feature = Feature::new(self.ids.next_id(), Some(remaining));
            feature.attributes = source.attributes;
            return Ok(Some(feature));
        }
        Ok(None)
    }

    fn release(&mut self) {
        self.upstream.release();
    }
}

impl FeatureCollection for DifferenceCollection {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn features(&self) -> Result<Box<dyn FeatureCursor>> {
        let index = SpatialIndex::from_collection(self.erase.as_ref())?;
        Ok(StageCursor::boxed(Differencing {
            upstream: Upstream::new(self.input.features()?),
            index,
            ids: IdSequence::for_schema(&self.schema),
        }))
    }
}

/// Geometry kind of the intersection of two kinds.
#[must_use]
pub fn intersection_kind(a: GeometryKind, b: GeometryKind) -> GeometryKind {
    if a.is_point() || b.is_point() {
        GeometryKind::MultiPoint
    } else if a == GeometryKind::Any || b == GeometryKind::Any {
        GeometryKind::Any
    } else if a.is_line() || b.is_line() {
        GeometryKind::MultiLineString
    } else {
        GeometryKind::MultiPolygon
    }
}

/// One feature per intersecting (input, overlay) pair.
///
/// Attributes of the input come first, then the overlay attributes under
/// the disjoint field union (colliding names are suffixed).
#[derive(Debug)]
pub struct IntersectCollection {
    input: SharedCollection,
    overlay: SharedCollection,
    schema: Schema,
    overlay_mapping: HashMap<String, String>,
}

impl IntersectCollection {
    /// Creates the stage, reprojecting `overlay` into the CRS of `input`.
    ///
    /// # Errors
    ///
    /// Returns a CRS error when `overlay` cannot be reprojected.
    pub fn new(input: SharedCollection, overlay: SharedCollection) -> Result<Self> {
        let overlay = align(input.schema(), overlay)?;
        let (a, b) = (input.schema().geometry_kind(), overlay.schema().geometry_kind());
        if a.is_line() && b.is_line() {
            warn!("Line/line intersections are not computed; the result will be empty");
        }
        let (schema, mapping) = input
            .schema()
            .union(overlay.schema(), FieldUnionPolicy::Disjoint);
        Ok(Self {
            input,
            overlay,
            schema: schema.with_geometry_kind(intersection_kind(a, b)),
            overlay_mapping: mapping.into_iter().collect(),
        })
    }
}

struct Intersecting {
    upstream: Upstream,
    index: SpatialIndex,
    schema: Schema,
    overlay_mapping: HashMap<String, String>,
    ids: IdSequence,
    pending: VecDeque<Feature>,
}

impl Intersecting {
    fn pair(&mut self, source: &Feature, geometry: &Geometry<f64>) {
        for other in intersecting(&self.index, geometry) {
            let Some(other_geometry) = other.geometry.as_ref() else {
                continue;
            };
            let Some(shared) = kernel::intersection(geometry, other_geometry) else {
                continue;
            };
            let mut attributes = remap(source.attributes.clone(), &self.schema, None);
            for (name, value) in &other.attributes {
                if let Some(target) = self.overlay_mapping.get(name) {
                    attributes.insert(target.clone(), value.clone());
                }
            }
            let mut feature = Feature::new(self.ids.next_id(), Some(shared));
            feature.attributes = attributes;
            self.pending.push_back(feature);
        }
    }
}

impl Produce for Intersecting {
    fn produce(&mut self) -> Result<Option<Feature>> {
        loop {
            if let Some(feature) = self.pending.pop_front() {
                return Ok(Some(feature));
            }
            let Some(source) = self.upstream.pull()? else {
                return Ok(None);
            };
            if let Some(geometry) = source.geometry.clone().filter(|g| !kernel::is_empty(Some(g))) {
                self.pair(&source, &geometry);
            }
        }
    }

    fn release(&mut self) {
        self.pending.clear();
        self.upstream.release();
    }
}

impl FeatureCollection for IntersectCollection {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn features(&self) -> Result<Box<dyn FeatureCursor>> {
        let index = SpatialIndex::from_collection(self.overlay.as_ref())?;
        Ok(StageCursor::boxed(Intersecting {
            upstream: Upstream::new(self.input.features()?),
            index,
            schema: self.schema.clone(),
            overlay_mapping: self.overlay_mapping.clone(),
            ids: IdSequence::for_schema(&self.schema),
            pending: VecDeque::new(),
        }))
    }
}

/// Polygon union: shared regions carry both attribute sets, regions covered
/// by one side carry that side's attributes.
///
/// Composed as `Merge(Merge(Intersect(A, B), Difference(A, B)), Difference(B, A))`.
///
/// # Errors
///
/// Returns a geometry-kind error unless both inputs are polygon collections,
/// or a CRS error when `overlay` cannot be reprojected.
pub fn union(input: SharedCollection, overlay: SharedCollection) -> Result<SharedCollection> {
    require_kind("inputFeatures", input.schema(), "polygon", GeometryKind::is_polygon)?;
    require_kind("overlayFeatures", overlay.schema(), "polygon", GeometryKind::is_polygon)?;
    let overlay = align(input.schema(), overlay)?;
    debug!(
        "Union of '{}' and '{}'",
        input.schema().type_name(),
        overlay.schema().type_name()
    );

    let shared = IntersectCollection::new(Arc::clone(&input), Arc::clone(&overlay))?;
    let input_only = DifferenceCollection::new(Arc::clone(&input), Arc::clone(&overlay))?;
    let overlay_only = DifferenceCollection::new(Arc::clone(&overlay), Arc::clone(&input))?;

    // overlay-only regions use the overlay columns of the intersection
    let (_, mapping) = input
        .schema()
        .union(overlay.schema(), FieldUnionPolicy::Disjoint);
    let overlay_only = RenameCollection::new(Arc::new(overlay_only), mapping)?;

    let first = MergeCollection::new(Arc::new(shared), Arc::new(input_only))?;
    Ok(Arc::new(MergeCollection::new(
        Arc::new(first),
        Arc::new(overlay_only),
    )?))
}

/// Polygon update: `input` with the `update` polygons cut out, followed by
/// every `update` feature unchanged.
///
/// # Errors
///
/// Returns a geometry-kind error unless both inputs are polygon collections,
/// or a CRS error when `update` cannot be reprojected.
pub fn update(input: SharedCollection, update: SharedCollection) -> Result<SharedCollection> {
    require_kind("inputFeatures", input.schema(), "polygon", GeometryKind::is_polygon)?;
    require_kind("updateFeatures", update.schema(), "polygon", GeometryKind::is_polygon)?;
    let update = align(input.schema(), update)?;

    let remaining = DifferenceCollection::new(Arc::clone(&input), Arc::clone(&update))?;
    Ok(Arc::new(MergeCollection::new(Arc::new(remaining), update)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{MemoryCollection, collect};
    use geo_types::{Point, line_string, polygon};
    use geoverlay_core_common::{FeatureId, Field, FieldKind, Value};

    fn square(x0: f64, y0: f64, size: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
        ])
    }

    fn zones(name: &str, geometries: Vec<Geometry<f64>>) -> SharedCollection {
        let schema = Schema::new(name, "geom", GeometryKind::Polygon, None)
            .with_field(Field::new("zone", FieldKind::Text))
            .unwrap();
        let features = geometries
            .into_iter()
            .enumerate()
            .map(|(i, g)| {
                Feature::new(FeatureId::sequential(name, i as u64 + 1), Some(g))
                    .with_attribute("zone", format!("{name}{}", i + 1))
            })
            .collect();
        MemoryCollection::shared(schema, features)
    }

    #[test]
    fn difference_cuts_overlap_and_drops_covered() {
        let input = zones("a", vec![square(0.0, 0.0, 1.0), square(0.6, 0.6, 0.2)]);
        let erase = zones("b", vec![square(0.5, 0.5, 1.0)]);
        let stage = DifferenceCollection::new(input, erase).unwrap();
        assert_eq!(stage.schema().geometry_kind(), GeometryKind::MultiPolygon);

        let features = collect(&stage).unwrap();
        assert_eq!(features.len(), 1);
        assert!((kernel::area(features[0].geometry.as_ref().unwrap()) - 0.75).abs() < 1e-9);
        assert_eq!(features[0].get("zone"), Some(&Value::from("a1")));
    }

    #[test]
    fn difference_without_candidates_keeps_geometry() {
        let input = zones("a", vec![square(0.0, 0.0, 1.0)]);
        let erase = zones("b", vec![square(5.0, 5.0, 1.0)]);
        let features = collect(&DifferenceCollection::new(input, erase).unwrap()).unwrap();
        assert_eq!(features.len(), 1);
        assert!((kernel::area(features[0].geometry.as_ref().unwrap()) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn intersect_carries_both_attribute_sets() {
        let input = zones("a", vec![square(0.0, 0.0, 1.0)]);
        let overlay = zones("b", vec![square(0.5, 0.5, 1.0), square(3.0, 3.0, 1.0)]);
        let stage = IntersectCollection::new(input, overlay).unwrap();
        assert!(stage.schema().contains("zone_1"));

        let features = collect(&stage).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].get("zone"), Some(&Value::from("a1")));
        assert_eq!(features[0].get("zone_1"), Some(&Value::from("b1")));
        assert!((kernel::area(features[0].geometry.as_ref().unwrap()) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn intersect_clips_lines() {
        let schema = Schema::new("roads", "geom", GeometryKind::LineString, None);
        let roads = MemoryCollection::shared(
            schema,
            vec![Feature::new(
                FeatureId::new("roads.1"),
                Some(Geometry::LineString(line_string![(x: -1.0, y: 0.5), (x: 3.0, y: 0.5)])),
            )],
        );
        let stage =
            IntersectCollection::new(roads, zones("b", vec![square(0.0, 0.0, 1.0)])).unwrap();
        assert_eq!(stage.schema().geometry_kind(), GeometryKind::MultiLineString);
        let features = collect(&stage).unwrap();
        assert!((kernel::length(features[0].geometry.as_ref().unwrap(), false) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn union_rejects_points() {
        let schema = Schema::new("pts", "geom", GeometryKind::Point, None);
        let points = MemoryCollection::shared(
            schema,
            vec![Feature::new(
                FeatureId::new("pts.1"),
                Some(Geometry::Point(Point::new(0.0, 0.0))),
            )],
        );
        let err = union(points, zones("b", vec![square(0.0, 0.0, 1.0)])).unwrap_err();
        assert!(err.to_string().contains("inputFeatures"));
    }

    #[test]
    fn update_keeps_update_features() {
        let input = zones("a", vec![square(0.0, 0.0, 1.0)]);
        let patch = zones("b", vec![square(0.5, 0.5, 1.0)]);
        let features = collect(update(input, patch).unwrap().as_ref()).unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[1].geometry, Some(square(0.5, 0.5, 1.0)));
        assert_eq!(features[1].get("zone"), Some(&Value::from("b1")));
    }
}

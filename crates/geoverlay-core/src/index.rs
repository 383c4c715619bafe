//! R-tree snapshot of a feature collection used by join stages.

use geo::{Distance, Euclidean};
use geo_types::{Geometry, Rect};
use geoverlay_core_common::Feature;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{AABB, RTree};

use crate::error::Result;
use crate::kernel;
use crate::pipeline::{FeatureCollection, FeatureCursor, pull};

type Entry = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Materialized features and their envelopes, read-only after
/// [`SpatialIndex::build`].
///
/// Candidate queries return a superset of the features that actually
/// intersect; callers refine with exact predicates.
#[derive(Debug)]
pub struct SpatialIndex {
    features: Vec<Feature>,
    tree: RTree<Entry>,
}

fn corners(rect: &Rect<f64>) -> ([f64; 2], [f64; 2]) {
    (
        [rect.min().x, rect.min().y],
        [rect.max().x, rect.max().y],
    )
}

impl SpatialIndex {
    /// Drains `cursor` into a new index.
    ///
    /// Features with a null or empty geometry are not indexed.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by the cursor.
    pub fn build(cursor: &mut dyn FeatureCursor) -> Result<Self> {
        let mut features = Vec::new();
        let mut entries = Vec::new();
        while let Some(feature) = pull(cursor)? {
            if kernel::is_empty(feature.geometry.as_ref()) {
                continue;
            }
            let Some(rect) = feature.geometry.as_ref().and_then(kernel::envelope) else {
                continue;
            };
            let (min, max) = corners(&rect);
            entries.push(GeomWithData::new(
                Rectangle::from_corners(min, max),
                features.len(),
            ));
            features.push(feature);
        }
        log::debug!("Indexed {} feature(s)", features.len());
        Ok(Self {
            features,
            tree: RTree::bulk_load(entries),
        })
    }

    /// Opens `collection`, indexes it and closes the cursor.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while opening or reading.
    pub fn from_collection(collection: &dyn FeatureCollection) -> Result<Self> {
        let mut cursor = collection.features()?;
        let index = Self::build(cursor.as_mut());
        cursor.close();
        index
    }

    /// Ids of features whose envelope intersects `envelope`, in ascending
    /// order.
    #[must_use]
    pub fn query(&self, envelope: &Rect<f64>) -> Vec<usize> {
        let (min, max) = corners(envelope);
        let mut ids: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&AABB::from_corners(min, max))
            .map(|entry| entry.data)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Candidates for `geometry`; empty for an empty geometry.
    #[must_use]
    pub fn candidates(&self, geometry: &Geometry<f64>) -> Vec<usize> {
        kernel::envelope(geometry).map_or_else(Vec::new, |rect| self.query(&rect))
    }

    /// Indexed feature by id.
    #[must_use]
    pub fn get(&self, id: usize) -> Option<&Feature> {
        self.features.get(id)
    }

    /// Number of indexed features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns `true` when nothing was indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Closest indexed feature to `geometry` and its planar distance.
    ///
    /// Candidates are visited by envelope distance; the search stops once an
    /// envelope is farther than the best exact distance or than
    /// `max_distance`.
    #[must_use]
    pub fn nearest(
        &self,
        geometry: &Geometry<f64>,
        max_distance: Option<f64>,
    ) -> Option<(usize, f64)> {
        let rect = kernel::envelope(geometry)?;
        let center = rect.center();
        // nothing inside the query envelope is closer to a candidate than
        // the center distance minus half the diagonal
        let half_diagonal = (rect.width().powi(2) + rect.height().powi(2)).sqrt() / 2.0;

        let mut best: Option<(usize, f64)> = None;
        for (entry, center_d2) in self
            .tree
            .nearest_neighbor_iter_with_distance_2(&[center.x, center.y])
        {
            let lower_bound = (center_d2.sqrt() - half_diagonal).max(0.0);
            if best.is_some_and(|(_, d)| lower_bound > d)
                || max_distance.is_some_and(|m| lower_bound > m)
            {
                break;
            }
            let Some(candidate) = self.features[entry.data].geometry.as_ref() else {
                continue;
            };
            let d = Euclidean::distance(geometry, candidate);
            if max_distance.is_some_and(|m| d > m) {
                continue;
            }
            if best.is_none_or(|(_, b)| d < b) {
                best = Some((entry.data, d));
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::MemoryCollection;
    use geo_types::{Point, polygon};
    use geoverlay_core_common::{FeatureId, GeometryKind, Schema};

    fn index_of(geometries: Vec<Option<Geometry<f64>>>) -> SpatialIndex {
        let schema = Schema::new("t", "geom", GeometryKind::Any, None);
        let features = geometries
            .into_iter()
            .enumerate()
            .map(|(i, g)| Feature::new(FeatureId::new(format!("t.{i}")), g))
            .collect();
        SpatialIndex::from_collection(&MemoryCollection::new(schema, features)).unwrap()
    }

    #[test]
    fn empty_input_builds_empty_index() {
        let index = index_of(vec![]);
        assert!(index.is_empty());
        assert!(
            index
                .query(&Rect::new((0.0, 0.0), (1.0, 1.0)))
                .is_empty()
        );
    }

    #[test]
    fn null_geometries_are_not_indexed() {
        let index = index_of(vec![None, Some(Geometry::Point(Point::new(1.0, 1.0)))]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(0).unwrap().id.as_str(), "t.1");
    }

    #[test]
    fn query_returns_envelope_candidates() {
        let index = index_of(vec![
            Some(Geometry::Polygon(polygon![
                (x: 0.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 2.0), (x: 0.0, y: 2.0),
            ])),
            Some(Geometry::Point(Point::new(10.0, 10.0))),
            Some(Geometry::Point(Point::new(1.0, 1.0))),
        ]);
        assert_eq!(index.query(&Rect::new((0.5, 0.5), (1.5, 1.5))), vec![0, 2]);
        assert_eq!(index.query(&Rect::new((9.0, 9.0), (11.0, 11.0))), vec![1]);
    }

    #[test]
    fn nearest_respects_max_distance() {
        let index = index_of(vec![
            Some(Geometry::Point(Point::new(5.0, 0.0))),
            Some(Geometry::Point(Point::new(2.0, 0.0))),
        ]);
        let origin = Geometry::Point(Point::new(0.0, 0.0));
        let (id, d) = index.nearest(&origin, None).unwrap();
        assert_eq!(id, 1);
        assert!((d - 2.0).abs() < 1e-12);
        assert!(index.nearest(&origin, Some(1.0)).is_none());
    }
}

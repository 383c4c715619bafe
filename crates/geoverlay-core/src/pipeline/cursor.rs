//! Pull-based cursor protocol shared by every pipeline stage.

use std::fmt;
use std::sync::Arc;

use geoverlay_core_common::{Feature, FeatureId, Schema};

use crate::error::{PipelineError, Result};

/// Single-pass, forward-only producer of features.
///
/// The owner of a cursor must call [`close`](FeatureCursor::close); it
/// releases upstream cursors and is idempotent.
pub trait FeatureCursor {
    /// Returns `true` if [`next_feature`](FeatureCursor::next_feature) will
    /// yield a feature. Repeated calls without consuming are idempotent.
    ///
    /// # Errors
    ///
    /// Surfaces an error from an upstream producer; the cursor is exhausted
    /// afterwards.
    fn has_next(&mut self) -> Result<bool>;

    /// Returns the next feature.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Exhausted`] when nothing remains, or an
    /// upstream error.
    fn next_feature(&mut self) -> Result<Feature>;

    /// Releases the cursor and everything it pulls from.
    fn close(&mut self);
}

/// A feature source that can be opened any number of times.
pub trait FeatureCollection: fmt::Debug {
    /// Schema of every feature this collection produces.
    fn schema(&self) -> &Schema;

    /// Opens a fresh, independent cursor.
    ///
    /// # Errors
    ///
    /// Returns an error when an upstream collection cannot be opened.
    fn features(&self) -> Result<Box<dyn FeatureCursor>>;
}

/// Shared handle to a collection; stages hold their inputs this way.
pub type SharedCollection = Arc<dyn FeatureCollection>;

/// Pulls one feature from `cursor`, or `None` once it is drained.
///
/// # Errors
///
/// Returns the cursor's error.
pub fn pull(cursor: &mut dyn FeatureCursor) -> Result<Option<Feature>> {
    if cursor.has_next()? {
        cursor.next_feature().map(Some)
    } else {
        Ok(None)
    }
}

/// Opens `collection` and drains it into a vector.
///
/// # Errors
///
/// Returns the first error raised while opening or reading.
pub fn collect(collection: &dyn FeatureCollection) -> Result<Vec<Feature>> {
    let mut cursor = collection.features()?;
    let mut features = Vec::new();
    let outcome = loop {
        match pull(cursor.as_mut()) {
            Ok(Some(feature)) => features.push(feature),
            Ok(None) => break Ok(features),
            Err(e) => break Err(e),
        }
    };
    cursor.close();
    outcome
}

/// Stage-specific production step driven by [`StageCursor`].
pub trait Produce {
    /// Computes the next feature to emit, or `None` when the stage is done.
    /// Skipped inputs are consumed internally and never returned.
    ///
    /// # Errors
    ///
    /// Returns an error from an upstream cursor or a geometry computation.
    fn produce(&mut self) -> Result<Option<Feature>>;

    /// Releases upstream cursors. Called at most once.
    fn release(&mut self);
}

#[derive(Debug)]
enum State {
    Empty,
    Buffered(Feature),
    Exhausted,
}

/// Cursor state machine wrapping a [`Produce`] step.
///
/// `has_next` computes at most one feature ahead and buffers it, so the
/// protocol holds for every stage without each one tracking it. Dropping
/// the cursor closes it.
pub struct StageCursor<P: Produce> {
    producer: P,
    state: State,
    closed: bool,
}

impl<P: Produce> StageCursor<P> {
    /// Wraps `producer`.
    pub fn new(producer: P) -> Self {
        Self {
            producer,
            state: State::Empty,
            closed: false,
        }
    }

    /// Boxed cursor, as returned by [`FeatureCollection::features`].
    pub fn boxed(producer: P) -> Box<dyn FeatureCursor>
    where
        P: 'static,
    {
        Box::new(Self::new(producer))
    }
}

impl<P: Produce> FeatureCursor for StageCursor<P> {
    fn has_next(&mut self) -> Result<bool> {
        match self.state {
            State::Buffered(_) => Ok(true),
            State::Exhausted => Ok(false),
            State::Empty => match self.producer.produce() {
                Ok(Some(feature)) => {
                    self.state = State::Buffered(feature);
                    Ok(true)
                },
                Ok(None) => {
                    self.state = State::Exhausted;
                    Ok(false)
                },
                Err(e) => {
                    self.state = State::Exhausted;
                    Err(e)
                },
            },
        }
    }

    fn next_feature(&mut self) -> Result<Feature> {
        if !self.has_next()? {
            return Err(PipelineError::Exhausted.into());
        }
        match std::mem::replace(&mut self.state, State::Empty) {
            State::Buffered(feature) => Ok(feature),
            _ => Err(PipelineError::Exhausted.into()),
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.state = State::Exhausted;
        self.producer.release();
    }
}

impl<P: Produce> Drop for StageCursor<P> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Upstream cursor held by a producer, closed on release.
pub struct Upstream(Option<Box<dyn FeatureCursor>>);

impl Upstream {
    /// Wraps an opened cursor.
    #[must_use]
    pub fn new(cursor: Box<dyn FeatureCursor>) -> Self {
        Self(Some(cursor))
    }

    /// Pulls the next feature; `None` once drained or released.
    ///
    /// # Errors
    ///
    /// Returns the upstream error.
    pub fn pull(&mut self) -> Result<Option<Feature>> {
        match self.0.as_mut() {
            Some(cursor) => pull(cursor.as_mut()),
            None => Ok(None),
        }
    }

    /// Closes the upstream cursor.
    pub fn release(&mut self) {
        if let Some(mut cursor) = self.0.take() {
            cursor.close();
        }
    }
}

/// Sequential feature ids `"{type_name}.{n}"`, starting at 1.
#[derive(Debug, Clone)]
pub struct IdSequence {
    type_name: String,
    issued: u64,
}

impl IdSequence {
    /// Sequence for features of `schema`.
    #[must_use]
    pub fn for_schema(schema: &Schema) -> Self {
        Self {
            type_name: schema.type_name().to_string(),
            issued: 0,
        }
    }

    /// Issues the next id.
    pub fn next_id(&mut self) -> FeatureId {
        self.issued += 1;
        FeatureId::sequential(&self.type_name, self.issued)
    }
}

/// In-memory collection; every cursor replays the same features.
#[derive(Debug, Clone)]
pub struct MemoryCollection {
    schema: Schema,
    features: Arc<Vec<Feature>>,
}

impl MemoryCollection {
    /// Creates a collection over `features`.
    #[must_use]
    pub fn new(schema: Schema, features: Vec<Feature>) -> Self {
        Self {
            schema,
            features: Arc::new(features),
        }
    }

    /// Shared handle to a new collection.
    #[must_use]
    pub fn shared(schema: Schema, features: Vec<Feature>) -> SharedCollection {
        Arc::new(Self::new(schema, features))
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns `true` when the collection holds no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

struct Replay {
    features: Arc<Vec<Feature>>,
    position: usize,
}

impl Produce for Replay {
    fn produce(&mut self) -> Result<Option<Feature>> {
        let next = self.features.get(self.position).cloned();
        self.position += 1;
        Ok(next)
    }

    fn release(&mut self) {
        self.position = self.features.len();
    }
}

impl FeatureCollection for MemoryCollection {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn features(&self) -> Result<Box<dyn FeatureCursor>> {
        Ok(StageCursor::boxed(Replay {
            features: Arc::clone(&self.features),
            position: 0,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{Geometry, Point};
    use geoverlay_core_common::GeometryKind;
    use std::cell::Cell;
    use std::rc::Rc;

    fn points(n: usize) -> MemoryCollection {
        let schema = Schema::new("pts", "geom", GeometryKind::Point, None);
        let features = (0..n)
            .map(|i| {
                Feature::new(
                    FeatureId::sequential("pts", i as u64 + 1),
                    Some(Geometry::Point(Point::new(i as f64, 0.0))),
                )
            })
            .collect();
        MemoryCollection::new(schema, features)
    }

    #[test]
    fn has_next_is_idempotent() {
        let collection = points(2);
        let mut cursor = collection.features().unwrap();
        assert!(cursor.has_next().unwrap());
        assert!(cursor.has_next().unwrap());
        assert_eq!(cursor.next_feature().unwrap().id.as_str(), "pts.1");
        assert_eq!(cursor.next_feature().unwrap().id.as_str(), "pts.2");
        assert!(!cursor.has_next().unwrap());
    }

    #[test]
    fn next_after_exhaustion_fails() {
        let collection = points(0);
        let mut cursor = collection.features().unwrap();
        let err = cursor.next_feature().unwrap_err();
        assert!(err.to_string().contains("exhausted"));
    }

    #[test]
    fn every_open_is_independent() {
        let collection = points(3);
        let mut first = collection.features().unwrap();
        first.next_feature().unwrap();
        assert_eq!(collect(&collection).unwrap().len(), 3);
    }

    struct Counting {
        releases: Rc<Cell<u32>>,
        failing: bool,
    }

    impl Produce for Counting {
        fn produce(&mut self) -> Result<Option<Feature>> {
            if self.failing {
                return Err(PipelineError::UnsupportedInput {
                    kind: "boom".to_string(),
                }
                .into());
            }
            Ok(None)
        }

        fn release(&mut self) {
            self.releases.set(self.releases.get() + 1);
        }
    }

    #[test]
    fn close_releases_exactly_once() {
        let releases = Rc::new(Cell::new(0));
        let mut cursor = StageCursor::new(Counting {
            releases: Rc::clone(&releases),
            failing: false,
        });
        cursor.close();
        cursor.close();
        drop(cursor);
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn producer_error_exhausts_cursor() {
        let releases = Rc::new(Cell::new(0));
        let mut cursor = StageCursor::new(Counting {
            releases: Rc::clone(&releases),
            failing: true,
        });
        assert!(cursor.has_next().is_err());
        assert!(!cursor.has_next().unwrap());
        drop(cursor);
        assert_eq!(releases.get(), 1);
    }
}

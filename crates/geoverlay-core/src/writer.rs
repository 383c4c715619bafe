//! All-or-nothing persistence of a pipeline run.
//!
//! A [`FeatureWriter`] validates and stages features, flushing them to the
//! store in batches. The store only publishes them on commit; any failure
//! before that rolls the whole run back.

use geoverlay_core_common::{Feature, FeatureStore, ProgressListener, Schema, validate};
use log::{debug, error, info, warn};

use crate::error::{GeoverlayError, PipelineError, Result, StoreError};
use crate::pipeline::{FeatureCollection, FeatureCursor, pull};

/// Number of staged features handed to the store at once.
pub const INSERT_BATCH_SIZE: usize = 1_000;

/// Writer for one run against a [`FeatureStore`].
///
/// Dropping a writer that was neither committed nor rolled back rolls the
/// store back.
pub struct FeatureWriter<'a> {
    store: &'a mut dyn FeatureStore,
    schema: Schema,
    staged: Vec<Feature>,
    written: u64,
    open: bool,
}

impl<'a> FeatureWriter<'a> {
    /// Starts a run on `store`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Begin`] if the store refuses the run.
    pub fn open(store: &'a mut dyn FeatureStore, schema: &Schema) -> Result<Self> {
        store.begin(schema).map_err(|source| StoreError::Begin {
            type_name: schema.type_name().to_string(),
            source,
        })?;
        Ok(Self {
            store,
            schema: schema.clone(),
            staged: Vec::with_capacity(INSERT_BATCH_SIZE),
            written: 0,
            open: true,
        })
    }

    /// Number of features staged so far.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Validates `feature` against the output schema and stages it.
    ///
    /// # Errors
    ///
    /// Returns a validation error, or a store error when a full batch
    /// cannot be handed over. The run must then be rolled back.
    pub fn stage(&mut self, feature: Feature) -> Result<()> {
        validate(&feature, &self.schema)?;
        self.staged.push(feature);
        self.written += 1;
        if self.staged.len() >= INSERT_BATCH_SIZE {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.staged.is_empty() {
            return Ok(());
        }
        self.store
            .insert(&self.staged)
            .map_err(|source| StoreError::Commit {
                count: self.staged.len(),
                source,
            })?;
        self.staged.clear();
        Ok(())
    }

    /// Publishes the run and returns the number of features written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Commit`] after rolling the store back.
    pub fn commit(mut self) -> Result<u64> {
        let outcome = self.flush().and_then(|()| {
            self.store.commit().map_err(|source| {
                StoreError::Commit {
                    count: usize::try_from(self.written).unwrap_or(usize::MAX),
                    source,
                }
                .into()
            })
        });
        match outcome {
            Ok(count) => {
                self.open = false;
                debug!("Committed {count} feature(s) of '{}'", self.schema.type_name());
                Ok(count)
            },
            Err(e) => self.rollback(e),
        }
    }

    /// Discards everything staged and returns `cause`.
    ///
    /// # Errors
    ///
    /// Always returns `cause`; a failing store rollback is only logged.
    pub fn rollback<T>(mut self, cause: GeoverlayError) -> Result<T> {
        self.discard();
        Err(cause)
    }

    fn discard(&mut self) {
        self.open = false;
        self.staged.clear();
        if let Err(e) = self.store.rollback() {
            error!("Rollback of '{}' failed: {e:#}", self.schema.type_name());
        }
        debug!(
            "Rolled back {} staged feature(s) of '{}'",
            self.written,
            self.schema.type_name()
        );
    }

    /// Closes every cursor of the run; safe to call whatever the outcome.
    pub fn close(cursors: &mut [Box<dyn FeatureCursor>]) {
        for cursor in cursors.iter_mut() {
            cursor.close();
        }
    }
}

impl Drop for FeatureWriter<'_> {
    fn drop(&mut self) {
        if self.open {
            warn!("Run on '{}' was abandoned", self.schema.type_name());
            self.discard();
        }
    }
}

fn drain(
    cursor: &mut dyn FeatureCursor,
    writer: &mut FeatureWriter<'_>,
    progress: &dyn ProgressListener,
) -> Result<()> {
    loop {
        if progress.is_canceled() {
            return Err(PipelineError::Canceled {
                written: writer.written(),
            }
            .into());
        }
        let Some(feature) = pull(cursor)? else {
            return Ok(());
        };
        writer.stage(feature)?;
        progress.progress(writer.written());
    }
}

/// Drives `source` into `store` as one transaction.
///
/// Cancellation is polled before each feature. On any error the store is
/// rolled back and the cursor closed before the error is returned.
///
/// # Errors
///
/// Returns the first error raised while opening, reading, staging or
/// committing, or [`PipelineError::Canceled`].
pub fn run_operation(
    source: &dyn FeatureCollection,
    store: &mut dyn FeatureStore,
    progress: &dyn ProgressListener,
) -> Result<u64> {
    let schema = source.schema();
    progress.started();
    let mut writer = FeatureWriter::open(store, schema)?;
    let mut cursor = match source.features() {
        Ok(cursor) => cursor,
        Err(e) => return writer.rollback(e),
    };

    let outcome = drain(cursor.as_mut(), &mut writer, progress);
    FeatureWriter::close(std::slice::from_mut(&mut cursor));

    match outcome {
        Ok(()) => {
            let count = writer.commit()?;
            progress.complete();
            info!("Wrote {count} feature(s) to '{}'", schema.type_name());
            Ok(count)
        },
        Err(e) => writer.rollback(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::MemoryCollection;
    use anyhow::anyhow;
    use geo_types::{Geometry, Point};
    use geoverlay_core_common::{CancelFlag, FeatureId, GeometryKind, MemoryStore, NullProgress};

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
    fn commits_every_feature() {
        let mut store = MemoryStore::new();
        let count = run_operation(&points(3), &mut store, &NullProgress).unwrap();
        assert_eq!(count, 3);
        assert_eq!(store.features().len(), 3);
    }

    #[test]
    fn invalid_feature_rolls_back() {
        let schema = Schema::new("pts", "geom", GeometryKind::Point, None);
        let features = vec![
            Feature::new(FeatureId::new("pts.1"), Some(Geometry::Point(Point::new(0.0, 0.0)))),
            Feature::new(FeatureId::new("pts.2"), None).with_attribute("extra", 1.0),
        ];
        let mut store = MemoryStore::new();
        let err = run_operation(&MemoryCollection::new(schema, features), &mut store, &NullProgress)
            .unwrap_err();
        assert!(matches!(err, GeoverlayError::Validation(_)));
        assert!(store.features().is_empty());
    }

    #[test]
    fn canceled_run_persists_nothing() {
        let flag = CancelFlag::new();
        flag.cancel();
        let mut store = MemoryStore::new();
        let err = run_operation(&points(5), &mut store, &flag).unwrap_err();
        assert!(err.is_canceled());
        assert!(store.features().is_empty());
    }

    #[test]
    fn abandoned_writer_rolls_back() {
        let pts = points(2);
        let mut store = MemoryStore::new();
        {
            let mut writer = FeatureWriter::open(&mut store, pts.schema()).unwrap();
            let mut cursor = pts.features().unwrap();
            while let Some(feature) = pull(cursor.as_mut()).unwrap() {
                writer.stage(feature).unwrap();
            }
            assert_eq!(writer.written(), 2);
        }
        assert!(store.features().is_empty());

        let count = run_operation(&pts, &mut store, &NullProgress).unwrap();
        assert_eq!(count, 2);
    }

    struct FailingCommit;

    impl FeatureStore for FailingCommit {
        fn begin(&mut self, _schema: &Schema) -> anyhow::Result<()> {
            Ok(())
        }

        fn insert(&mut self, _features: &[Feature]) -> anyhow::Result<()> {
            Ok(())
        }

        fn commit(&mut self) -> anyhow::Result<u64> {
            Err(anyhow!("disk full"))
        }

        fn rollback(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn commit_failure_is_a_store_error() {
        let err = run_operation(&points(2), &mut FailingCommit, &NullProgress).unwrap_err();
        assert!(matches!(err, GeoverlayError::Store(StoreError::Commit { count: 2, .. })));
    }
}

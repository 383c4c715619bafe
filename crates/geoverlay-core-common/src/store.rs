//! Persistence and progress traits for writing operation results.
//!
//! Format crates implement [`FeatureStore`] so the transactional writer in
//! `geoverlay-core` can persist a run without knowing the storage format.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, anyhow};

use crate::feature::Feature;
use crate::schema::Schema;

/// Target store with staged-commit semantics.
///
/// A run calls [`begin`](FeatureStore::begin), then
/// [`insert`](FeatureStore::insert) any number of times, then exactly one of
/// [`commit`](FeatureStore::commit) or [`rollback`](FeatureStore::rollback).
/// Nothing inserted during a run may become visible before `commit` returns.
pub trait FeatureStore {
    /// Starts a run that will write features of `schema`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot accept a new run.
    fn begin(&mut self, schema: &Schema) -> Result<()>;

    /// Stages features for the current run.
    ///
    /// # Errors
    ///
    /// Returns an error if no run is active or the features cannot be staged.
    fn insert(&mut self, features: &[Feature]) -> Result<()>;

    /// Publishes everything staged in the current run and returns its count.
    ///
    /// # Errors
    ///
    /// Returns an error if the staged features cannot be persisted.
    fn commit(&mut self) -> Result<u64>;

    /// Discards everything staged in the current run.
    ///
    /// # Errors
    ///
    /// Returns an error if cleaning up the staged state fails.
    fn rollback(&mut self) -> Result<()>;
}

/// In-memory store, mostly useful for tests and for chaining operations.
#[derive(Debug, Default)]
pub struct MemoryStore {
    schema: Option<Schema>,
    committed: Vec<Feature>,
    pending: Option<Vec<Feature>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed features.
    #[must_use]
    pub fn features(&self) -> &[Feature] {
        &self.committed
    }

    /// Schema of the last committed run.
    #[must_use]
    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    /// Consumes the store, returning schema and committed features.
    #[must_use]
    pub fn into_parts(self) -> (Option<Schema>, Vec<Feature>) {
        (self.schema, self.committed)
    }
}

impl FeatureStore for MemoryStore {
    fn begin(&mut self, schema: &Schema) -> Result<()> {
        if self.pending.is_some() {
            return Err(anyhow!("A run is already in progress"));
        }
        self.schema = Some(schema.clone());
        self.committed.clear();
        self.pending = Some(Vec::new());
        Ok(())
    }

    fn insert(&mut self, features: &[Feature]) -> Result<()> {
        let pending = self
            .pending
            .as_mut()
            .ok_or_else(|| anyhow!("insert called outside of a run"))?;
        pending.extend_from_slice(features);
        Ok(())
    }

    fn commit(&mut self) -> Result<u64> {
        let pending = self
            .pending
            .take()
            .ok_or_else(|| anyhow!("commit called outside of a run"))?;
        let count = pending.len() as u64;
        self.committed = pending;
        Ok(count)
    }

    fn rollback(&mut self) -> Result<()> {
        self.pending = None;
        self.committed.clear();
        Ok(())
    }
}

/// Progress and cancellation signal polled between features.
pub trait ProgressListener {
    /// Called once before the first feature is pulled.
    fn started(&self) {}

    /// Reports the number of features written so far.
    fn progress(&self, _written: u64) {}

    /// Returns `true` when the caller asked the run to stop.
    fn is_canceled(&self) -> bool {
        false
    }

    /// Called once after a successful commit.
    fn complete(&self) {}
}

/// Listener that ignores every event and never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressListener for NullProgress {}

/// Listener backed by a shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    canceled: Arc<AtomicBool>,
}

impl CancelFlag {
    /// Creates a flag that is not canceled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }
}

impl ProgressListener for CancelFlag {
    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureId;
    use crate::schema::GeometryKind;

    fn schema() -> Schema {
        Schema::new("points", "geom", GeometryKind::Point, None)
    }

    #[test]
    fn commit_publishes_pending_features() {
        let mut store = MemoryStore::new();
        store.begin(&schema()).unwrap();
        store
            .insert(&[Feature::new(FeatureId::new("points.1"), None)])
            .unwrap();
        assert!(store.features().is_empty());
        assert_eq!(store.commit().unwrap(), 1);
        assert_eq!(store.features().len(), 1);
    }

    #[test]
    fn rollback_discards_pending_features() {
        let mut store = MemoryStore::new();
        store.begin(&schema()).unwrap();
        store
            .insert(&[Feature::new(FeatureId::new("points.1"), None)])
            .unwrap();
        store.rollback().unwrap();
        assert!(store.features().is_empty());
        assert!(store.commit().is_err());
    }

    #[test]
    fn insert_outside_run_fails() {
        let mut store = MemoryStore::new();
        assert!(store.insert(&[]).is_err());
    }

    #[test]
    fn cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_canceled());
        flag.cancel();
        assert!(clone.is_canceled());
    }
}

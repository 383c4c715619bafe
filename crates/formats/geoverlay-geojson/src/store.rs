//! `GeoJSON` file target with staged commit.
//!
//! Features are streamed into a temporary file next to the target. Commit
//! renames it over the target; rollback, or dropping the store mid-run,
//! deletes it, so the target is never left half-written.

use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use geoverlay_core_common::{Feature, FeatureStore, Schema};
use log::{debug, info};
use tempfile::NamedTempFile;

use crate::writer::{GeoJsonWriter, GeoJsonWriterOptions};

type StagedFile = GeoJsonWriter<BufWriter<NamedTempFile>>;

/// [`FeatureStore`] writing one `GeoJSON` file per run.
#[derive(Debug)]
pub struct GeoJsonFileStore {
    path: PathBuf,
    options: GeoJsonWriterOptions,
    run: Option<StagedFile>,
}

impl GeoJsonFileStore {
    /// Creates a store targeting `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_options(path, GeoJsonWriterOptions::default())
    }

    /// Creates a store targeting `path` with custom writer options.
    pub fn with_options(path: impl Into<PathBuf>, options: GeoJsonWriterOptions) -> Self {
        Self {
            path: path.into(),
            options,
            run: None,
        }
    }

    /// Target file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_dir(&self) -> &Path {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }
}

impl FeatureStore for GeoJsonFileStore {
    fn begin(&mut self, schema: &Schema) -> Result<()> {
        if self.run.is_some() {
            return Err(anyhow!("A run is already in progress for {}", self.path.display()));
        }
        let temp = tempfile::Builder::new()
            .prefix(".geoverlay-")
            .suffix(".geojson.tmp")
            .tempfile_in(self.staging_dir())
            .with_context(|| format!("Cannot stage output next to {}", self.path.display()))?;
        debug!("Staging '{}' in {}", schema.type_name(), temp.path().display());
        self.run = Some(GeoJsonWriter::start(BufWriter::new(temp), schema, self.options)?);
        Ok(())
    }

    fn insert(&mut self, features: &[Feature]) -> Result<()> {
        let run = self
            .run
            .as_mut()
            .ok_or_else(|| anyhow!("insert called outside of a run"))?;
        for feature in features {
            run.write(feature)?;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<u64> {
        let run = self
            .run
            .take()
            .ok_or_else(|| anyhow!("commit called outside of a run"))?;
        let count = run.written();
        let temp = run
            .finish()?
            .into_inner()
            .map_err(|e| anyhow!("Failed to flush staged output: {}", e.error()))?;
        temp.persist(&self.path)
            .with_context(|| format!("Cannot replace {}", self.path.display()))?;
        info!("Wrote {count} feature(s) to {}", self.path.display());
        Ok(count)
    }

    fn rollback(&mut self) -> Result<()> {
        if self.run.take().is_some() {
            debug!("Discarded staged output for {}", self.path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{Geometry, Point};
    use geoverlay_core_common::{FeatureId, GeometryKind};
    use tempfile::TempDir;

    fn schema() -> Schema {
        Schema::new("pts", "geometry", GeometryKind::Point, None)
    }

    fn point(n: u64) -> Feature {
        Feature::new(
            FeatureId::sequential("pts", n),
            Some(Geometry::Point(Point::new(n as f64, 0.0))),
        )
    }

    fn entries(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    #[test]
    fn commit_replaces_target() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.geojson");
        std::fs::write(&target, "old").unwrap();

        let mut store = GeoJsonFileStore::new(&target);
        store.begin(&schema()).unwrap();
        store.insert(&[point(1), point(2)]).unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "old");
        assert_eq!(store.commit().unwrap(), 2);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&target).unwrap()).unwrap();
        assert_eq!(json["features"].as_array().unwrap().len(), 2);
        assert_eq!(entries(&dir), 1);
    }

    #[test]
    fn rollback_leaves_no_trace() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.geojson");

        let mut store = GeoJsonFileStore::new(&target);
        store.begin(&schema()).unwrap();
        store.insert(&[point(1)]).unwrap();
        assert_eq!(entries(&dir), 1);
        store.rollback().unwrap();
        assert!(!target.exists());
        assert_eq!(entries(&dir), 0);
    }

    #[test]
    fn protocol_misuse_is_reported() {
        let dir = TempDir::new().unwrap();
        let mut store = GeoJsonFileStore::new(dir.path().join("out.geojson"));
        assert!(store.insert(&[point(1)]).is_err());
        assert!(store.commit().is_err());
        store.begin(&schema()).unwrap();
        assert!(store.begin(&schema()).is_err());
    }
}

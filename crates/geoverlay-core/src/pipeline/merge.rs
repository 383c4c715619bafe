//! Concatenation of two collections into one schema.

use std::collections::{BTreeMap, HashMap};

use geoverlay_core_common::{Feature, FieldUnionPolicy, Schema, Value};

use super::cursor::{
    FeatureCollection, FeatureCursor, IdSequence, Produce, SharedCollection, StageCursor, Upstream,
};
use super::reproject::align;
use crate::error::Result;

/// Every feature of `first`, then every feature of `second`.
///
/// The schema is the field union of both inputs ([`FieldUnionPolicy::Merge`]);
/// attributes missing on one side are `Null`. Ids are reassigned
/// sequentially.
#[derive(Debug)]
pub struct MergeCollection {
    first: SharedCollection,
    second: SharedCollection,
    schema: Schema,
    second_mapping: HashMap<String, String>,
}

impl MergeCollection {
    /// Creates the stage, reprojecting `second` into the CRS of `first`.
    ///
    /// # Errors
    ///
    /// Returns a CRS error when `second` cannot be reprojected.
    pub fn new(first: SharedCollection, second: SharedCollection) -> Result<Self> {
        let second = align(first.schema(), second)?;
        let (schema, mapping) = first.schema().union(second.schema(), FieldUnionPolicy::Merge);
        Ok(Self {
            first,
            second,
            schema,
            second_mapping: mapping.into_iter().collect(),
        })
    }
}

/// Copies the attributes of `source` named in `mapping` onto a full row of
/// `schema`, leaving every other attribute `Null`.
pub(crate) fn remap(
    source: BTreeMap<String, Value>,
    schema: &Schema,
    mapping: Option<&HashMap<String, String>>,
) -> BTreeMap<String, Value> {
    let mut row: BTreeMap<String, Value> = schema
        .attributes()
        .map(|f| (f.name.clone(), Value::Null))
        .collect();
    for (name, value) in source {
        let target = match mapping {
            Some(mapping) => mapping.get(&name).cloned(),
            None => Some(name),
        };
        if let Some(slot) = target.and_then(|t| row.get_mut(&t)) {
            *slot = value;
        }
    }
    row
}

struct Merging {
    first: Upstream,
    second: Upstream,
    schema: Schema,
    second_mapping: HashMap<String, String>,
    ids: IdSequence,
}

impl Produce for Merging {
    fn produce(&mut self) -> Result<Option<Feature>> {
        let (source, from_second) = if let Some(feature) = self.first.pull()? {
            (feature, false)
        } else if let Some(feature) = self.second.pull()? {
            (feature, true)
        } else {
            return Ok(None);
        };
        let mut feature = Feature::new(self.ids.next_id(), source.geometry);
        let mapping = from_second.then_some(&self.second_mapping);
        feature.attributes = remap(source.attributes, &self.schema, mapping);
        Ok(Some(feature))
    }

    fn release(&mut self) {
        self.first.release();
        self.second.release();
    }
}

impl FeatureCollection for MergeCollection {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn features(&self) -> Result<Box<dyn FeatureCursor>> {
        let first = Upstream::new(self.first.features()?);
        let second = Upstream::new(self.second.features()?);
        Ok(StageCursor::boxed(Merging {
            first,
            second,
            schema: self.schema.clone(),
            second_mapping: self.second_mapping.clone(),
            ids: IdSequence::for_schema(&self.schema),
        }))
    }
}

/// Renames attributes of a collection; unmapped names pass through.
#[derive(Debug)]
pub struct RenameCollection {
    source: SharedCollection,
    schema: Schema,
    mapping: HashMap<String, String>,
}

impl RenameCollection {
    /// Creates the stage from `(source_name, target_name)` pairs.
    ///
    /// # Errors
    ///
    /// Returns a schema error when two fields end up with the same name and
    /// different kinds.
    pub fn new(source: SharedCollection, mapping: Vec<(String, String)>) -> Result<Self> {
        let mapping: HashMap<String, String> = mapping.into_iter().collect();
        let base = source.schema();
        let mut schema = Schema::new(
            base.type_name(),
            base.geometry_name(),
            base.geometry_kind(),
            base.crs().cloned(),
        );
        for field in base.attributes() {
            let mut renamed = field.clone();
            if let Some(target) = mapping.get(&field.name) {
                renamed.name.clone_from(target);
            }
            schema.add_field(renamed)?;
        }
        Ok(Self {
            source,
            schema,
            mapping,
        })
    }
}

struct Renaming {
    upstream: Upstream,
    mapping: HashMap<String, String>,
}

impl Produce for Renaming {
    fn produce(&mut self) -> Result<Option<Feature>> {
        let Some(mut feature) = self.upstream.pull()? else {
            return Ok(None);
        };
        feature.attributes = std::mem::take(&mut feature.attributes)
            .into_iter()
            .map(|(name, value)| (self.mapping.get(&name).cloned().unwrap_or(name), value))
            .collect();
        Ok(Some(feature))
    }

    fn release(&mut self) {
        self.upstream.release();
    }
}

impl FeatureCollection for RenameCollection {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn features(&self) -> Result<Box<dyn FeatureCursor>> {
        Ok(StageCursor::boxed(Renaming {
            upstream: Upstream::new(self.source.features()?),
            mapping: self.mapping.clone(),
        }))
    }
}

//! Summary information about a feature collection.

use geo_types::Rect;
use geoverlay_core_common::Schema;

use crate::error::Result;
use crate::kernel;
use crate::pipeline::{FeatureCollection, FeatureCursor, pull};

/// Information about a dataset.
#[derive(Debug, Clone)]
pub struct DatasetInfo {
    /// Path to the dataset
    pub dataset: String,
    /// Feature type name
    pub type_name: String,
    /// Geometry field information
    pub geometry: GeometryColumnInfo,
    /// Attribute fields
    pub fields: Vec<FieldInfo>,
    /// Number of features
    pub feature_count: u64,
    /// Number of features without geometry
    pub empty_geometries: u64,
    /// Bounding rectangle of all geometries
    pub extent: Option<Rect<f64>>,
}

/// Information about the geometry field.
#[derive(Debug, Clone)]
pub struct GeometryColumnInfo {
    /// Field name
    pub name: String,
    /// Declared geometry kind
    pub kind: String,
    /// CRS identifier
    pub crs: Option<String>,
}

/// Information about an attribute field.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    /// Field name
    pub name: String,
    /// Value kind
    pub kind: String,
    /// Declared width, if any
    pub length: Option<u32>,
}

fn columns(schema: &Schema) -> (GeometryColumnInfo, Vec<FieldInfo>) {
    let geometry = GeometryColumnInfo {
        name: schema.geometry_name().to_string(),
        kind: schema.geometry_kind().to_string(),
        crs: schema.crs().map(ToString::to_string),
    };
    let fields = schema
        .attributes()
        .map(|f| FieldInfo {
            name: f.name.clone(),
            kind: f.kind.to_string(),
            length: f.length,
        })
        .collect();
    (geometry, fields)
}

impl DatasetInfo {
    /// Reads `collection` once to count its features and compute its extent.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while reading the collection.
    pub fn describe(dataset: &str, collection: &dyn FeatureCollection) -> Result<Self> {
        let schema = collection.schema();
        let (geometry, fields) = columns(schema);
        let mut info = Self {
            dataset: dataset.to_string(),
            type_name: schema.type_name().to_string(),
            geometry,
            fields,
            feature_count: 0,
            empty_geometries: 0,
            extent: None,
        };

        let mut cursor = collection.features()?;
        let scanned = info.scan(cursor.as_mut());
        cursor.close();
        scanned.map(|()| info)
    }

    fn scan(&mut self, cursor: &mut dyn FeatureCursor) -> Result<()> {
        while let Some(feature) = pull(cursor)? {
            self.feature_count += 1;
            match feature.geometry.as_ref().and_then(kernel::envelope) {
                Some(rect) => self.extent = Some(expand(self.extent, rect)),
                None => self.empty_geometries += 1,
            }
        }
        Ok(())
    }
}

fn expand(extent: Option<Rect<f64>>, rect: Rect<f64>) -> Rect<f64> {
    match extent {
        None => rect,
        Some(e) => Rect::new(
            (e.min().x.min(rect.min().x), e.min().y.min(rect.min().y)),
            (e.max().x.max(rect.max().x), e.max().y.max(rect.max().y)),
        ),
    }
}

//! Serialization of features as a `GeoJSON` `FeatureCollection`.

use std::io::Write;

use geojson::feature::Id;
use geojson::{JsonObject, JsonValue};
use geoverlay_core_common::{Crs, Feature, Schema, Value};

use crate::error::{GeoJsonError, GeoJsonResult};

/// Options for writing `GeoJSON`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeoJsonWriterOptions {
    /// Emit a legacy `crs` member for CRSs other than WGS84
    pub write_crs: bool,
    /// Emit feature ids
    pub write_ids: bool,
    /// Pretty-print each feature
    pub pretty: bool,
}

impl Default for GeoJsonWriterOptions {
    fn default() -> Self {
        Self {
            write_crs: true,
            write_ids: true,
            pretty: false,
        }
    }
}

impl GeoJsonWriterOptions {
    /// Set whether a `crs` member is written.
    #[must_use]
    pub fn with_crs(mut self, write_crs: bool) -> Self {
        self.write_crs = write_crs;
        self
    }

    /// Set whether feature ids are written.
    #[must_use]
    pub fn with_ids(mut self, write_ids: bool) -> Self {
        self.write_ids = write_ids;
        self
    }

    /// Set whether features are pretty-printed.
    #[must_use]
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

/// Legacy named-CRS member, or `None` for WGS84 and unknown systems.
fn crs_member(crs: Option<&Crs>) -> Option<JsonValue> {
    let code = crs.and_then(Crs::epsg).filter(|code| *code != 4326)?;
    Some(serde_json::json!({
        "type": "name",
        "properties": { "name": format!("urn:ogc:def:crs:EPSG::{code}") }
    }))
}

fn to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Integer(v) => JsonValue::from(*v),
        Value::Float(v) => {
            serde_json::Number::from_f64(*v).map_or(JsonValue::Null, JsonValue::Number)
        },
        Value::Text(s) => JsonValue::String(s.clone()),
    }
}

/// Converts a feature into its `GeoJSON` form, properties in schema order.
#[must_use]
pub fn to_geojson_feature(
    feature: &Feature,
    schema: &Schema,
    options: &GeoJsonWriterOptions,
) -> geojson::Feature {
    let mut properties = JsonObject::new();
    for field in schema.attributes() {
        let value = feature.get(&field.name).map_or(JsonValue::Null, to_json);
        properties.insert(field.name.clone(), value);
    }
    geojson::Feature {
        bbox: None,
        geometry: feature
            .geometry
            .as_ref()
            .map(|g| geojson::Geometry::new(geojson::Value::from(g))),
        id: options
            .write_ids
            .then(|| Id::String(feature.id.to_string())),
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Streaming `FeatureCollection` writer: header, features, footer.
#[derive(Debug)]
pub struct GeoJsonWriter<W: Write> {
    sink: W,
    schema: Schema,
    options: GeoJsonWriterOptions,
    written: u64,
}

impl<W: Write> GeoJsonWriter<W> {
    /// Writes the collection header.
    ///
    /// # Errors
    ///
    /// Returns [`GeoJsonError::Io`] if the sink fails.
    pub fn start(
        mut sink: W,
        schema: &Schema,
        options: GeoJsonWriterOptions,
    ) -> GeoJsonResult<Self> {
        let crs = options
            .write_crs
            .then(|| crs_member(schema.crs()))
            .flatten()
            .map(|member| format!("\"crs\":{member},"))
            .unwrap_or_default();
        let header = format!("{{\"type\":\"FeatureCollection\",{crs}\"features\":[\n");
        sink.write_all(header.as_bytes())
            .map_err(|e| GeoJsonError::io(schema.type_name(), e))?;
        Ok(Self {
            sink,
            schema: schema.clone(),
            options,
            written: 0,
        })
    }

    /// Appends one feature.
    ///
    /// # Errors
    ///
    /// Returns [`GeoJsonError::Write`] if the feature cannot be serialized
    /// and [`GeoJsonError::Io`] if the sink fails.
    pub fn write(&mut self, feature: &Feature) -> GeoJsonResult<()> {
        let json = to_geojson_feature(feature, &self.schema, &self.options);
        let text = if self.options.pretty {
            serde_json::to_string_pretty(&json)
        } else {
            serde_json::to_string(&json)
        }
        .map_err(|e| GeoJsonError::Write {
            feature: feature.id.to_string(),
            message: e.to_string(),
        })?;
        let separator = if self.written == 0 { "" } else { ",\n" };
        write!(self.sink, "{separator}{text}")
            .map_err(|e| GeoJsonError::io(self.schema.type_name(), e))?;
        self.written += 1;
        Ok(())
    }

    /// Number of features written.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Writes the footer and returns the sink.
    ///
    /// # Errors
    ///
    /// Returns [`GeoJsonError::Io`] if the sink fails.
    pub fn finish(mut self) -> GeoJsonResult<W> {
        self.sink
            .write_all(b"\n]}\n")
            .and_then(|()| self.sink.flush())
            .map_err(|e| GeoJsonError::io(self.schema.type_name(), e))?;
        Ok(self.sink)
    }
}

/// Serializes `features` into a complete `GeoJSON` document.
///
/// # Errors
///
/// Returns [`GeoJsonError::Write`] if a feature cannot be serialized.
pub fn write_geojson_to_bytes(
    schema: &Schema,
    features: &[Feature],
    options: GeoJsonWriterOptions,
) -> GeoJsonResult<Vec<u8>> {
    let mut writer = GeoJsonWriter::start(Vec::new(), schema, options)?;
    for feature in features {
        writer.write(feature)?;
    }
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{Geometry, Point};
    use geoverlay_core_common::{FeatureId, Field, FieldKind, GeometryKind};

    fn schema(crs: Crs) -> Schema {
        Schema::new("sites", "geometry", GeometryKind::Point, Some(crs))
            .with_field(Field::new("name", FieldKind::Text))
            .unwrap()
            .with_field(Field::new("score", FieldKind::Float))
            .unwrap()
    }

    fn site(n: u64, score: f64) -> Feature {
        Feature::new(
            FeatureId::sequential("sites", n),
            Some(Geometry::Point(Point::new(n as f64, 0.5))),
        )
        .with_attribute("name", format!("site {n}"))
        .with_attribute("score", score)
    }

    #[test]
    fn writes_valid_feature_collection() {
        let bytes = write_geojson_to_bytes(
            &schema(Crs::wgs84()),
            &[site(1, 0.5), site(2, f64::NAN)],
            GeoJsonWriterOptions::default(),
        )
        .unwrap();
        let json: JsonValue = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["type"], "FeatureCollection");
        assert!(json.get("crs").is_none());
        let features = json["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0]["id"], "sites.1");
        assert_eq!(features[0]["properties"]["score"], 0.5);
        assert!(features[1]["properties"]["score"].is_null());
        assert_eq!(features[1]["geometry"]["coordinates"][0], 2.0);
    }

    #[test]
    fn writes_projected_crs_member() {
        let bytes = write_geojson_to_bytes(
            &schema(Crs::web_mercator()),
            &[],
            GeoJsonWriterOptions::default().with_ids(false),
        )
        .unwrap();
        let json: JsonValue = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["crs"]["properties"]["name"], "urn:ogc:def:crs:EPSG::3857");
        assert!(json["features"].as_array().unwrap().is_empty());
    }
}

//! `GeoJSON` parsing into raw feature records.

use std::convert::TryInto;

use geo_types::Geometry;
use geojson::{
    Feature, FeatureCollection, GeoJson, Geometry as GeoJsonGeometry, JsonObject, JsonValue,
    feature::Id,
};
use geoverlay_core_common::Crs;

use crate::error::{GeoJsonError, GeoJsonResult, SourcePosition};

/// Parsed `GeoJSON` feature with materialized properties and geometry.
#[derive(Debug, Clone)]
pub struct FeatureRecord {
    /// `id` member, if present
    pub id: Option<String>,
    /// Feature properties
    pub properties: JsonObject,
    /// Converted geometry
    pub geometry: Option<Geometry<f64>>,
}

/// Records of a source plus the CRS declared in its `crs` member.
#[derive(Debug, Clone, Default)]
pub struct ParsedSource {
    /// Features in source order
    pub records: Vec<FeatureRecord>,
    /// Declared CRS
    pub crs: Option<Crs>,
}

/// Parse raw bytes as a `GeoJSON` object, falling back to a newline-delimited
/// sequence of features.
///
/// # Errors
///
/// Returns [`GeoJsonError::Parse`] when neither form can be read.
pub fn parse_geojson_bytes(bytes: &[u8], context: &str) -> GeoJsonResult<ParsedSource> {
    let reader = std::io::Cursor::new(bytes);

    match GeoJson::from_reader(reader) {
        Ok(geojson) => geojson_to_source(geojson, context),
        Err(primary_err) => match parse_geojson_sequence(bytes, context) {
            Ok(source) => Ok(source),
            Err(sequence_err) => Err(GeoJsonError::parse(
                format!(
                    "not a FeatureCollection ({primary_err}); \
                     also not a GeoJSON sequence ({sequence_err})"
                ),
                None,
                context,
            )),
        },
    }
}

fn geojson_to_source(geojson: GeoJson, context: &str) -> GeoJsonResult<ParsedSource> {
    match geojson {
        GeoJson::FeatureCollection(collection) => collection_to_source(collection, context),
        GeoJson::Feature(feature) => Ok(ParsedSource {
            records: vec![feature_to_record(feature, 1, context)?],
            crs: None,
        }),
        GeoJson::Geometry(geometry) => Ok(ParsedSource {
            records: vec![FeatureRecord {
                id: None,
                properties: JsonObject::new(),
                geometry: Some(convert_geometry(geometry, None, context)?),
            }],
            crs: None,
        }),
    }
}

fn collection_to_source(
    collection: FeatureCollection,
    context: &str,
) -> GeoJsonResult<ParsedSource> {
    let crs = collection
        .foreign_members
        .as_ref()
        .and_then(|members| members.get("crs"))
        .and_then(declared_crs);
    let records = collection
        .features
        .into_iter()
        .enumerate()
        .map(|(i, feature)| feature_to_record(feature, i as u64 + 1, context))
        .collect::<GeoJsonResult<_>>()?;
    Ok(ParsedSource { records, crs })
}

/// CRS from a legacy `crs` member: `{"type": "name", "properties": {"name": ...}}`.
fn declared_crs(member: &JsonValue) -> Option<Crs> {
    member
        .get("properties")
        .and_then(|p| p.get("name"))
        .and_then(JsonValue::as_str)
        .and_then(Crs::parse)
}

fn feature_to_record(
    feature: Feature,
    index: u64,
    context: &str,
) -> GeoJsonResult<FeatureRecord> {
    let geometry = match feature.geometry {
        Some(geometry) => Some(convert_geometry(
            geometry,
            Some(SourcePosition::feature(index)),
            context,
        )?),
        None => None,
    };
    let id = feature.id.map(|id| match id {
        Id::String(s) => s,
        Id::Number(n) => n.to_string(),
    });

    Ok(FeatureRecord {
        id,
        properties: feature.properties.unwrap_or_default(),
        geometry,
    })
}

fn convert_geometry(
    geometry: GeoJsonGeometry,
    position: Option<SourcePosition>,
    context: &str,
) -> GeoJsonResult<Geometry<f64>> {
    geometry.try_into().map_err(|err| {
        GeoJsonError::parse(format!("invalid geometry: {err}"), position, context)
    })
}

fn parse_geojson_sequence(bytes: &[u8], context: &str) -> GeoJsonResult<ParsedSource> {
    let mut source = ParsedSource::default();
    for (line_idx, raw_line) in bytes.split(|b| *b == b'\n').enumerate() {
        let position = SourcePosition::line(line_idx as u64 + 1);
        let line = std::str::from_utf8(raw_line)
            .map_err(|err| {
                let message = format!("not valid UTF-8: {err}");
                GeoJsonError::parse(message, Some(position.clone()), context)
            })?
            .trim();
        if line.is_empty() {
            continue;
        }

        let geojson = line.parse::<GeoJson>().map_err(|err| {
            GeoJsonError::parse(err.to_string(), Some(position.clone()), context)
        })?;
        let mut parsed = geojson_to_source(geojson, context)?;
        source.records.append(&mut parsed.records);
    }

    if source.records.is_empty() {
        return Err(GeoJsonError::parse("no GeoJSON features found", None, context));
    }
    Ok(source)
}

/// Describes JSON value kinds for log messages.
pub(crate) fn describe_value(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

//! `GeoJSON` files as schema-bound features.
//!
//! The schema is inferred from the data: each property becomes a field whose
//! kind fits every non-null value seen, and the geometry kind is the union of
//! the kinds of all geometries. A source without a `crs` member is WGS84.

use std::collections::BTreeMap;
use std::path::Path;

use geojson::JsonValue;
use geoverlay_core_common::{Crs, Feature, FeatureId, Field, FieldKind, GeometryKind, Schema, Value};
use log::{debug, info};

use crate::error::{GeoJsonError, GeoJsonResult};
use crate::parser::{FeatureRecord, ParsedSource, describe_value, parse_geojson_bytes};

/// Name given to the geometry field of every `GeoJSON` schema.
pub const GEOMETRY_FIELD: &str = "geometry";

/// A `GeoJSON` source read into memory.
#[derive(Debug, Clone)]
pub struct GeoJsonDataset {
    /// Inferred schema
    pub schema: Schema,
    /// Features in source order
    pub features: Vec<Feature>,
}

/// Reads a `GeoJSON` file, naming the feature type after the file stem.
///
/// # Errors
///
/// Returns [`GeoJsonError::Io`] when the file cannot be read and
/// [`GeoJsonError::Parse`] when it is not valid `GeoJSON`.
pub fn read_geojson(path: impl AsRef<Path>) -> GeoJsonResult<GeoJsonDataset> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|e| GeoJsonError::io(display.clone(), e))?;
    let type_name = path
        .file_stem()
        .map_or_else(|| "features".to_string(), |s| s.to_string_lossy().into_owned());
    let dataset = read_geojson_bytes(&bytes, &type_name, &display)?;
    info!(
        "Read {} feature(s) from {display} ({})",
        dataset.features.len(),
        dataset.schema.geometry_kind()
    );
    Ok(dataset)
}

/// Reads `GeoJSON` bytes as features of type `type_name`.
///
/// # Errors
///
/// Returns [`GeoJsonError::Parse`] when the bytes are not valid `GeoJSON`.
pub fn read_geojson_bytes(
    bytes: &[u8],
    type_name: &str,
    context: &str,
) -> GeoJsonResult<GeoJsonDataset> {
    let ParsedSource { records, crs } = parse_geojson_bytes(bytes, context)?;
    let schema = infer_schema(type_name, &records, crs.unwrap_or_else(Crs::wgs84));
    let features = records
        .into_iter()
        .enumerate()
        .map(|(i, record)| to_feature(record, &schema, i as u64 + 1))
        .collect();
    Ok(GeoJsonDataset { schema, features })
}

/// Narrowest field kind holding `value`; `None` for null.
fn value_kind(value: &JsonValue) -> Option<FieldKind> {
    match value {
        JsonValue::Null => None,
        JsonValue::Bool(_) => Some(FieldKind::Integer),
        JsonValue::Number(n) if n.is_i64() => Some(FieldKind::Integer),
        JsonValue::Number(_) => Some(FieldKind::Float),
        JsonValue::String(_) | JsonValue::Array(_) | JsonValue::Object(_) => Some(FieldKind::Text),
    }
}

fn widen(current: Option<FieldKind>, seen: FieldKind) -> FieldKind {
    match (current, seen) {
        (None, kind) => kind,
        (Some(a), b) if a == b => a,
        (Some(FieldKind::Integer), FieldKind::Float)
        | (Some(FieldKind::Float), FieldKind::Integer) => FieldKind::Float,
        _ => FieldKind::Text,
    }
}

fn infer_schema(type_name: &str, records: &[FeatureRecord], crs: Crs) -> Schema {
    let mut order: Vec<String> = Vec::new();
    let mut kinds: BTreeMap<String, Option<FieldKind>> = BTreeMap::new();
    let mut geometry_kind: Option<GeometryKind> = None;

    for record in records {
        for (name, value) in &record.properties {
            if name == GEOMETRY_FIELD {
                continue;
            }
            let entry = kinds.entry(name.clone()).or_insert_with(|| {
                order.push(name.clone());
                None
            });
            if let Some(kind) = value_kind(value) {
                if matches!(value, JsonValue::Array(_) | JsonValue::Object(_)) {
                    let found = describe_value(value);
                    debug!("Property '{name}' holds {found} values, stored as text");
                }
                *entry = Some(widen(*entry, kind));
            }
        }
        if let Some(geometry) = &record.geometry {
            let kind = GeometryKind::of(geometry);
            geometry_kind = Some(geometry_kind.map_or(kind, |k| k.union(kind)));
        }
    }

    let mut schema = Schema::new(
        type_name,
        GEOMETRY_FIELD,
        geometry_kind.unwrap_or(GeometryKind::Any),
        Some(crs),
    );
    for name in order {
        let kind = kinds.get(&name).copied().flatten().unwrap_or(FieldKind::Text);
        if let Err(e) = schema.add_field(Field::new(name, kind)) {
            debug!("Skipping property: {e}");
        }
    }
    schema
}

fn to_value(value: &JsonValue, kind: FieldKind) -> Value {
    let raw = match value {
        JsonValue::Null => return Value::Null,
        JsonValue::Bool(b) => Value::Integer(i64::from(*b)),
        JsonValue::Number(n) => n
            .as_i64()
            .map(Value::Integer)
            .or_else(|| n.as_f64().map(Value::Float))
            .unwrap_or(Value::Null),
        JsonValue::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    };
    raw.coerce(kind)
}

fn to_feature(record: FeatureRecord, schema: &Schema, index: u64) -> Feature {
    let id = record
        .id
        .map_or_else(|| FeatureId::sequential(schema.type_name(), index), FeatureId::new);
    let mut feature = Feature::new(id, record.geometry);
    for field in schema.attributes() {
        let value = record
            .properties
            .get(&field.name)
            .map_or(Value::Null, |v| to_value(v, field.kind));
        feature.set(field.name.clone(), value);
    }
    feature
}

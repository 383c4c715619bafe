//! Feature records and attribute values.

use std::collections::BTreeMap;
use std::fmt;

use geo_types::Geometry;
use thiserror::Error;

use crate::schema::{FieldKind, GeometryKind, Schema};

/// Stable, collection-unique identity of a feature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(String);

impl FeatureId {
    /// Wraps an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Builds the `{type_name}.{sequence}` identifier used by pipeline stages.
    #[must_use]
    pub fn sequential(type_name: &str, sequence: u64) -> Self {
        Self(format!("{type_name}.{sequence}"))
    }

    /// Identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attribute value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Missing value; accepted by every attribute kind.
    #[default]
    Null,
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Float(f64),
    /// Text value.
    Text(String),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of the value; text is parsed when it holds a number.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Null => None,
        }
    }

    /// Returns `true` if this value may be stored in a field of `kind`.
    #[must_use]
    pub fn fits(&self, kind: FieldKind) -> bool {
        match (self, kind) {
            (Self::Null, _)
            | (Self::Integer(_), FieldKind::Integer | FieldKind::Float)
            | (Self::Float(_), FieldKind::Float)
            | (Self::Text(_), FieldKind::Text) => true,
            _ => false,
        }
    }

    /// Converts the value into `kind`, returning [`Value::Null`] when the
    /// conversion is not possible.
    #[must_use]
    pub fn coerce(&self, kind: FieldKind) -> Self {
        match kind {
            FieldKind::Integer => match self {
                Self::Integer(v) => Self::Integer(*v),
                other => other
                    .as_f64()
                    .filter(|v| v.is_finite())
                    .map_or(Self::Null, |v| Self::Integer(v.round() as i64)),
            },
            FieldKind::Float => self.as_f64().map_or(Self::Null, Self::Float),
            FieldKind::Text => match self {
                Self::Null => Self::Null,
                other => Self::Text(other.to_string()),
            },
            FieldKind::Geometry(_) => Self::Null,
        }
    }

    /// Name of the value kind, used in error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Integer(_) => "Integer",
            Self::Float(_) => "Float",
            Self::Text(_) => "Text",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str(""),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// One geometric record: identity, optional geometry and named attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Feature identity.
    pub id: FeatureId,
    /// Geometry value; `None` for a null geometry.
    pub geometry: Option<Geometry<f64>>,
    /// Attribute values keyed by field name.
    pub attributes: BTreeMap<String, Value>,
}

impl Feature {
    /// Creates a feature with no attributes.
    #[must_use]
    pub fn new(id: FeatureId, geometry: Option<Geometry<f64>>) -> Self {
        Self {
            id,
            geometry,
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Sets an attribute value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Reads an attribute value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

/// Reasons a feature does not conform to a schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// An attribute is missing, unknown or of the wrong kind.
    #[error("Feature '{feature}' field '{field}': {reason}")]
    FieldMismatch {
        /// Feature identity
        feature: String,
        /// Offending field name
        field: String,
        /// What is wrong with the field
        reason: String,
    },

    /// The geometry does not match the schema geometry kind.
    #[error("Feature '{feature}' has a {found} geometry, schema expects {expected}")]
    GeometryKindMismatch {
        /// Feature identity
        feature: String,
        /// Declared kind
        expected: GeometryKind,
        /// Actual kind
        found: GeometryKind,
    },
}

/// Checks that `feature` has exactly the schema's attributes, in matching
/// kinds, and a geometry accepted by the schema's geometry kind.
///
/// Null and empty geometries always conform.
///
/// # Errors
///
/// Returns the first [`ValidationError`] found.
pub fn validate(feature: &Feature, schema: &Schema) -> Result<(), ValidationError> {
    for field in schema.attributes() {
        let Some(value) = feature.attributes.get(&field.name) else {
            return Err(ValidationError::FieldMismatch {
                feature: feature.id.to_string(),
                field: field.name.clone(),
                reason: "missing".to_string(),
            });
        };
        if !value.fits(field.kind) {
            return Err(ValidationError::FieldMismatch {
                feature: feature.id.to_string(),
                field: field.name.clone(),
                reason: format!("expected {}, found {}", field.kind, value.kind_name()),
            });
        }
    }

    if let Some(extra) = feature
        .attributes
        .keys()
        .find(|name| schema.field(name).is_none_or(|f| f.is_geometry()))
    {
        return Err(ValidationError::FieldMismatch {
            feature: feature.id.to_string(),
            field: extra.clone(),
            reason: "not defined in schema".to_string(),
        });
    }

    if let Some(geometry) = &feature.geometry {
        let expected = schema.geometry_kind();
        if !expected.accepts(geometry) {
            return Err(ValidationError::GeometryKindMismatch {
                feature: feature.id.to_string(),
                expected,
                found: GeometryKind::of(geometry),
            });
        }
    }
    Ok(())
}

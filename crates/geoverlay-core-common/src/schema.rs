//! Field and schema definitions shared by every feature collection.
//!
//! A [`Schema`] is an ordered list of [`Field`]s with exactly one geometry
//! field. Schemas derived from a source schema are append-only: new fields are
//! added at the end, existing fields keep their position and kind unless the
//! geometry kind is explicitly redefined.

use std::fmt;

use geo_types::Geometry;
use thiserror::Error;

/// Errors raised while building or deriving schemas.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A field with the same name but a different kind already exists.
    #[error("Field '{name}' already exists as {existing}, cannot redefine it as {requested}")]
    DuplicateField {
        /// The conflicting field name
        name: String,
        /// Kind of the existing field
        existing: FieldKind,
        /// Kind that was requested
        requested: FieldKind,
    },

    /// A second geometry field was added to a schema.
    #[error("Schema '{type_name}' already has geometry field '{existing}'")]
    MultipleGeometryFields {
        /// Schema type name
        type_name: String,
        /// Name of the geometry field already present
        existing: String,
    },

    /// A field name was empty.
    #[error("Field names must not be empty")]
    EmptyFieldName,
}

/// Geometry kinds a geometry field can declare.
///
/// A multi-part kind also accepts its single-part counterpart, so a
/// `MultiPolygon` field can hold both polygons and multipolygons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    /// Any geometry type.
    Any,
    /// A single point.
    Point,
    /// One or more points.
    MultiPoint,
    /// A single line string.
    LineString,
    /// One or more line strings.
    MultiLineString,
    /// A single polygon.
    Polygon,
    /// One or more polygons.
    MultiPolygon,
}

impl GeometryKind {
    /// Classify a concrete geometry value.
    #[must_use]
    pub fn of(geometry: &Geometry<f64>) -> Self {
        match geometry {
            Geometry::Point(_) => Self::Point,
            Geometry::MultiPoint(_) => Self::MultiPoint,
            Geometry::Line(_) | Geometry::LineString(_) => Self::LineString,
            Geometry::MultiLineString(_) => Self::MultiLineString,
            Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => Self::Polygon,
            Geometry::MultiPolygon(_) => Self::MultiPolygon,
            Geometry::GeometryCollection(_) => Self::Any,
        }
    }

    /// Returns `true` if a geometry of this concrete kind may be stored in a
    /// field declared with `self`.
    #[must_use]
    pub fn accepts(self, geometry: &Geometry<f64>) -> bool {
        let actual = Self::of(geometry);
        match self {
            Self::Any => true,
            Self::MultiPoint => matches!(actual, Self::Point | Self::MultiPoint),
            Self::MultiLineString => matches!(actual, Self::LineString | Self::MultiLineString),
            Self::MultiPolygon => matches!(actual, Self::Polygon | Self::MultiPolygon),
            single => single == actual,
        }
    }

    /// The single-part kind produced when a geometry of this kind is exploded.
    #[must_use]
    pub fn single_part(self) -> Self {
        match self {
            Self::MultiPoint => Self::Point,
            Self::MultiLineString => Self::LineString,
            Self::MultiPolygon => Self::Polygon,
            other => other,
        }
    }

    /// The multi-part kind of the same family.
    #[must_use]
    pub fn multi_part(self) -> Self {
        match self {
            Self::Point => Self::MultiPoint,
            Self::LineString => Self::MultiLineString,
            Self::Polygon => Self::MultiPolygon,
            other => other,
        }
    }

    /// Smallest kind that accepts every geometry accepted by `self` and `other`.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        if self == other {
            self
        } else if self.multi_part() == other.multi_part() {
            self.multi_part()
        } else {
            Self::Any
        }
    }

    /// Returns `true` for point kinds.
    #[must_use]
    pub fn is_point(self) -> bool {
        matches!(self, Self::Point | Self::MultiPoint)
    }

    /// Returns `true` for line kinds.
    #[must_use]
    pub fn is_line(self) -> bool {
        matches!(self, Self::LineString | Self::MultiLineString)
    }

    /// Returns `true` for polygon kinds.
    #[must_use]
    pub fn is_polygon(self) -> bool {
        matches!(self, Self::Polygon | Self::MultiPolygon)
    }

    /// Returns the display name of this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any => "Geometry",
            Self::Point => "Point",
            Self::MultiPoint => "MultiPoint",
            Self::LineString => "LineString",
            Self::MultiLineString => "MultiLineString",
            Self::Polygon => "Polygon",
            Self::MultiPolygon => "MultiPolygon",
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared value kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// 64-bit signed integer.
    Integer,
    /// 64-bit floating point.
    Float,
    /// UTF-8 text.
    Text,
    /// Geometry of the given kind.
    Geometry(GeometryKind),
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => f.write_str("Integer"),
            Self::Float => f.write_str("Float"),
            Self::Text => f.write_str("Text"),
            Self::Geometry(kind) => write!(f, "Geometry({kind})"),
        }
    }
}

/// A named, typed column of a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field name, unique and case-sensitive within a schema.
    pub name: String,
    /// Declared value kind.
    pub kind: FieldKind,
    /// Optional fixed length (text width or numeric digits).
    pub length: Option<u32>,
    /// Optional numeric precision.
    pub precision: Option<u32>,
}

impl Field {
    /// Creates a field without length or precision.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            length: None,
            precision: None,
        }
    }

    /// Sets the fixed length of the field.
    #[must_use]
    pub fn with_length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    /// Sets the numeric precision of the field.
    #[must_use]
    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = Some(precision);
        self
    }

    /// Returns `true` if this is the geometry field.
    #[must_use]
    pub fn is_geometry(&self) -> bool {
        matches!(self.kind, FieldKind::Geometry(_))
    }
}

/// Coordinate reference system descriptor.
///
/// Holds an EPSG code and/or a WKT definition. Comparison for "practical
/// equality" lives in the core crate; this type is pure data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Crs {
    epsg: Option<u32>,
    wkt: Option<String>,
}

impl Crs {
    /// Creates a CRS from an EPSG code.
    #[must_use]
    pub fn from_epsg(code: u32) -> Self {
        Self {
            epsg: Some(code),
            wkt: None,
        }
    }

    /// Creates a CRS from a WKT definition.
    #[must_use]
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            epsg: None,
            wkt: Some(wkt.into()),
        }
    }

    /// WGS84 geographic (EPSG:4326).
    #[must_use]
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// Spherical Web Mercator (EPSG:3857).
    #[must_use]
    pub fn web_mercator() -> Self {
        Self::from_epsg(3857)
    }

    /// EPSG code, if known.
    #[must_use]
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// WKT definition, if known.
    #[must_use]
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Parses identifiers such as `EPSG:4326` or `urn:ogc:def:crs:EPSG::3857`.
    #[must_use]
    pub fn parse(identifier: &str) -> Option<Self> {
        let trimmed = identifier.trim();
        if trimmed.eq_ignore_ascii_case("CRS84") || trimmed.ends_with(":CRS84") {
            return Some(Self::wgs84());
        }
        let upper = trimmed.to_ascii_uppercase();
        if let Some(idx) = upper.find("EPSG") {
            let code: String = upper[idx + 4..]
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(char::is_ascii_digit)
                .collect();
            return code.parse().ok().map(Self::from_epsg);
        }
        if upper.starts_with("GEOGCS")
            || upper.starts_with("PROJCS")
            || upper.starts_with("GEOGCRS")
            || upper.starts_with("PROJCRS")
        {
            return Some(Self::from_wkt(trimmed));
        }
        None
    }

    /// Human readable identifier.
    #[must_use]
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{code}");
        }
        if let Some(wkt) = &self.wkt {
            let head: String = wkt.chars().take(50).collect();
            return format!("WKT:{head}");
        }
        "Unknown".to_string()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier())
    }
}

/// How [`Schema::union`] treats a secondary field whose name is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldUnionPolicy {
    /// A same-name same-kind field is shared; other collisions are suffixed.
    Merge,
    /// Every colliding name is suffixed, so both values survive.
    Disjoint,
}

/// Ordered field list with one geometry field and an optional CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    type_name: String,
    fields: Vec<Field>,
    geometry_index: usize,
    crs: Option<Crs>,
}

impl Schema {
    /// Creates a schema holding only a geometry field.
    #[must_use]
    pub fn new(
        type_name: impl Into<String>,
        geometry_name: impl Into<String>,
        geometry_kind: GeometryKind,
        crs: Option<Crs>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            fields: vec![Field::new(geometry_name, FieldKind::Geometry(geometry_kind))],
            geometry_index: 0,
            crs,
        }
    }

    /// Builder-style [`Schema::add_field`] for hand-written schemas.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] under the same rules as [`Schema::add_field`].
    pub fn with_field(mut self, field: Field) -> Result<Self, SchemaError> {
        self.add_field(field)?;
        Ok(self)
    }

    /// Appends a field.
    ///
    /// A field whose name already exists with the same kind is silently
    /// reused; a different kind is an error.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DuplicateField`] on a kind conflict,
    /// [`SchemaError::MultipleGeometryFields`] when adding a second geometry
    /// field and [`SchemaError::EmptyFieldName`] for an empty name.
    pub fn add_field(&mut self, field: Field) -> Result<(), SchemaError> {
        if field.name.is_empty() {
            return Err(SchemaError::EmptyFieldName);
        }
        if let Some(existing) = self.field(&field.name) {
            if existing.kind == field.kind {
                return Ok(());
            }
            return Err(SchemaError::DuplicateField {
                name: field.name,
                existing: existing.kind,
                requested: field.kind,
            });
        }
        if field.is_geometry() {
            return Err(SchemaError::MultipleGeometryFields {
                type_name: self.type_name.clone(),
                existing: self.geometry_name().to_string(),
            });
        }
        self.fields.push(field);
        Ok(())
    }

    /// Returns a copy with a different type name.
    #[must_use]
    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    /// Returns a copy whose geometry field is redefined to `kind`.
    #[must_use]
    pub fn with_geometry_kind(mut self, kind: GeometryKind) -> Self {
        self.fields[self.geometry_index].kind = FieldKind::Geometry(kind);
        self
    }

    /// Returns a copy with a different CRS.
    #[must_use]
    pub fn with_crs(mut self, crs: Option<Crs>) -> Self {
        self.crs = crs;
        self
    }

    /// Schema type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// All fields in order, geometry included.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Non-geometry fields in order.
    pub fn attributes(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| !f.is_geometry())
    }

    /// Looks up a field by exact name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns `true` if a field with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Name of the geometry field.
    #[must_use]
    pub fn geometry_name(&self) -> &str {
        &self.fields[self.geometry_index].name
    }

    /// Declared geometry kind.
    #[must_use]
    pub fn geometry_kind(&self) -> GeometryKind {
        match self.fields[self.geometry_index].kind {
            FieldKind::Geometry(kind) => kind,
            _ => GeometryKind::Any,
        }
    }

    /// CRS of the geometry field.
    #[must_use]
    pub fn crs(&self) -> Option<&Crs> {
        self.crs.as_ref()
    }

    /// Field-wise union of `self` and `other`.
    ///
    /// Returns the unified schema plus, for every attribute of `other`, the
    /// `(source_name, target_name)` pair it maps to. Conflicting names get the
    /// first free `_1`, `_2`, ... suffix. The geometry kind is widened to cover
    /// both inputs; type name and CRS come from `self`.
    #[must_use]
    pub fn union(
        &self,
        other: &Schema,
        policy: FieldUnionPolicy,
    ) -> (Schema, Vec<(String, String)>) {
        let mut merged = self
            .clone()
            .with_geometry_kind(self.geometry_kind().union(other.geometry_kind()));
        let mut mapping = Vec::new();

        for field in other.attributes() {
            let target = match merged.field(&field.name) {
                None => field.name.clone(),
                Some(existing)
                    if policy == FieldUnionPolicy::Merge && existing.kind == field.kind =>
                {
                    mapping.push((field.name.clone(), field.name.clone()));
                    continue;
                },
                Some(_) => merged.free_name(&field.name),
            };
            let mut renamed = field.clone();
            renamed.name.clone_from(&target);
            merged.fields.push(renamed);
            mapping.push((field.name.clone(), target));
        }

        (merged, mapping)
    }

    fn free_name(&self, base: &str) -> String {
        (1..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| !self.contains(candidate))
            .unwrap_or_else(|| base.to_string())
    }
}

/// Derives a schema from `source` by appending `added` fields.
///
/// # Errors
///
/// Returns [`SchemaError::DuplicateField`] when an added field reuses an
/// existing name with a different kind.
pub fn derive_schema(source: &Schema, added: &[Field]) -> Result<Schema, SchemaError> {
    let mut schema = source.clone();
    for field in added {
        schema.add_field(field.clone())?;
    }
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{Point, Polygon, polygon};

    fn parcels() -> Schema {
        Schema::new("parcels", "geom", GeometryKind::Polygon, Some(Crs::wgs84()))
            .with_field(Field::new("name", FieldKind::Text))
            .unwrap()
            .with_field(Field::new("value", FieldKind::Float))
            .unwrap()
    }

    #[test]
    fn derive_appends_fields() {
        let added = [Field::new("buf_dist", FieldKind::Float)];
        let schema = derive_schema(&parcels(), &added).unwrap();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["geom", "name", "value", "buf_dist"]);
    }

    #[test]
    fn derive_reuses_same_kind_duplicate() {
        let schema = derive_schema(&parcels(), &[Field::new("value", FieldKind::Float)]).unwrap();
        assert_eq!(schema.fields().len(), 3);
    }

    #[test]
    fn derive_rejects_conflicting_duplicate() {
        let err = derive_schema(&parcels(), &[Field::new("value", FieldKind::Text)]).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateField { ref name, .. } if name == "value"));
    }

    #[test]
    fn field_names_are_case_sensitive() {
        let schema = derive_schema(&parcels(), &[Field::new("Name", FieldKind::Integer)]).unwrap();
        assert!(schema.contains("Name"));
        assert!(schema.contains("name"));
    }

    #[test]
    fn second_geometry_field_is_rejected() {
        let err = parcels()
            .with_field(Field::new("other", FieldKind::Geometry(GeometryKind::Point)))
            .unwrap_err();
        assert!(matches!(err, SchemaError::MultipleGeometryFields { .. }));
    }

    #[test]
    fn geometry_kind_acceptance() {
        let poly: Polygon<f64> = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)];
        let geom = Geometry::Polygon(poly);
        assert!(GeometryKind::Polygon.accepts(&geom));
        assert!(GeometryKind::MultiPolygon.accepts(&geom));
        assert!(GeometryKind::Any.accepts(&geom));
        assert!(!GeometryKind::Point.accepts(&geom));
        assert!(!GeometryKind::Polygon.accepts(&Geometry::Point(Point::new(0.0, 0.0))));
    }

    #[test]
    fn geometry_kind_union_widens() {
        assert_eq!(GeometryKind::Polygon.union(GeometryKind::Polygon), GeometryKind::Polygon);
        assert_eq!(
            GeometryKind::Polygon.union(GeometryKind::MultiPolygon),
            GeometryKind::MultiPolygon
        );
        assert_eq!(GeometryKind::Point.union(GeometryKind::Polygon), GeometryKind::Any);
    }

    #[test]
    fn merge_union_shares_same_kind_fields() {
        let other = Schema::new("zones", "geometry", GeometryKind::Polygon, None)
            .with_field(Field::new("name", FieldKind::Text))
            .unwrap()
            .with_field(Field::new("value", FieldKind::Integer))
            .unwrap()
            .with_field(Field::new("zone", FieldKind::Text))
            .unwrap();

        let (merged, mapping) = parcels().union(&other, FieldUnionPolicy::Merge);
        let names: Vec<&str> = merged.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["geom", "name", "value", "value_1", "zone"]);
        assert_eq!(
            mapping,
            vec![
                ("name".to_string(), "name".to_string()),
                ("value".to_string(), "value_1".to_string()),
                ("zone".to_string(), "zone".to_string()),
            ]
        );
        assert_eq!(merged.crs(), Some(&Crs::wgs84()));
    }

    #[test]
    fn disjoint_union_suffixes_every_collision() {
        let other = parcels().with_field(Field::new("name_1", FieldKind::Text)).unwrap();
        let (merged, mapping) = parcels().union(&other, FieldUnionPolicy::Disjoint);
        let names: Vec<&str> = merged.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["geom", "name", "value", "name_1", "value_1", "name_1_1"]);
        assert_eq!(mapping[2], ("name_1".to_string(), "name_1_1".to_string()));
    }

    #[test]
    fn parse_crs_identifiers() {
        assert_eq!(Crs::parse("EPSG:4326"), Some(Crs::wgs84()));
        assert_eq!(Crs::parse("urn:ogc:def:crs:EPSG::3857"), Some(Crs::web_mercator()));
        assert_eq!(Crs::parse("urn:ogc:def:crs:OGC:1.3:CRS84"), Some(Crs::wgs84()));
        assert!(Crs::parse("nonsense").is_none());
    }
}

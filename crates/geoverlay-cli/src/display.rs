//! Display utilities for formatting CLI output.
//!
//! Table rows and printing helpers for dataset summaries.

use tabled::{Table, Tabled};

use geoverlay_core::types::DatasetInfo;
use geoverlay_core_common::Schema;

/// Table row representation for displaying the geometry field.
#[derive(Tabled)]
pub struct GeometryRow {
    /// Name of the geometry field.
    #[tabled(rename = "Column")]
    pub name: String,
    /// Declared geometry kind.
    #[tabled(rename = "Kind")]
    pub kind: String,
    /// Coordinate Reference System information.
    #[tabled(rename = "CRS")]
    pub crs: String,
}

/// Table row representation for displaying attribute fields.
#[derive(Tabled)]
pub struct FieldRow {
    /// Name of the field.
    #[tabled(rename = "Field")]
    pub name: String,
    /// Value kind of the field.
    #[tabled(rename = "Type")]
    pub kind: String,
    /// Declared width.
    #[tabled(rename = "Length")]
    pub length: String,
}

fn geometry_rows(info: &DatasetInfo) -> Vec<GeometryRow> {
    vec![GeometryRow {
        name: info.geometry.name.clone(),
        kind: info.geometry.kind.clone(),
        crs: info.geometry.crs.clone().unwrap_or_else(|| "N/A".to_string()),
    }]
}

fn field_rows(info: &DatasetInfo) -> Vec<FieldRow> {
    info.fields
        .iter()
        .map(|f| FieldRow {
            name: f.name.clone(),
            kind: f.kind.clone(),
            length: f.length.map_or_else(|| "-".to_string(), |l| l.to_string()),
        })
        .collect()
}

fn extent_line(info: &DatasetInfo) -> String {
    match info.extent {
        Some(rect) => format!(
            "Extent: ({}, {}) - ({}, {})",
            rect.min().x,
            rect.min().y,
            rect.max().x,
            rect.max().y
        ),
        None => "Extent: N/A".to_string(),
    }
}

/// Display dataset information in formatted tables on standard output.
pub fn display_dataset_info(info: &DatasetInfo) {
    println!("\nDataset: {}", info.dataset);
    println!("Feature type: {}", info.type_name);
    println!("Features: {}", info.feature_count);
    if info.empty_geometries > 0 {
        println!("Features without geometry: {}", info.empty_geometries);
    }
    println!("{}", extent_line(info));

    println!("\n=== Geometry ===");
    println!("{}", Table::new(geometry_rows(info)));

    if info.fields.is_empty() {
        println!("\nNo attribute fields.");
    } else {
        println!("\n=== Fields ===");
        println!("{}", Table::new(field_rows(info)));
    }
}

/// Print the outcome of a completed run.
pub fn display_summary(schema: &Schema, count: u64, output: &str) {
    println!(
        "Wrote {count} {} feature(s) with {} field(s) to {output}",
        schema.geometry_kind(),
        schema.attributes().count()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{Coord, Rect};
    use geoverlay_core::types::{FieldInfo, GeometryColumnInfo};

    fn info(extent: Option<Rect<f64>>) -> DatasetInfo {
        DatasetInfo {
            dataset: "parks.geojson".to_string(),
            type_name: "parks".to_string(),
            geometry: GeometryColumnInfo {
                name: "geometry".to_string(),
                kind: "Polygon".to_string(),
                crs: None,
            },
            fields: vec![FieldInfo {
                name: "name".to_string(),
                kind: "Text".to_string(),
                length: Some(40),
            }],
            feature_count: 2,
            empty_geometries: 0,
            extent,
        }
    }

    #[test]
    fn tables_render_rows() {
        let info = info(None);
        let geometry = Table::new(geometry_rows(&info)).to_string();
        assert!(geometry.contains("Polygon"));
        assert!(geometry.contains("N/A"));
        let fields = Table::new(field_rows(&info)).to_string();
        assert!(fields.contains("Length"));
        assert!(fields.contains("40"));
    }

    #[test]
    fn extent_is_formatted() {
        let rect = Rect::new(Coord { x: 0.0, y: -1.0 }, Coord { x: 2.5, y: 3.0 });
        assert_eq!(extent_line(&info(Some(rect))), "Extent: (0, -1) - (2.5, 3)");
        assert_eq!(extent_line(&info(None)), "Extent: N/A");
    }
}

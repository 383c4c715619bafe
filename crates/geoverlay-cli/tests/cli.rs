use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

const SITES: &str = r#"{"type": "FeatureCollection", "features": [
    {"type": "Feature", "properties": {"name": "a", "radius": 1.0},
     "geometry": {"type": "Point", "coordinates": [0.0, 0.0]}},
    {"type": "Feature", "properties": {"name": "b", "radius": null},
     "geometry": {"type": "Point", "coordinates": [5.0, 5.0]}}
]}"#;

fn square(x: f64, y: f64, owner: &str) -> String {
    format!(
        r#"{{"type": "Feature", "properties": {{"owner": "{owner}"}},
            "geometry": {{"type": "Polygon", "coordinates":
            [[[{x}, {y}], [{x1}, {y}], [{x1}, {y1}], [{x}, {y1}], [{x}, {y}]]]}}}}"#,
        x1 = x + 1.0,
        y1 = y + 1.0
    )
}

fn collection(features: &[String]) -> String {
    format!(r#"{{"type": "FeatureCollection", "features": [{}]}}"#, features.join(","))
}

fn fixture(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn geoverlay() -> Command {
    Command::cargo_bin("geoverlay").unwrap()
}

#[test]
fn help_lists_operations() {
    geoverlay()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("buffer"))
        .stdout(predicate::str::contains("count-points"));
}

#[test]
fn info_reports_schema_and_count() {
    let dir = TempDir::new().unwrap();
    let sites = fixture(&dir, "sites.geojson", SITES);
    geoverlay()
        .arg("info")
        .arg(&sites)
        .assert()
        .success()
        .stdout(predicate::str::contains("Features: 2"))
        .stdout(predicate::str::contains("radius"))
        .stdout(predicate::str::contains("Point"));
}

#[test]
fn buffer_by_field_skips_null_distances() {
    let dir = TempDir::new().unwrap();
    let sites = fixture(&dir, "sites.geojson", SITES);
    let output = dir.path().join("buffered.geojson");
    geoverlay()
        .args(["buffer", "--field", "radius", "-i"])
        .arg(&sites)
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 1 MultiPolygon feature(s)"));

    let json = read_json(&output);
    let features = json["features"].as_array().unwrap();
    assert_eq!(features.len(), 1);
    assert_eq!(features[0]["properties"]["name"], "a");
    assert_eq!(features[0]["properties"]["buf_dist"], 1.0);
    assert_eq!(features[0]["geometry"]["type"], "MultiPolygon");
}

#[test]
fn union_splits_overlapping_squares() {
    let dir = TempDir::new().unwrap();
    let a = fixture(&dir, "a.geojson", &collection(&[square(0.0, 0.0, "a")]));
    let b = fixture(&dir, "b.geojson", &collection(&[square(0.5, 0.5, "b")]));
    let output = dir.path().join("union.geojson");
    geoverlay()
        .arg("union")
        .arg("-i")
        .arg(&a)
        .arg("--overlay")
        .arg(&b)
        .arg("-o")
        .arg(&output)
        .assert()
        .success();

    let json = read_json(&output);
    let features = json["features"].as_array().unwrap();
    assert_eq!(features.len(), 3);
    let both = features
        .iter()
        .filter(|f| f["properties"]["owner"] == "a" && f["properties"]["owner_1"] == "b")
        .count();
    assert_eq!(both, 1);
}

#[test]
fn wrong_geometry_kind_is_reported_with_hint() {
    let dir = TempDir::new().unwrap();
    let sites = fixture(&dir, "sites.geojson", SITES);
    let output = dir.path().join("counts.geojson");
    geoverlay()
        .arg("count-points")
        .arg("--polygons")
        .arg(&sites)
        .arg("--points")
        .arg(&sites)
        .arg("-o")
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Hint:"));
    assert!(!output.exists());
}

#[test]
fn missing_distance_is_a_configuration_error() {
    let dir = TempDir::new().unwrap();
    let sites = fixture(&dir, "sites.geojson", SITES);
    geoverlay()
        .arg("buffer")
        .arg("-i")
        .arg(&sites)
        .arg("-o")
        .arg(dir.path().join("out.geojson"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn bounding_circle_encloses_square() {
    let dir = TempDir::new().unwrap();
    let parcels = fixture(&dir, "parcels.geojson", &collection(&[square(2.0, 2.0, "a")]));
    let output = dir.path().join("circles.geojson");
    geoverlay()
        .arg("bounding-circle")
        .arg("-i")
        .arg(&parcels)
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 1 Polygon feature(s)"));

    let json = read_json(&output);
    let feature = &json["features"][0];
    assert_eq!(feature["properties"]["owner"], "a");
    assert_eq!(feature["geometry"]["type"], "Polygon");
    let ring = feature["geometry"]["coordinates"][0].as_array().unwrap();
    for position in ring {
        let x = position[0].as_f64().unwrap() - 2.5;
        let y = position[1].as_f64().unwrap() - 2.5;
        assert!((x.hypot(y) - 0.5_f64.sqrt()).abs() < 1e-9);
    }
}

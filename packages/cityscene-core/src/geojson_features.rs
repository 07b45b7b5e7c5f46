// GeoJSON point layer for vegetation
use std::path::Path;

use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, Value};
use log::info;
use serde_json::json;

use crate::compression::write_json;
use crate::error::Result;
use crate::models::round_to;
use crate::projection::crs_urn;
use crate::vegetation::VegetationPoint;

/// One 3D point per retained vegetation cell, at terrain level, with
/// `height` and `baseElevation` properties.
pub fn vegetation_feature(point: &VegetationPoint) -> Feature {
    let base = round_to(point.base, 2);
    let mut properties = JsonObject::new();
    properties.insert("height".to_string(), json!(round_to(point.height, 2)));
    properties.insert("baseElevation".to_string(), json!(base));

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::Point(vec![point.x, point.y, base]))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// FeatureCollection carrying the layer `name` and the legacy `crs` member.
pub fn vegetation_collection(name: &str, epsg: u32, points: &[VegetationPoint]) -> FeatureCollection {
    let mut members = JsonObject::new();
    members.insert("name".to_string(), json!(name));
    members.insert(
        "crs".to_string(),
        json!({ "type": "name", "properties": { "name": crs_urn(epsg) } }),
    );

    FeatureCollection {
        bbox: None,
        features: points.iter().map(vegetation_feature).collect(),
        foreign_members: Some(members),
    }
}

pub fn write_vegetation_layer(
    path: &Path,
    name: &str,
    epsg: u32,
    points: &[VegetationPoint],
) -> Result<()> {
    let collection = vegetation_collection(name, epsg, points);
    let bytes = write_json(path, &GeoJson::FeatureCollection(collection))?;
    info!(
        "Wrote {} vegetation points to {} ({} bytes)",
        points.len(),
        path.display(),
        bytes
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(cell: usize, x: f64) -> VegetationPoint {
        VegetationPoint {
            cell,
            x,
            y: 5_030_000.5,
            height: 7.26,
            base: 212.337,
        }
    }

    #[test]
    fn collection_carries_name_and_crs() {
        let collection = vegetation_collection("Vegetation", 26919, &[tree(0, 10.5), tree(4, 14.5)]);
        let value = serde_json::to_value(GeoJson::FeatureCollection(collection)).expect("json");

        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["name"], "Vegetation");
        assert_eq!(
            value["crs"]["properties"]["name"],
            "urn:ogc:def:crs:EPSG::26919"
        );

        let features = value["features"].as_array().expect("features");
        assert_eq!(features.len(), 2);
        let first = &features[0];
        assert_eq!(first["geometry"]["type"], "Point");
        assert_eq!(first["geometry"]["coordinates"][0], 10.5);
        assert_eq!(first["geometry"]["coordinates"][2], 212.34);
        assert_eq!(first["properties"]["height"], 7.26);
        assert_eq!(first["properties"]["baseElevation"], 212.34);
    }

    #[test]
    fn layer_round_trips_through_the_geojson_parser() {
        let path = std::env::temp_dir().join(format!("cityscene-{}-veg.geojson", std::process::id()));
        write_vegetation_layer(&path, "Vegetation", 26919, &[tree(0, 1.0)]).expect("write");

        let text = std::fs::read_to_string(&path).expect("read");
        let parsed: GeoJson = text.parse().expect("valid geojson");
        match parsed {
            GeoJson::FeatureCollection(fc) => {
                assert_eq!(fc.features.len(), 1);
                assert_eq!(crate::footprints::detect_crs(&fc).expect("crs"), 26919);
            }
            other => panic!("expected a FeatureCollection, got {:?}", other),
        }
        let _ = std::fs::remove_file(&path);
    }
}

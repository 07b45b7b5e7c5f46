//! CityJSON scene writer.
//!
//! The writer owns the shared vertex table and the object map. Objects are
//! appended in a fixed order by a single producer; [`CityJsonWriter::save`]
//! consumes the writer, so nothing can be added once the document is out.

use std::path::Path;

use geo::Coord;
use log::info;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::compression::write_json;
use crate::config::OutputConfig;
use crate::error::{ExtrusionError, Result, SceneError};
use crate::extrude::{extrude_box, extrude_ring, ExtrudeOptions};
use crate::models::CityObject;
use crate::object_keys::{make_building_key, make_vegetation_key, FootprintId};
use crate::projection::reference_system_uri;
use crate::vertices::{VertexPool, VertexTransform};

/// `CityObjects`, serialized as a JSON object in insertion order.
#[derive(Debug, Clone, Default)]
pub struct ObjectMap(Vec<(String, CityObject)>);

impl ObjectMap {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&CityObject> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CityObject)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Serialize for ObjectMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, object) in &self.0 {
            map.serialize_entry(key, object)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub reference_system: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geographical_extent: Option<[f64; 6]>,
}

/// Complete document, materialized in memory before writing.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CityJsonDocument {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub version: String,
    pub metadata: Metadata,
    pub transform: VertexTransform,
    #[serde(rename = "CityObjects")]
    pub city_objects: ObjectMap,
    pub vertices: Vec<[i64; 3]>,
}

#[derive(Debug)]
pub struct CityJsonWriter {
    version: String,
    epsg: u32,
    building_prefix: String,
    vegetation_prefix: String,
    extent: Option<[f64; 6]>,
    pool: VertexPool,
    objects: ObjectMap,
    buildings: usize,
    vegetation: usize,
}

impl CityJsonWriter {
    pub fn new(output: &OutputConfig, epsg: u32) -> Result<Self> {
        if !output.transform.is_valid() {
            return Err(SceneError::Config(
                "vertex transform scale must be positive and finite".to_string(),
            ));
        }
        Ok(Self {
            version: output.cityjson_version.clone(),
            epsg,
            building_prefix: output.building_prefix.clone(),
            vegetation_prefix: output.vegetation_prefix.clone(),
            extent: None,
            pool: VertexPool::new(output.transform),
            objects: ObjectMap::default(),
            buildings: 0,
            vegetation: 0,
        })
    }

    /// `[minx, miny, minz, maxx, maxy, maxz]` of the scene.
    pub fn set_extent(&mut self, extent: [f64; 6]) {
        self.extent = Some(extent);
    }

    /// Extrude a footprint ring and store it as `Building`. Nothing is stored
    /// when extrusion fails.
    pub fn add_building(
        &mut self,
        id: FootprintId,
        ring: &[Coord<f64>],
        base: f64,
        height: f64,
        options: ExtrudeOptions,
    ) -> std::result::Result<(), ExtrusionError> {
        let solid = extrude_ring(ring, base, height, options, &mut self.pool)?;
        let key = make_building_key(&self.building_prefix, id);
        self.objects
            .0
            .push((key, CityObject::building(solid, height, base)));
        self.buildings += 1;
        Ok(())
    }

    /// Box of side `width` centred on `(x, y)`, stored as
    /// `SolitaryVegetationObject` under the next vegetation id.
    pub fn add_vegetation(
        &mut self,
        x: f64,
        y: f64,
        base: f64,
        height: f64,
        width: f64,
    ) -> std::result::Result<(), ExtrusionError> {
        let solid = extrude_box(x, y, base, height, width, &mut self.pool)?;
        let key = make_vegetation_key(&self.vegetation_prefix, self.vegetation);
        self.objects
            .0
            .push((key, CityObject::vegetation(solid, height, base)));
        self.vegetation += 1;
        Ok(())
    }

    pub fn building_count(&self) -> usize {
        self.buildings
    }

    pub fn vegetation_count(&self) -> usize {
        self.vegetation
    }

    pub fn vertex_count(&self) -> usize {
        self.pool.len()
    }

    pub fn into_document(self) -> CityJsonDocument {
        CityJsonDocument {
            kind: "CityJSON",
            metadata: Metadata {
                reference_system: reference_system_uri(self.epsg, &self.version),
                geographical_extent: self.extent,
            },
            version: self.version,
            transform: *self.pool.transform(),
            city_objects: self.objects,
            vertices: self.pool.into_quantized(),
        }
    }

    /// Write the scene to `path` (gzip when it ends in `.gz`).
    pub fn save(self, path: &Path) -> Result<CityJsonDocument> {
        let document = self.into_document();
        let bytes = write_json(path, &document)?;
        info!(
            "Wrote {} city objects and {} vertices to {} ({} bytes)",
            document.city_objects.len(),
            document.vertices.len(),
            path.display(),
            bytes
        );
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CityObjectType;

    fn square(x0: f64) -> Vec<Coord<f64>> {
        vec![
            Coord { x: x0, y: 0.0 },
            Coord { x: x0 + 10.0, y: 0.0 },
            Coord { x: x0 + 10.0, y: 10.0 },
            Coord { x: x0, y: 10.0 },
            Coord { x: x0, y: 0.0 },
        ]
    }

    fn writer(version: &str) -> CityJsonWriter {
        let output = OutputConfig {
            cityjson_version: version.to_string(),
            ..OutputConfig::default()
        };
        CityJsonWriter::new(&output, 26919).expect("writer")
    }

    #[test]
    fn document_has_the_cityjson_layout() {
        let mut scene = writer("2.0");
        scene.set_extent([0.0, 0.0, 100.0, 20.0, 10.0, 112.0]);
        scene
            .add_building(FootprintId::new(3, 0), &square(0.0), 100.0, 12.0, ExtrudeOptions::default())
            .expect("building");
        scene.add_vegetation(15.5, 5.5, 101.0, 4.25, 0.7).expect("tree");

        let value = serde_json::to_value(scene.into_document()).expect("json");
        assert_eq!(value["type"], "CityJSON");
        assert_eq!(value["version"], "2.0");
        assert_eq!(
            value["metadata"]["referenceSystem"],
            "https://www.opengis.net/def/crs/EPSG/0/26919"
        );
        assert_eq!(value["metadata"]["geographicalExtent"][5], 112.0);
        assert_eq!(value["transform"]["scale"][0], 0.01);

        let building = &value["CityObjects"]["Bat_3_0"];
        assert_eq!(building["type"], "Building");
        assert_eq!(building["attributes"]["measuredHeight"], 12.0);
        assert_eq!(building["attributes"]["baseElevation"], 100.0);
        assert_eq!(building["geometry"][0]["type"], "Solid");
        assert_eq!(building["geometry"][0]["lod"], "1");
        assert_eq!(building["geometry"][0]["boundaries"][0].as_array().map(Vec::len), Some(6));

        let tree = &value["CityObjects"]["Veg_0"];
        assert_eq!(tree["type"], "SolitaryVegetationObject");
        assert_eq!(tree["attributes"]["height"], 4.3);
        assert!(tree["attributes"].get("measuredHeight").is_none());

        // integer vertices, 8 per box
        let vertices = value["vertices"].as_array().expect("vertices");
        assert_eq!(vertices.len(), 16);
        assert!(vertices.iter().all(|v| v[0].is_i64()));
    }

    #[test]
    fn object_keys_keep_insertion_order() {
        let mut scene = writer("2.0");
        for src in [10, 2, 7] {
            scene
                .add_building(
                    FootprintId::new(src, 0),
                    &square(src as f64 * 20.0),
                    0.0,
                    5.0,
                    ExtrudeOptions::default(),
                )
                .expect("building");
        }
        let text = serde_json::to_string(&scene.into_document()).expect("json");
        let a = text.find("Bat_10_0").expect("first");
        let b = text.find("Bat_2_0").expect("second");
        let c = text.find("Bat_7_0").expect("third");
        assert!(a < b && b < c);
    }

    #[test]
    fn failed_extrusion_stores_nothing() {
        let mut scene = writer("2.0");
        let line = vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 0.0 }];
        assert!(scene
            .add_building(FootprintId::new(0, 0), &line, 0.0, 5.0, ExtrudeOptions::default())
            .is_err());
        assert_eq!(scene.building_count(), 0);
        assert_eq!(scene.vertex_count(), 0);
        assert!(scene.into_document().city_objects.is_empty());
    }

    #[test]
    fn legacy_versions_use_the_urn() {
        let document = writer("1.1").into_document();
        assert_eq!(document.metadata.reference_system, "urn:ogc:def:crs:EPSG::26919");
        assert!(document.metadata.geographical_extent.is_none());
    }

    #[test]
    fn save_writes_the_document() {
        let path = std::env::temp_dir().join(format!("cityscene-{}-save.city.json", std::process::id()));
        let mut scene = writer("2.0");
        scene.add_vegetation(0.0, 0.0, 0.0, 3.0, 1.0).expect("tree");
        let document = scene.save(&path).expect("save");
        assert_eq!(
            document.city_objects.get("Veg_0").map(|o| o.object_type),
            Some(CityObjectType::SolitaryVegetationObject)
        );

        let text = std::fs::read_to_string(&path).expect("read");
        let value: serde_json::Value = serde_json::from_str(&text).expect("json");
        assert_eq!(value["CityObjects"]["Veg_0"]["attributes"]["height"], 3.0);
        let _ = std::fs::remove_file(&path);
    }
}

// Run configuration. Every field has a default, so a JSON file only needs to
// name what differs.
use std::path::{Path, PathBuf};

use geo::{Coord, LineString, Polygon};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SceneError};
use crate::vertices::VertexTransform;

/// How the height of a building is read from the nDSM cells it covers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HeightStatistic {
    Max,
    /// Percentile in `[0, 100]` with linear interpolation between ranks.
    Percentile { q: f64 },
}

/// Subsampling of vegetation candidates in scan order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StridePolicy {
    /// Keep every `step`-th candidate.
    Fixed { step: usize },
    /// Pick the smallest step that keeps at most `max` candidates.
    MaxObjects { max: usize },
}

/// Order in which the spatial deduplication pass considers points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionOrder {
    /// Raster scan order (row by row).
    ScanOrder,
    /// Highest nDSM value first; ties keep scan order.
    TallestFirst,
}

/// Where retained vegetation cells end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VegetationOutput {
    /// Box solids in the CityJSON scene.
    Solids,
    /// Points in the GeoJSON layer.
    Points,
    Both,
}

impl VegetationOutput {
    pub fn solids(self) -> bool {
        matches!(self, VegetationOutput::Solids | VegetationOutput::Both)
    }

    pub fn points(self) -> bool {
        matches!(self, VegetationOutput::Points | VegetationOutput::Both)
    }
}

/// Study area polygon, given in its own CRS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropRegion {
    #[serde(default = "default_crop_epsg")]
    pub epsg: u32,
    pub ring: Vec<[f64; 2]>,
}

fn default_crop_epsg() -> u32 {
    crate::projection::WGS84
}

impl CropRegion {
    pub fn to_polygon(&self) -> Polygon<f64> {
        let coords: Vec<Coord<f64>> = self.ring.iter().map(|&[x, y]| Coord { x, y }).collect();
        Polygon::new(LineString::from(coords), vec![])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildingConfig {
    /// Buildings lower than this (metres) are dropped.
    pub min_height: f64,
    pub height_statistic: HeightStatistic,
    /// Topology-preserving simplification tolerance applied before extrusion.
    pub simplify_tolerance: Option<f64>,
    pub orient_ccw: bool,
    /// Keep only footprints intersecting the crop region, when one is set.
    pub filter_to_crop: bool,
}

impl Default for BuildingConfig {
    fn default() -> Self {
        Self {
            min_height: 3.0,
            height_statistic: HeightStatistic::Max,
            simplify_tolerance: None,
            orient_ccw: true,
            filter_to_crop: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VegetationConfig {
    pub enabled: bool,
    /// Cells must be strictly taller than this (metres).
    pub min_height: f64,
    pub stride: StridePolicy,
    /// Minimum distance between retained points; `None` disables the pass.
    pub min_separation: Option<f64>,
    pub selection_order: SelectionOrder,
    /// Box width = cell size * stride * factor.
    pub box_width_factor: f64,
    pub emit: VegetationOutput,
    pub progress_every: usize,
}

impl Default for VegetationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_height: 2.5,
            stride: StridePolicy::MaxObjects { max: 200_000 },
            min_separation: None,
            selection_order: SelectionOrder::ScanOrder,
            box_width_factor: 0.7,
            emit: VegetationOutput::Solids,
            progress_every: 20_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub cityjson_version: String,
    pub transform: VertexTransform,
    pub building_prefix: String,
    pub vegetation_prefix: String,
    /// `name` of the GeoJSON vegetation layer.
    pub vegetation_layer_name: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            cityjson_version: "2.0".to_string(),
            transform: VertexTransform::default(),
            building_prefix: "Bat".to_string(),
            vegetation_prefix: "Veg".to_string(),
            vegetation_layer_name: "Vegetation".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub dsm_path: PathBuf,
    pub dtm_path: PathBuf,
    pub footprints_path: PathBuf,
    pub cityjson_output: Option<PathBuf>,
    pub geojson_output: Option<PathBuf>,
    pub target_epsg: u32,
    pub crop: Option<CropRegion>,
    /// Raster values at or below this are treated as nodata.
    pub nodata_floor: f64,
    /// Worker threads for footprint sampling; `None` uses every core.
    pub threads: Option<usize>,
    pub buildings: BuildingConfig,
    pub vegetation: VegetationConfig,
    pub output: OutputConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dsm_path: PathBuf::from("dsm.tif"),
            dtm_path: PathBuf::from("dtm.tif"),
            footprints_path: PathBuf::from("buildings.geojson"),
            cityjson_output: Some(PathBuf::from("scene.city.json")),
            geojson_output: None,
            target_epsg: 26919,
            crop: None,
            nodata_floor: -100.0,
            threads: None,
            buildings: BuildingConfig::default(),
            vegetation: VegetationConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Whole-tile run: max height, light simplification, vegetation boxes
    /// capped at 200 000 objects.
    pub fn full_tile() -> Self {
        let mut config = Self::default();
        config.buildings.simplify_tolerance = Some(0.5);
        config
    }

    /// Campus run: cropped to the study polygon, 90th percentile heights,
    /// vegetation as thinned points in a separate GeoJSON layer.
    pub fn campus() -> Self {
        let mut config = Self::default();
        config.crop = Some(CropRegion {
            epsg: crate::projection::WGS84,
            ring: vec![
                [-71.933067, 45.381338],
                [-71.924435, 45.381351],
                [-71.924429, 45.377744],
                [-71.932799, 45.377691],
            ],
        });
        config.buildings.height_statistic = HeightStatistic::Percentile { q: 90.0 };
        config.vegetation.stride = StridePolicy::Fixed { step: 2 };
        config.vegetation.min_separation = Some(3.5);
        config.vegetation.emit = VegetationOutput::Points;
        config.output.cityjson_version = "1.1".to_string();
        config.cityjson_output = Some(PathBuf::from("buildings_campus.city.json"));
        config.geojson_output = Some(PathBuf::from("vegetation_campus.geojson"));
        config
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| SceneError::io(path, e))?;
        let config: Self = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot honour.
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(SceneError::Config(msg));

        if !self.buildings.min_height.is_finite() || self.buildings.min_height < 0.0 {
            return bad(format!("building min_height {} must be >= 0", self.buildings.min_height));
        }
        if let HeightStatistic::Percentile { q } = self.buildings.height_statistic {
            if !(0.0..=100.0).contains(&q) {
                return bad(format!("height percentile {} is outside [0, 100]", q));
            }
        }
        if let Some(tol) = self.buildings.simplify_tolerance {
            if !tol.is_finite() || tol < 0.0 {
                return bad(format!("simplify_tolerance {} must be >= 0", tol));
            }
        }

        let veg = &self.vegetation;
        if !veg.min_height.is_finite() || veg.min_height < 0.0 {
            return bad(format!("vegetation min_height {} must be >= 0", veg.min_height));
        }
        match veg.stride {
            StridePolicy::Fixed { step: 0 } => return bad("stride step must be >= 1".to_string()),
            StridePolicy::MaxObjects { max: 0 } => {
                return bad("max vegetation objects must be >= 1".to_string())
            }
            _ => {}
        }
        if let Some(d) = veg.min_separation {
            if !d.is_finite() || d <= 0.0 {
                return bad(format!("min_separation {} must be > 0", d));
            }
        }
        if !veg.box_width_factor.is_finite() || veg.box_width_factor <= 0.0 {
            return bad(format!("box_width_factor {} must be > 0", veg.box_width_factor));
        }

        if !self.output.transform.is_valid() {
            return bad("vertex transform scale must be positive and finite".to_string());
        }
        if let Some(crop) = &self.crop {
            if crop.ring.len() < 3 {
                return bad(format!("crop ring has {} points, needs 3", crop.ring.len()));
            }
        }
        if self.threads == Some(0) {
            return bad("threads must be >= 1".to_string());
        }

        if self.cityjson_output.is_none() {
            return bad("cityjson_output is required".to_string());
        }
        if veg.enabled && veg.emit.points() && self.geojson_output.is_none() {
            return bad("vegetation points requested but geojson_output is not set".to_string());
        }
        Ok(())
    }
}

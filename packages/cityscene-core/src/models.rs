// This is the models module containing shared data structures
use serde::{Deserialize, Serialize};

use crate::error::FootprintFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CityObjectType {
    Building,
    SolitaryVegetationObject,
}

/// LOD1 solid. `boundaries[shell][surface][ring]` holds vertex indices;
/// the only shell is `[floor, roof, wall...]`, one ring per surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solid {
    #[serde(rename = "type")]
    pub kind: String,
    pub lod: String,
    pub boundaries: Vec<Vec<Vec<Vec<u32>>>>,
}

impl Solid {
    pub fn lod1(surfaces: Vec<Vec<Vec<u32>>>) -> Self {
        Self {
            kind: "Solid".to_string(),
            lod: "1".to_string(),
            boundaries: vec![surfaces],
        }
    }

    /// Surfaces of the outer shell.
    pub fn surfaces(&self) -> &[Vec<Vec<u32>>] {
        self.boundaries.first().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn face_count(&self) -> usize {
        self.surfaces().len()
    }

    pub fn vertex_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.boundaries
            .iter()
            .flatten()
            .flatten()
            .flatten()
            .copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measured_height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    pub base_elevation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityObject {
    #[serde(rename = "type")]
    pub object_type: CityObjectType,
    pub attributes: ObjectAttributes,
    pub geometry: Vec<Solid>,
}

impl CityObject {
    pub fn building(solid: Solid, height: f64, base_elevation: f64) -> Self {
        Self {
            object_type: CityObjectType::Building,
            attributes: ObjectAttributes {
                measured_height: Some(round_to(height, 2)),
                height: None,
                base_elevation: round_to(base_elevation, 2),
            },
            geometry: vec![solid],
        }
    }

    pub fn vegetation(solid: Solid, height: f64, base_elevation: f64) -> Self {
        Self {
            object_type: CityObjectType::SolitaryVegetationObject,
            attributes: ObjectAttributes {
                measured_height: None,
                height: Some(round_to(height, 1)),
                base_elevation: round_to(base_elevation, 2),
            },
            geometry: vec![solid],
        }
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub footprints_read: usize,
    pub buildings: usize,
    pub below_threshold: usize,
    pub skipped: Vec<FootprintFailure>,
    pub vegetation_candidates: usize,
    pub vegetation_stride: usize,
    pub vegetation_objects: usize,
    pub vegetation_points: usize,
    pub vertices: usize,
}

impl RunSummary {
    /// First `limit` skipped footprints, for diagnostics.
    pub fn skipped_sample(&self, limit: usize) -> &[FootprintFailure] {
        &self.skipped[..self.skipped.len().min(limit)]
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

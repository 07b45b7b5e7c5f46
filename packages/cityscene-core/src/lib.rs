//! LOD1 city scenes from elevation rasters and building footprints.
//!
//! Buildings are extruded from their footprints using the normalized surface
//! model (DSM minus DTM); tall cells outside every footprint become
//! vegetation boxes or points. The scene is written as CityJSON with a
//! shared, quantized vertex table.

// Import our error types
pub mod error;
// Import our configuration
pub mod config;
// Import our models
pub mod models;
// Object identifiers
pub mod object_keys;
// Import our shared vertex table
pub mod vertices;
// Import our elevation processing module
pub mod elevation;
// Import our coordinate reference system helpers
pub mod projection;
// Gzip input and output
pub mod compression;
// Import our footprint layer
pub mod footprints;
// Import our bbox filter module
pub mod bbox_filter;
// Import our geometry functions
#[path = "../geometry_functions/extrude.rs"]
pub mod extrude;
pub mod buildings;
pub mod vegetation;
// Import our CityJSON writer
pub mod cityjson;
// Import our geojson features module
pub mod geojson_features;
pub mod pipeline;

pub use cityjson::{CityJsonDocument, CityJsonWriter};
pub use config::PipelineConfig;
pub use error::{Result, SceneError};
pub use models::RunSummary;
pub use pipeline::{build_scene, run};

use std::path::PathBuf;

use thiserror::Error;

use crate::object_keys::FootprintId;

/// Fatal errors: bad inputs, bad configuration or a failed write.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode raster {path}: {source}")]
    Tiff {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },

    #[error("raster {path} has no usable georeference (ModelPixelScale/ModelTiepoint tags)")]
    MissingGeoreference { path: PathBuf },

    #[error("raster {path} uses an unsupported sample format")]
    UnsupportedSampleFormat { path: PathBuf },

    #[error("DSM and DTM grids differ: DSM is {dsm:?}, DTM is {dtm:?}")]
    GridMismatch {
        dsm: (usize, usize),
        dtm: (usize, usize),
    },

    #[error("DSM and DTM are not georeferenced identically")]
    GeoreferenceMismatch,

    #[error("crop region does not overlap the raster extent")]
    CropOutsideRaster,

    #[error("failed to parse footprints {path}: {source}")]
    GeoJson {
        path: PathBuf,
        #[source]
        source: geojson::Error,
    },

    #[error("unrecognised coordinate reference system '{0}'")]
    UnsupportedCrs(String),

    #[error("cannot reproject EPSG:{from} to EPSG:{to}: {reason}")]
    Reprojection { from: u32, to: u32, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
}

impl SceneError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SceneError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Why a single footprint produced no building.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SkipReason {
    #[error("empty geometry")]
    EmptyGeometry,

    #[error("unsupported geometry type {0}")]
    UnsupportedGeometry(String),

    #[error("footprint covers no valid raster cell")]
    NoRasterCoverage,

    #[error("could not reproject footprint: {0}")]
    Reprojection(String),

    #[error(transparent)]
    Extrusion(#[from] ExtrusionError),
}

/// Extrusion failures are detected before any vertex is stored.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtrusionError {
    #[error("ring has {distinct} distinct points, at least 3 are required")]
    Degenerate { distinct: usize },

    #[error("ring contains a non-finite coordinate")]
    NonFiniteCoordinate,

    #[error("invalid extrusion height {0}")]
    InvalidHeight(f64),
}

/// A footprint that was recorded and skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct FootprintFailure {
    pub id: FootprintId,
    pub reason: SkipReason,
}

impl std::fmt::Display for FootprintFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "footprint {}: {}", self.id, self.reason)
    }
}

pub type Result<T, E = SceneError> = std::result::Result<T, E>;

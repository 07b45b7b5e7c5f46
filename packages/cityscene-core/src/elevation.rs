//! Elevation rasters: GeoTIFF loading, cropping, footprint rasterization and
//! the normalized height field (DSM minus DTM).

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use geo::{BoundingRect, Contains, Point, Polygon, Rect};
use log::{debug, info};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use crate::error::{Result, SceneError};

/// North-up affine georeference: cell `(row, col)` has its top-left corner
/// at `(origin_x + col * pixel_width, origin_y + row * pixel_height)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    /// Negative for north-up rasters.
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Build from GeoTIFF tags. A 4x4 model transformation wins over the
    /// scale + tiepoint pair when both are present.
    pub fn from_geotiff_tags(
        pixel_scale: Option<&[f64]>,
        tiepoint: Option<&[f64]>,
        transformation: Option<&[f64]>,
    ) -> Option<Self> {
        if let Some(m) = transformation {
            if m.len() >= 8 && m[1] == 0.0 && m[4] == 0.0 {
                return Some(Self {
                    origin_x: m[3],
                    origin_y: m[7],
                    pixel_width: m[0],
                    pixel_height: m[5],
                });
            }
        }
        let scale = pixel_scale?;
        let tie = tiepoint?;
        if scale.len() < 2 || tie.len() < 6 || scale[0] <= 0.0 || scale[1] <= 0.0 {
            return None;
        }
        // tiepoint is (i, j, k, x, y, z): raster (i, j) sits at model (x, y)
        Some(Self {
            origin_x: tie[3] - tie[0] * scale[0],
            origin_y: tie[4] + tie[1] * scale[1],
            pixel_width: scale[0],
            pixel_height: -scale[1],
        })
    }

    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y + (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Mean absolute cell edge length.
    pub fn cell_size(&self) -> f64 {
        (self.pixel_width.abs() + self.pixel_height.abs()) / 2.0
    }

    pub fn bounds(&self, width: usize, height: usize) -> Rect<f64> {
        let x1 = self.origin_x + width as f64 * self.pixel_width;
        let y1 = self.origin_y + height as f64 * self.pixel_height;
        Rect::new((self.origin_x, self.origin_y), (x1, y1))
    }

    /// Half-open cell window `(row0..row1, col0..col1)` covering `rect`,
    /// clamped to a `width` x `height` grid.
    pub fn window(
        &self,
        rect: &Rect<f64>,
        width: usize,
        height: usize,
    ) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
        let clamp = |v: f64, max: usize| -> usize {
            if v.is_nan() || v <= 0.0 {
                0
            } else {
                (v as usize).min(max)
            }
        };
        let c_a = (rect.min().x - self.origin_x) / self.pixel_width;
        let c_b = (rect.max().x - self.origin_x) / self.pixel_width;
        let r_a = (rect.min().y - self.origin_y) / self.pixel_height;
        let r_b = (rect.max().y - self.origin_y) / self.pixel_height;
        let col0 = clamp(c_a.min(c_b).floor(), width);
        let col1 = clamp(c_a.max(c_b).ceil(), width);
        let row0 = clamp(r_a.min(r_b).floor(), height);
        let row1 = clamp(r_a.max(r_b).ceil(), height);
        (row0..row1, col0..col1)
    }

    fn shifted(&self, row0: usize, col0: usize) -> Self {
        Self {
            origin_x: self.origin_x + col0 as f64 * self.pixel_width,
            origin_y: self.origin_y + row0 as f64 * self.pixel_height,
            ..*self
        }
    }

    fn approx_eq(&self, other: &Self) -> bool {
        let tol = 1e-6 * self.cell_size().max(1.0);
        (self.origin_x - other.origin_x).abs() <= tol
            && (self.origin_y - other.origin_y).abs() <= tol
            && (self.pixel_width - other.pixel_width).abs() <= tol
            && (self.pixel_height - other.pixel_height).abs() <= tol
    }
}

/// Single-band raster, row-major from the north-west corner.
#[derive(Debug, Clone)]
pub struct Raster {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub data: Vec<f64>,
    pub nodata: Option<f64>,
}

impl Raster {
    pub fn new(
        width: usize,
        height: usize,
        transform: GeoTransform,
        data: Vec<f64>,
        nodata: Option<f64>,
    ) -> Result<Self> {
        if data.len() != width * height {
            return Err(SceneError::Config(format!(
                "raster data has {} cells, expected {}x{}",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            transform,
            data,
            nodata,
        })
    }

    /// Read band 1 of a GeoTIFF.
    pub fn load_geotiff(path: &Path) -> Result<Self> {
        let tiff_err = |source: tiff::TiffError| SceneError::Tiff {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(|e| SceneError::io(path, e))?;
        let mut decoder = Decoder::new(BufReader::new(file))
            .map_err(tiff_err)?
            .with_limits(Limits::unlimited());

        let (width, height) = decoder.dimensions().map_err(tiff_err)?;
        let (width, height) = (width as usize, height as usize);

        let mut f64_tag = |tag: Tag| -> Result<Option<Vec<f64>>> {
            match decoder.find_tag(tag).map_err(tiff_err)? {
                Some(value) => Ok(Some(value.into_f64_vec().map_err(tiff_err)?)),
                None => Ok(None),
            }
        };
        let scale = f64_tag(Tag::ModelPixelScaleTag)?;
        let tiepoint = f64_tag(Tag::ModelTiepointTag)?;
        let matrix = f64_tag(Tag::ModelTransformationTag)?;
        let transform = GeoTransform::from_geotiff_tags(
            scale.as_deref(),
            tiepoint.as_deref(),
            matrix.as_deref(),
        )
        .ok_or_else(|| SceneError::MissingGeoreference {
            path: path.to_path_buf(),
        })?;

        let nodata = decoder
            .find_tag(Tag::GdalNodata)
            .map_err(tiff_err)?
            .and_then(|value| value.into_string().ok())
            .and_then(|s| {
                s.trim_matches(|c: char| c == '\0' || c.is_whitespace())
                    .parse::<f64>()
                    .ok()
            });

        #[allow(unreachable_patterns)]
        let samples: Vec<f64> = match decoder.read_image().map_err(tiff_err)? {
            DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::F64(v) => v,
            DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::U64(v) => v.into_iter().map(|s| s as f64).collect(),
            DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::I64(v) => v.into_iter().map(|s| s as f64).collect(),
            _ => {
                return Err(SceneError::UnsupportedSampleFormat {
                    path: path.to_path_buf(),
                })
            }
        };

        let cells = width * height;
        if cells == 0 || samples.len() < cells || samples.len() % cells != 0 {
            return Err(SceneError::UnsupportedSampleFormat {
                path: path.to_path_buf(),
            });
        }
        // Chunky multi-band layout: keep the first sample of every pixel.
        let bands = samples.len() / cells;
        let data = if bands == 1 {
            samples
        } else {
            samples.into_iter().step_by(bands).collect()
        };

        info!(
            "Loaded {}: {}x{} cells, cell size {:.3}, nodata {:?}",
            path.display(),
            width,
            height,
            transform.cell_size(),
            nodata
        );

        Self::new(width, height, transform, data, nodata)
    }

    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }

    /// A cell holds data when it is finite, differs from the declared nodata
    /// value and lies above `floor`.
    pub fn is_valid_value(&self, value: f64, floor: f64) -> bool {
        value.is_finite() && Some(value) != self.nodata && value > floor
    }

    /// Crop to the bounding window of `polygon`; cells whose centre falls
    /// outside the polygon are blanked.
    pub fn crop_to_polygon(&self, polygon: &Polygon<f64>) -> Result<Self> {
        let rect = polygon.bounding_rect().ok_or(SceneError::CropOutsideRaster)?;
        let (rows, cols) = self.transform.window(&rect, self.width, self.height);
        if rows.is_empty() || cols.is_empty() {
            return Err(SceneError::CropOutsideRaster);
        }
        let transform = self.transform.shifted(rows.start, cols.start);
        let (width, height) = (cols.len(), rows.len());
        let mut data = Vec::with_capacity(width * height);
        for r in rows.clone() {
            for c in cols.clone() {
                let (x, y) = transform.cell_center(r - rows.start, c - cols.start);
                if polygon.contains(&Point::new(x, y)) {
                    data.push(self.data[self.index(r, c)]);
                } else {
                    data.push(f64::NAN);
                }
            }
        }
        debug!(
            "Cropped raster to rows {:?}, cols {:?} ({}x{})",
            rows, cols, width, height
        );
        Self::new(width, height, transform, data, self.nodata)
    }
}

/// Indices of the cells of a `width` x `height` grid whose centre lies inside
/// `polygon` (holes excluded).
pub fn rasterize_polygon(
    transform: &GeoTransform,
    width: usize,
    height: usize,
    polygon: &Polygon<f64>,
) -> Vec<usize> {
    let Some(rect) = polygon.bounding_rect() else {
        return Vec::new();
    };
    let (rows, cols) = transform.window(&rect, width, height);
    let mut cells = Vec::new();
    for r in rows {
        for c in cols.clone() {
            let (x, y) = transform.cell_center(r, c);
            if polygon.contains(&Point::new(x, y)) {
                cells.push(r * width + c);
            }
        }
    }
    cells
}

/// Terrain plus normalized surface height, ready for sampling.
#[derive(Debug, Clone)]
pub struct ElevationModel {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    terrain: Vec<f64>,
    ndsm: Vec<f64>,
    valid: Vec<bool>,
    /// Lowest valid terrain value and highest valid surface value.
    pub z_range: Option<(f64, f64)>,
}

impl ElevationModel {
    /// Pair a DSM with its DTM. Both must share shape and georeference.
    pub fn new(dsm: &Raster, dtm: &Raster, nodata_floor: f64) -> Result<Self> {
        if dsm.width != dtm.width || dsm.height != dtm.height {
            return Err(SceneError::GridMismatch {
                dsm: (dsm.width, dsm.height),
                dtm: (dtm.width, dtm.height),
            });
        }
        if !dsm.transform.approx_eq(&dtm.transform) {
            return Err(SceneError::GeoreferenceMismatch);
        }

        let cells = dsm.width * dsm.height;
        let mut ndsm = vec![0.0; cells];
        let mut valid = vec![false; cells];
        let mut z_min = f64::INFINITY;
        let mut z_max = f64::NEG_INFINITY;

        for i in 0..cells {
            let s = dsm.data[i];
            let t = dtm.data[i];
            let s_ok = dsm.is_valid_value(s, nodata_floor);
            let t_ok = dtm.is_valid_value(t, nodata_floor);
            if s_ok {
                z_max = z_max.max(s);
            }
            if t_ok {
                z_min = z_min.min(t);
            }
            if s_ok && t_ok {
                ndsm[i] = (s - t).max(0.0);
                valid[i] = true;
            }
        }

        let z_range = (z_min.is_finite() && z_max.is_finite()).then_some((z_min, z_max));
        debug!(
            "nDSM computed over {} cells, {} valid, z range {:?}",
            cells,
            valid.iter().filter(|v| **v).count(),
            z_range
        );

        Ok(Self {
            width: dsm.width,
            height: dsm.height,
            transform: dsm.transform,
            terrain: dtm.data.clone(),
            ndsm,
            valid,
            z_range,
        })
    }

    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }

    pub fn is_valid(&self, idx: usize) -> bool {
        self.valid[idx]
    }

    /// Normalized height (>= 0) of a cell.
    pub fn ndsm(&self, idx: usize) -> f64 {
        self.ndsm[idx]
    }

    pub fn terrain(&self, idx: usize) -> f64 {
        self.terrain[idx]
    }

    pub fn cell_center(&self, idx: usize) -> (f64, f64) {
        self.transform
            .cell_center(idx / self.width, idx % self.width)
    }

    pub fn bounds(&self) -> Rect<f64> {
        self.transform.bounds(self.width, self.height)
    }
}

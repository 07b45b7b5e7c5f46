//! One parameterized run: rasters and footprints in, CityJSON scene and
//! optional vegetation point layer out.

use geo::{BoundingRect, Polygon};
use log::{info, warn};

use crate::bbox_filter::StudyArea;
use crate::buildings::extrude_buildings;
use crate::cityjson::CityJsonWriter;
use crate::config::PipelineConfig;
use crate::elevation::{ElevationModel, Raster};
use crate::error::{Result, SceneError};
use crate::footprints::{load_footprints, FootprintLayer};
use crate::geojson_features::write_vegetation_layer;
use crate::models::RunSummary;
use crate::projection;
use crate::vegetation::{synthesize, VegetationPoint};

/// Skipped footprints listed in the end-of-run log.
const SKIP_SAMPLE: usize = 10;

/// Result of the in-memory part of a run.
#[derive(Debug)]
pub struct SceneBuild {
    pub scene: CityJsonWriter,
    /// Vegetation points destined for the GeoJSON layer (empty when the run
    /// emits boxes only).
    pub vegetation_points: Vec<VegetationPoint>,
    pub summary: RunSummary,
}

/// `[minx, miny, minz, maxx, maxy, maxz]`: horizontal bounds of the crop
/// polygon when there is one, else of the rasters; vertical bounds from the
/// lowest valid terrain and highest valid surface.
pub fn scene_extent(model: &ElevationModel, crop: Option<&Polygon<f64>>) -> Option<[f64; 6]> {
    let (z_min, z_max) = model.z_range?;
    let rect = crop
        .and_then(|c| c.bounding_rect())
        .unwrap_or_else(|| model.bounds());
    Some([
        rect.min().x,
        rect.min().y,
        z_min,
        rect.max().x,
        rect.max().y,
        z_max,
    ])
}

/// Build the scene from loaded inputs. Footprints and crop polygon must
/// already be in the target CRS; the rasters are cropped here.
pub fn build_scene(
    dsm: &Raster,
    dtm: &Raster,
    mut layer: FootprintLayer,
    crop: Option<&Polygon<f64>>,
    config: &PipelineConfig,
) -> Result<SceneBuild> {
    config.validate()?;

    let model = match crop {
        Some(polygon) => {
            let dsm = dsm.crop_to_polygon(polygon)?;
            let dtm = dtm.crop_to_polygon(polygon)?;
            ElevationModel::new(&dsm, &dtm, config.nodata_floor)?
        }
        None => ElevationModel::new(dsm, dtm, config.nodata_floor)?,
    };
    info!(
        "Elevation model {}x{} cells, cell size {} m",
        model.width,
        model.height,
        model.transform.cell_size()
    );

    if let (Some(polygon), true) = (crop, config.buildings.filter_to_crop) {
        if let Some(area) = StudyArea::new(polygon.clone()) {
            let removed = layer.retain(|f| area.intersects(&f.polygon));
            info!("{} footprints outside the study area dropped", removed);
        }
    }

    let mut scene = CityJsonWriter::new(&config.output, config.target_epsg)?;
    if let Some(extent) = scene_extent(&model, crop) {
        scene.set_extent(extent);
    } else {
        warn!("No valid elevation cell, the scene has no geographical extent");
    }

    let buildings = extrude_buildings(&model, &layer.footprints, &config.buildings, &mut scene);

    let mut summary = RunSummary {
        footprints_read: layer.feature_count,
        buildings: buildings.built,
        below_threshold: buildings.below_threshold,
        ..RunSummary::default()
    };
    summary.skipped = layer.skipped;
    summary.skipped.extend(buildings.failures);

    let mut vegetation_points = Vec::new();
    let veg = &config.vegetation;
    if veg.enabled {
        let writer = veg.emit.solids().then_some(&mut scene);
        let outcome = synthesize(&model, &buildings.mask, veg, writer);
        summary.vegetation_candidates = outcome.candidates;
        summary.vegetation_stride = outcome.stride;
        summary.vegetation_objects = outcome.objects;
        if veg.emit.points() {
            summary.vegetation_points = outcome.points.len();
            vegetation_points = outcome.points;
        }
    }
    summary.vertices = scene.vertex_count();

    Ok(SceneBuild {
        scene,
        vegetation_points,
        summary,
    })
}

/// Crop polygon converted to the target CRS.
fn crop_polygon(config: &PipelineConfig) -> Result<Option<Polygon<f64>>> {
    let Some(crop) = &config.crop else {
        return Ok(None);
    };
    let reprojector = projection::reprojector(crop.epsg, config.target_epsg)?;
    let polygon = reprojector
        .reproject_polygon(&crop.to_polygon())
        .map_err(|reason| SceneError::Reprojection {
            from: crop.epsg,
            to: config.target_epsg,
            reason,
        })?;
    Ok(Some(polygon))
}

/// Full run: load inputs, build the scene, write every requested output.
pub fn run(config: &PipelineConfig) -> Result<RunSummary> {
    config.validate()?;

    let crop = crop_polygon(config)?;
    let dsm = Raster::load_geotiff(&config.dsm_path)?;
    let dtm = Raster::load_geotiff(&config.dtm_path)?;
    let layer = load_footprints(&config.footprints_path, config.target_epsg)?;

    let build = build_scene(&dsm, &dtm, layer, crop.as_ref(), config)?;

    // validate() guarantees a scene path
    if let Some(path) = &config.cityjson_output {
        build.scene.save(path)?;
    }
    if config.vegetation.enabled && config.vegetation.emit.points() {
        if let Some(path) = &config.geojson_output {
            write_vegetation_layer(
                path,
                &config.output.vegetation_layer_name,
                config.target_epsg,
                &build.vegetation_points,
            )?;
        }
    }
    Ok(build.summary)
}

pub fn log_summary(summary: &RunSummary) {
    info!("Footprint features read: {}", summary.footprints_read);
    info!("Buildings: {}", summary.buildings);
    info!("Below height threshold: {}", summary.below_threshold);
    info!(
        "Vegetation: {} candidates, stride {}, {} objects, {} points",
        summary.vegetation_candidates,
        summary.vegetation_stride,
        summary.vegetation_objects,
        summary.vegetation_points
    );
    info!("Vertices: {}", summary.vertices);
    if !summary.skipped.is_empty() {
        warn!("Skipped footprints: {}", summary.skipped.len());
        for failure in summary.skipped_sample(SKIP_SAMPLE) {
            warn!("  {}", failure);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elevation::GeoTransform;
    use geo::polygon;

    fn flat_model(value: f64) -> ElevationModel {
        let t = GeoTransform {
            origin_x: 100.0,
            origin_y: 220.0,
            pixel_width: 1.0,
            pixel_height: -1.0,
        };
        let r = Raster::new(20, 20, t, vec![value; 400], None).expect("raster");
        ElevationModel::new(&r, &r, -100.0).expect("model")
    }

    #[test]
    fn extent_uses_raster_bounds_without_crop() {
        let extent = scene_extent(&flat_model(30.0), None).expect("extent");
        assert_eq!(extent, [100.0, 200.0, 30.0, 120.0, 220.0, 30.0]);
    }

    #[test]
    fn extent_uses_crop_bounds_when_cropping() {
        let crop = polygon![(x: 105.0, y: 205.0), (x: 110.0, y: 205.0), (x: 110.0, y: 212.0)];
        let extent = scene_extent(&flat_model(30.0), Some(&crop)).expect("extent");
        assert_eq!(extent, [105.0, 205.0, 30.0, 110.0, 212.0, 30.0]);
    }

    #[test]
    fn extent_needs_valid_cells() {
        assert!(scene_extent(&flat_model(f64::NAN), None).is_none());
    }

    #[test]
    fn crop_in_the_target_crs_needs_no_transformation() {
        let mut config = PipelineConfig::default();
        config.crop = Some(crate::config::CropRegion {
            epsg: config.target_epsg,
            ring: vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]],
        });
        let polygon = crop_polygon(&config).expect("crop").expect("polygon");
        assert_eq!(polygon.exterior().0.len(), 4);
    }
}

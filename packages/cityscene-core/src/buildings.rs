//! Building extrusion.
//!
//! Sampling reads the elevation model only, so it runs on the rayon pool.
//! Everything that mutates shared state (occupancy mask, vertex table,
//! object map) happens afterwards in a sequential merge in footprint order,
//! which keeps the output identical to a single-threaded run.

use geo::{Polygon, SimplifyVwPreserve};
use log::{debug, info};
use rayon::prelude::*;

use crate::cityjson::CityJsonWriter;
use crate::config::{BuildingConfig, HeightStatistic};
use crate::elevation::ElevationModel;
use crate::error::{FootprintFailure, SkipReason};
use crate::extrude::ExtrudeOptions;
use crate::footprints::Footprint;
use crate::object_keys::FootprintId;

/// Percentile with linear interpolation between closest ranks
/// (`rank = q / 100 * (n - 1)`). Sorts `values` in place.
pub fn percentile(values: &mut [f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let rank = (q.clamp(0.0, 100.0) / 100.0) * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(values[lo] + (values[hi] - values[lo]) * frac)
}

pub fn sample_height(values: &mut [f64], statistic: HeightStatistic) -> Option<f64> {
    match statistic {
        HeightStatistic::Max => values.iter().copied().reduce(f64::max),
        HeightStatistic::Percentile { q } => percentile(values, q),
    }
}

/// What the elevation model says about one footprint.
#[derive(Debug, Clone)]
pub struct FootprintSample {
    pub id: FootprintId,
    /// Cells (valid or not) whose centre lies inside the footprint.
    pub cells: Vec<usize>,
    /// Sampled height and base elevation, `None` without valid cells.
    pub measure: Option<(f64, f64)>,
}

/// Height statistic over the valid nDSM cells and lowest terrain under them.
pub fn sample_footprint(
    model: &ElevationModel,
    footprint: &Footprint,
    statistic: HeightStatistic,
) -> FootprintSample {
    let cells = crate::elevation::rasterize_polygon(
        &model.transform,
        model.width,
        model.height,
        &footprint.polygon,
    );

    let mut heights = Vec::with_capacity(cells.len());
    let mut base = f64::INFINITY;
    for &idx in &cells {
        if model.is_valid(idx) {
            heights.push(model.ndsm(idx));
            base = base.min(model.terrain(idx));
        }
    }

    let measure = sample_height(&mut heights, statistic).map(|h| (h, base));
    FootprintSample {
        id: footprint.id,
        cells,
        measure,
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildingOutcome {
    /// Cells covered by any footprint, whatever its height.
    pub mask: Vec<bool>,
    pub built: usize,
    pub below_threshold: usize,
    pub failures: Vec<FootprintFailure>,
}

fn simplified(polygon: &Polygon<f64>, tolerance: Option<f64>) -> Polygon<f64> {
    match tolerance {
        Some(eps) if eps > 0.0 => polygon.simplify_vw_preserve(&eps),
        _ => polygon.clone(),
    }
}

/// Sample every footprint in parallel, then extrude those tall enough into
/// `writer` in footprint order.
pub fn extrude_buildings(
    model: &ElevationModel,
    footprints: &[Footprint],
    config: &BuildingConfig,
    writer: &mut CityJsonWriter,
) -> BuildingOutcome {
    info!("Processing {} footprints", footprints.len());

    let samples: Vec<FootprintSample> = footprints
        .par_iter()
        .map(|footprint| sample_footprint(model, footprint, config.height_statistic))
        .collect();

    let options = ExtrudeOptions {
        orient_ccw: config.orient_ccw,
    };
    let mut outcome = BuildingOutcome {
        mask: vec![false; model.cell_count()],
        ..BuildingOutcome::default()
    };

    for (footprint, sample) in footprints.iter().zip(samples) {
        for &idx in &sample.cells {
            outcome.mask[idx] = true;
        }

        let Some((height, base)) = sample.measure else {
            outcome.failures.push(FootprintFailure {
                id: sample.id,
                reason: SkipReason::NoRasterCoverage,
            });
            continue;
        };
        if height < config.min_height {
            outcome.below_threshold += 1;
            continue;
        }

        let polygon = simplified(&footprint.polygon, config.simplify_tolerance);
        match writer.add_building(sample.id, &polygon.exterior().0, base, height, options) {
            Ok(()) => outcome.built += 1,
            Err(e) => outcome.failures.push(FootprintFailure {
                id: sample.id,
                reason: e.into(),
            }),
        }
    }

    debug!(
        "Occupancy mask covers {} cells",
        outcome.mask.iter().filter(|m| **m).count()
    );
    info!(
        "{} buildings extruded, {} below {} m, {} skipped",
        outcome.built,
        outcome.below_threshold,
        config.min_height,
        outcome.failures.len()
    );
    outcome
}

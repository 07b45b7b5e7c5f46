//! Vegetation synthesis from the nDSM.
//!
//! Candidates are tall cells outside every footprint. Their number is then
//! reduced by a stride over the scan order and, optionally, by a minimum
//! separation enforced with an R-tree.

use log::{debug, info, warn};
use rstar::primitives::GeomWithData;
use rstar::RTree;

use crate::cityjson::CityJsonWriter;
use crate::config::{SelectionOrder, StridePolicy, VegetationConfig};
use crate::elevation::ElevationModel;

/// One vegetated cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VegetationPoint {
    /// Row-major cell index, which is also the scan order.
    pub cell: usize,
    pub x: f64,
    pub y: f64,
    /// nDSM value of the cell.
    pub height: f64,
    /// Terrain elevation of the cell.
    pub base: f64,
}

/// Cells valid in both rasters, strictly taller than `min_height` and not
/// covered by a footprint, in raster scan order.
pub fn collect_candidates(
    model: &ElevationModel,
    mask: &[bool],
    min_height: f64,
) -> Vec<VegetationPoint> {
    (0..model.cell_count())
        .filter(|&idx| model.is_valid(idx))
        .filter(|&idx| !mask.get(idx).copied().unwrap_or(false))
        .filter(|&idx| model.ndsm(idx) > min_height)
        .map(|idx| {
            let (x, y) = model.cell_center(idx);
            VegetationPoint {
                cell: idx,
                x,
                y,
                height: model.ndsm(idx),
                base: model.terrain(idx),
            }
        })
        .collect()
}

/// Step between kept candidates. With a ceiling `M` over `C` candidates the
/// step is `ceil(C / M)` when `C > M`, else 1.
pub fn compute_stride(candidates: usize, policy: StridePolicy) -> usize {
    match policy {
        StridePolicy::Fixed { step } => step.max(1),
        StridePolicy::MaxObjects { max } => {
            let max = max.max(1);
            if candidates > max {
                candidates.div_ceil(max)
            } else {
                1
            }
        }
    }
}

/// Greedy minimum-distance thinning. Points are considered in `order`; each
/// kept point suppresses every not yet considered point strictly closer than
/// `min_distance`. The survivors are returned in scan order.
pub fn enforce_min_distance(
    points: &[VegetationPoint],
    min_distance: f64,
    order: SelectionOrder,
) -> Vec<VegetationPoint> {
    let tree = RTree::bulk_load(
        points
            .iter()
            .enumerate()
            .map(|(i, p)| GeomWithData::new([p.x, p.y], i))
            .collect(),
    );

    let mut visit: Vec<usize> = (0..points.len()).collect();
    if order == SelectionOrder::TallestFirst {
        // stable, so equal heights keep scan order
        visit.sort_by(|&a, &b| points[b].height.total_cmp(&points[a].height));
    }

    let limit = min_distance * min_distance;
    let mut suppressed = vec![false; points.len()];
    let mut kept = vec![false; points.len()];
    for i in visit {
        if suppressed[i] {
            continue;
        }
        kept[i] = true;
        let p = points[i];
        for neighbour in tree.locate_within_distance([p.x, p.y], limit) {
            let j = neighbour.data;
            if j == i || kept[j] {
                continue;
            }
            let [nx, ny] = *neighbour.geom();
            let d2 = (nx - p.x).powi(2) + (ny - p.y).powi(2);
            if d2 < limit {
                suppressed[j] = true;
            }
        }
    }

    points
        .iter()
        .zip(kept)
        .filter_map(|(p, k)| k.then_some(*p))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct VegetationOutcome {
    pub candidates: usize,
    pub stride: usize,
    /// Side of the emitted boxes.
    pub box_width: f64,
    /// Retained points, in scan order.
    pub points: Vec<VegetationPoint>,
    /// Box solids written to the scene.
    pub objects: usize,
}

/// Select vegetation points and, when `writer` is given, store one box per
/// point in the scene.
pub fn synthesize(
    model: &ElevationModel,
    mask: &[bool],
    config: &VegetationConfig,
    writer: Option<&mut CityJsonWriter>,
) -> VegetationOutcome {
    let candidates = collect_candidates(model, mask, config.min_height);
    let stride = compute_stride(candidates.len(), config.stride);
    let box_width = model.transform.cell_size() * stride as f64 * config.box_width_factor;
    info!(
        "{} vegetation candidates above {} m, stride {}",
        candidates.len(),
        config.min_height,
        stride
    );

    let strided: Vec<VegetationPoint> = candidates.iter().step_by(stride).copied().collect();
    let points = match config.min_separation {
        Some(d) => {
            let thinned = enforce_min_distance(&strided, d, config.selection_order);
            debug!(
                "Minimum separation {} m kept {} of {} points",
                d,
                thinned.len(),
                strided.len()
            );
            thinned
        }
        None => strided,
    };

    let mut outcome = VegetationOutcome {
        candidates: candidates.len(),
        stride,
        box_width,
        points,
        objects: 0,
    };

    if let Some(writer) = writer {
        let every = config.progress_every.max(1);
        for point in &outcome.points {
            match writer.add_vegetation(point.x, point.y, point.base, point.height, box_width) {
                Ok(()) => {
                    outcome.objects += 1;
                    if outcome.objects % every == 0 {
                        info!("  ... {} vegetation objects", outcome.objects);
                    }
                }
                Err(e) => warn!("Skipping vegetation cell {}: {}", point.cell, e),
            }
        }
        info!("{} vegetation objects added", outcome.objects);
    }
    outcome
}

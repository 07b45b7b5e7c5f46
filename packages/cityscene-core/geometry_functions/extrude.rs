use geo::Coord;

use crate::error::ExtrusionError;
use crate::models::Solid;
use crate::vertices::{VertexPool, VertexTransform};

/// Extrusion options.
#[derive(Clone, Copy, Debug)]
pub struct ExtrudeOptions {
    /// Re-wind clockwise rings counter-clockwise so that roofs face up and
    /// walls face outward.
    pub orient_ccw: bool,
}

impl Default for ExtrudeOptions {
    fn default() -> Self {
        Self { orient_ccw: true }
    }
}

/// Helper function to check if points are in clockwise order
fn is_clockwise(points: &[Coord<f64>]) -> bool {
    let mut area = 0.0;
    for i in 0..points.len() {
        let j = (i + 1) % points.len();
        area += points[i].x * points[j].y;
        area -= points[j].x * points[i].y;
    }
    area < 0.0
}

/// Planimetric lattice key of a point, as the vertex table would store it.
fn xy_key(transform: &VertexTransform, c: &Coord<f64>) -> [i64; 2] {
    let [x, y, _] = transform.encode(c.x, c.y, 0.0);
    [x, y]
}

/// Checks a ring without touching the vertex table and returns it open,
/// oriented as requested, and without consecutive points that quantize to
/// the same vertex. The closing point is dropped when it quantizes onto the
/// first one.
fn prepare_ring(
    coords: &[Coord<f64>],
    height: f64,
    options: ExtrudeOptions,
    transform: &VertexTransform,
) -> Result<Vec<Coord<f64>>, ExtrusionError> {
    if !height.is_finite() || height <= 0.0 {
        return Err(ExtrusionError::InvalidHeight(height));
    }
    if coords.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err(ExtrusionError::NonFiniteCoordinate);
    }

    let mut points: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
    let mut keys: Vec<[i64; 2]> = Vec::with_capacity(coords.len());
    for c in coords {
        let key = xy_key(transform, c);
        if keys.last() != Some(&key) {
            points.push(*c);
            keys.push(key);
        }
    }
    while keys.len() > 1 && keys.first() == keys.last() {
        keys.pop();
        points.pop();
    }

    keys.sort_unstable();
    keys.dedup();
    let distinct = keys.len();
    if distinct < 3 {
        return Err(ExtrusionError::Degenerate { distinct });
    }
    if options.orient_ccw && is_clockwise(&points) {
        points.reverse();
    }
    Ok(points)
}

/// Extrude a footprint ring into a closed LOD1 solid.
///
/// The floor is written in reverse point order at `base`, the roof in point
/// order at `base + height`, followed by one quad per edge. A ring of `n`
/// points yields `n + 2` surfaces. Invalid input is rejected before any vertex
/// is added to `pool`.
pub fn extrude_ring(
    coords: &[Coord<f64>],
    base: f64,
    height: f64,
    options: ExtrudeOptions,
    pool: &mut VertexPool,
) -> Result<Solid, ExtrusionError> {
    if !base.is_finite() {
        return Err(ExtrusionError::NonFiniteCoordinate);
    }
    let transform = *pool.transform();
    let points = prepare_ring(coords, height, options, &transform)?;
    let top = base + height;

    let mut surfaces: Vec<Vec<Vec<u32>>> = Vec::with_capacity(points.len() + 2);

    let floor: Vec<u32> = points
        .iter()
        .rev()
        .map(|p| pool.add(p.x, p.y, base))
        .collect();
    surfaces.push(vec![floor]);

    let roof: Vec<u32> = points.iter().map(|p| pool.add(p.x, p.y, top)).collect();
    surfaces.push(vec![roof]);

    for i in 0..points.len() {
        let p1 = points[i];
        let p2 = points[(i + 1) % points.len()];
        let wall = vec![
            pool.add(p1.x, p1.y, base),
            pool.add(p2.x, p2.y, base),
            pool.add(p2.x, p2.y, top),
            pool.add(p1.x, p1.y, top),
        ];
        surfaces.push(vec![wall]);
    }

    Ok(Solid::lod1(surfaces))
}

/// Square box of side `width` centred on `(x, y)`, used for vegetation.
pub fn extrude_box(
    x: f64,
    y: f64,
    base: f64,
    height: f64,
    width: f64,
    pool: &mut VertexPool,
) -> Result<Solid, ExtrusionError> {
    let w = width / 2.0;
    let corners = [
        Coord { x: x - w, y: y - w },
        Coord { x: x + w, y: y - w },
        Coord { x: x + w, y: y + w },
        Coord { x: x - w, y: y + w },
    ];
    extrude_ring(&corners, base, height, ExtrudeOptions::default(), pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(side: f64) -> Vec<Coord<f64>> {
        vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: side, y: 0.0 },
            Coord { x: side, y: side },
            Coord { x: 0.0, y: side },
            Coord { x: 0.0, y: 0.0 },
        ]
    }

    fn signed_normal_z(pool: &VertexPool, ring: &[u32]) -> f64 {
        let pts: Vec<[f64; 3]> = ring.iter().map(|&i| pool.get(i).expect("vertex")).collect();
        let mut nz = 0.0;
        for i in 0..pts.len() {
            let a = pts[i];
            let b = pts[(i + 1) % pts.len()];
            nz += a[0] * b[1] - b[0] * a[1];
        }
        nz
    }

    #[test]
    fn square_gives_six_faces_over_eight_vertices() {
        let mut pool = VertexPool::new(VertexTransform::default());
        let solid = extrude_ring(&square(10.0), 0.0, 5.0, ExtrudeOptions::default(), &mut pool)
            .expect("valid square");
        assert_eq!(solid.face_count(), 6);
        assert_eq!(pool.len(), 8);
        assert!(solid.vertex_indices().all(|i| (i as usize) < pool.len()));
    }

    #[test]
    fn face_count_is_ring_length_plus_two() {
        let hexagon: Vec<Coord<f64>> = (0..6)
            .map(|k| {
                let a = k as f64 * std::f64::consts::PI / 3.0;
                Coord { x: 100.0 + 7.0 * a.cos(), y: 50.0 + 7.0 * a.sin() }
            })
            .collect();
        let mut pool = VertexPool::new(VertexTransform::default());
        let solid = extrude_ring(&hexagon, 12.0, 9.5, ExtrudeOptions::default(), &mut pool)
            .expect("valid hexagon");
        assert_eq!(solid.face_count(), 6 + 2);
        assert_eq!(pool.len(), 12);
        assert!(solid.vertex_indices().all(|i| (i as usize) < pool.len()));
    }

    #[test]
    fn floor_and_roof_are_wound_opposite() {
        let mut pool = VertexPool::new(VertexTransform::default());
        let solid = extrude_ring(&square(4.0), 2.0, 3.0, ExtrudeOptions::default(), &mut pool)
            .expect("valid square");
        let surfaces = solid.surfaces();
        let floor = signed_normal_z(&pool, &surfaces[0][0]);
        let roof = signed_normal_z(&pool, &surfaces[1][0]);
        assert!(floor < 0.0);
        assert!(roof > 0.0);
        // walls are quads from base to top
        for wall in &surfaces[2..] {
            assert_eq!(wall[0].len(), 4);
            let z: Vec<f64> = wall[0].iter().map(|&i| pool.get(i).expect("vertex")[2]).collect();
            for (got, want) in z.iter().zip([2.0, 2.0, 5.0, 5.0]) {
                assert!((got - want).abs() < 1e-9, "wall z {z:?}");
            }
        }
    }

    #[test]
    fn clockwise_rings_are_reoriented() {
        let mut ring = square(4.0);
        ring.reverse();
        let mut pool = VertexPool::new(VertexTransform::default());
        let solid = extrude_ring(&ring, 0.0, 3.0, ExtrudeOptions::default(), &mut pool)
            .expect("valid square");
        assert!(signed_normal_z(&pool, &solid.surfaces()[1][0]) > 0.0);

        let mut pool = VertexPool::new(VertexTransform::default());
        let raw = extrude_ring(&ring, 0.0, 3.0, ExtrudeOptions { orient_ccw: false }, &mut pool)
            .expect("valid square");
        assert!(signed_normal_z(&pool, &raw.surfaces()[1][0]) < 0.0);
    }

    #[test]
    fn degenerate_rings_fail_without_adding_vertices() {
        let mut pool = VertexPool::new(VertexTransform::default());
        let line = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 0.0 },
            Coord { x: 0.0, y: 0.0 },
        ];
        assert_eq!(
            extrude_ring(&line, 0.0, 5.0, ExtrudeOptions::default(), &mut pool),
            Err(ExtrusionError::Degenerate { distinct: 2 })
        );
        assert_eq!(
            extrude_ring(&[], 0.0, 5.0, ExtrudeOptions::default(), &mut pool),
            Err(ExtrusionError::Degenerate { distinct: 0 })
        );
        let mut bad = square(1.0);
        bad[1].x = f64::NAN;
        assert_eq!(
            extrude_ring(&bad, 0.0, 5.0, ExtrudeOptions::default(), &mut pool),
            Err(ExtrusionError::NonFiniteCoordinate)
        );
        assert_eq!(
            extrude_ring(&square(1.0), 0.0, 0.0, ExtrudeOptions::default(), &mut pool),
            Err(ExtrusionError::InvalidHeight(0.0))
        );
        assert!(pool.is_empty());
    }

    #[test]
    fn points_closer_than_the_vertex_scale_collapse() {
        // (10.003, 0) lands on the same centimetre as (10, 0)
        let ring = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 10.0, y: 0.0 },
            Coord { x: 10.003, y: 0.0 },
            Coord { x: 10.0, y: 10.0 },
            Coord { x: 0.0, y: 10.0 },
            Coord { x: 0.0, y: 0.0 },
        ];
        let mut pool = VertexPool::new(VertexTransform::default());
        let solid = extrude_ring(&ring, 0.0, 5.0, ExtrudeOptions::default(), &mut pool)
            .expect("valid square");
        assert_eq!(solid.face_count(), 6);
        assert_eq!(pool.len(), 8);
        for surface in solid.surfaces() {
            let ring = &surface[0];
            let mut unique = ring.clone();
            unique.sort_unstable();
            unique.dedup();
            assert_eq!(unique.len(), ring.len(), "repeated vertex in {ring:?}");
        }
    }

    #[test]
    fn closing_point_within_the_vertex_scale_is_dropped() {
        let mut ring = square(10.0);
        if let Some(last) = ring.last_mut() {
            *last = Coord { x: 0.004, y: -0.002 };
        }
        let mut pool = VertexPool::new(VertexTransform::default());
        let solid = extrude_ring(&ring, 0.0, 5.0, ExtrudeOptions::default(), &mut pool)
            .expect("valid square");
        assert_eq!(solid.face_count(), 6);
        assert_eq!(pool.len(), 8);
    }

    #[test]
    fn sub_centimetre_slivers_are_degenerate() {
        let sliver = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 0.001, y: 0.0 },
            Coord { x: 0.0, y: 0.002 },
        ];
        let mut pool = VertexPool::new(VertexTransform::default());
        assert_eq!(
            extrude_ring(&sliver, 0.0, 5.0, ExtrudeOptions::default(), &mut pool),
            Err(ExtrusionError::Degenerate { distinct: 1 })
        );
        assert!(pool.is_empty());
    }

    #[test]
    fn neighbouring_buildings_share_wall_vertices() {
        let mut pool = VertexPool::new(VertexTransform::default());
        let left = square(10.0);
        let right: Vec<Coord<f64>> = left.iter().map(|c| Coord { x: c.x + 10.0, y: c.y }).collect();
        extrude_ring(&left, 0.0, 5.0, ExtrudeOptions::default(), &mut pool).expect("left");
        extrude_ring(&right, 0.0, 5.0, ExtrudeOptions::default(), &mut pool).expect("right");
        assert_eq!(pool.len(), 12);
    }

    #[test]
    fn box_is_centred_on_the_cell() {
        let mut pool = VertexPool::new(VertexTransform::default());
        let solid = extrude_box(10.5, 20.5, 100.0, 4.0, 1.4, &mut pool).expect("box");
        assert_eq!(solid.face_count(), 6);
        let xs: Vec<f64> = solid
            .vertex_indices()
            .map(|i| pool.get(i).expect("vertex")[0])
            .collect();
        let min_x = xs.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_x = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert!((min_x - 9.8).abs() < 1e-9);
        assert!((max_x - 11.2).abs() < 1e-9);
    }
}

//! Shared vertex table with quantized deduplication.
//!
//! Coordinates are converted to integer lattice keys with the same scale and
//! translation the CityJSON `transform` declares, so the stored key *is* the
//! serialized vertex and two inputs collapse exactly when they would be
//! written identically.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// CityJSON `transform` object: `real = quantized * scale + translate`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VertexTransform {
    pub scale: [f64; 3],
    pub translate: [f64; 3],
}

impl Default for VertexTransform {
    fn default() -> Self {
        // 1 unit = 1 cm
        Self {
            scale: [0.01, 0.01, 0.01],
            translate: [0.0, 0.0, 0.0],
        }
    }
}

impl VertexTransform {
    pub fn is_valid(&self) -> bool {
        self.scale.iter().all(|s| s.is_finite() && *s > 0.0)
            && self.translate.iter().all(|t| t.is_finite())
    }

    pub fn encode(&self, x: f64, y: f64, z: f64) -> [i64; 3] {
        let v = [x, y, z];
        let mut q = [0i64; 3];
        for axis in 0..3 {
            q[axis] = ((v[axis] - self.translate[axis]) / self.scale[axis]).round() as i64;
        }
        q
    }

    pub fn decode(&self, q: [i64; 3]) -> [f64; 3] {
        let mut v = [0.0; 3];
        for axis in 0..3 {
            v[axis] = q[axis] as f64 * self.scale[axis] + self.translate[axis];
        }
        v
    }
}

/// Append-only vertex table. Not meant for concurrent mutation: the pipeline
/// feeds it from a single producer in a fixed order.
#[derive(Debug, Clone)]
pub struct VertexPool {
    transform: VertexTransform,
    vertices: Vec<[i64; 3]>,
    lookup: HashMap<[i64; 3], u32>,
}

impl VertexPool {
    pub fn new(transform: VertexTransform) -> Self {
        Self {
            transform,
            vertices: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    pub fn transform(&self) -> &VertexTransform {
        &self.transform
    }

    /// Index of the vertex at `(x, y, z)`, inserting it if its quantized key
    /// has not been seen yet.
    pub fn add(&mut self, x: f64, y: f64, z: f64) -> u32 {
        let key = self.transform.encode(x, y, z);
        if let Some(&idx) = self.lookup.get(&key) {
            return idx;
        }
        let idx = self.vertices.len() as u32;
        self.vertices.push(key);
        self.lookup.insert(key, idx);
        idx
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Decoded coordinates of a stored vertex.
    pub fn get(&self, index: u32) -> Option<[f64; 3]> {
        self.vertices
            .get(index as usize)
            .map(|q| self.transform.decode(*q))
    }

    /// Integer triples in insertion order, as written to the document.
    pub fn into_quantized(self) -> Vec<[i64; 3]> {
        self.vertices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_rounded_triple_returns_same_index() {
        let mut pool = VertexPool::new(VertexTransform::default());
        let a = pool.add(10.0, 20.0, 30.0);
        let b = pool.add(10.001, 19.999, 30.004);
        let c = pool.add(10.0, 20.0, 30.0);
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn table_length_matches_distinct_keys() {
        let mut pool = VertexPool::new(VertexTransform::default());
        let inputs = [
            (0.0, 0.0, 0.0),
            (1.0, 0.0, 0.0),
            (0.0, 0.0, 0.0),
            (1.004, 0.0, 0.0),
            (1.006, 0.0, 0.0),
            (0.0, 1.0, 2.0),
        ];
        let indices: Vec<u32> = inputs.iter().map(|&(x, y, z)| pool.add(x, y, z)).collect();
        assert_eq!(indices, vec![0, 1, 0, 1, 2, 3]);
        assert_eq!(pool.len(), 4);
    }

    #[test]
    fn quantization_round_trip_stays_within_half_resolution() {
        let transform = VertexTransform::default();
        let samples = [
            (312_456.789_4, 5_027_113.004_9, 187.335),
            (-71.933_067, 45.381_338, -0.004_9),
            (0.005, 0.015, 0.025),
            (123.456_789, 987.654_321, 12.345_678),
        ];
        for &(x, y, z) in &samples {
            let decoded = transform.decode(transform.encode(x, y, z));
            for (orig, back) in [x, y, z].iter().zip(decoded.iter()) {
                assert!(
                    (orig - back).abs() <= 0.005 + 1e-9,
                    "{orig} decoded as {back}"
                );
            }
        }
    }

    #[test]
    fn translation_is_applied_before_scaling() {
        let transform = VertexTransform {
            scale: [0.001, 0.001, 0.01],
            translate: [300_000.0, 5_000_000.0, 100.0],
        };
        assert_eq!(transform.encode(300_001.5, 5_000_000.25, 101.0), [1500, 250, 100]);
        let mut pool = VertexPool::new(transform);
        let idx = pool.add(300_001.5, 5_000_000.25, 101.0);
        let v = pool.get(idx).expect("stored vertex");
        assert!((v[0] - 300_001.5).abs() < 1e-6);
        assert!((v[2] - 101.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_non_positive_scale() {
        let bad = VertexTransform {
            scale: [0.01, 0.0, 0.01],
            translate: [0.0; 3],
        };
        assert!(!bad.is_valid());
        assert!(VertexTransform::default().is_valid());
    }
}

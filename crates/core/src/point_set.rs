use crate::Aabb;

/// An ordered set of 3D positions in meters, with optional unit normals and
/// per-point confidence in `[0, 1]`.
///
/// Storage is structure-of-arrays: `x`, `y`, `z` always have the same length,
/// and so do the normal components and the confidence vector when present.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSet {
    pub x: Vec<f32>,
    pub y: Vec<f32>,
    pub z: Vec<f32>,
    pub normals: Option<Normals>,
    pub confidence: Option<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normals {
    pub nx: Vec<f32>,
    pub ny: Vec<f32>,
    pub nz: Vec<f32>,
}

impl Normals {
    pub fn empty() -> Self {
        Self {
            nx: Vec::new(),
            ny: Vec::new(),
            nz: Vec::new(),
        }
    }

    pub fn from_vectors(normals: &[[f32; 3]]) -> Self {
        Self {
            nx: normals.iter().map(|n| n[0]).collect(),
            ny: normals.iter().map(|n| n[1]).collect(),
            nz: normals.iter().map(|n| n[2]).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.nx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nx.is_empty()
    }

    pub fn get(&self, i: usize) -> [f32; 3] {
        [self.nx[i], self.ny[i], self.nz[i]]
    }
}

impl PointSet {
    pub fn new() -> Self {
        Self {
            x: Vec::new(),
            y: Vec::new(),
            z: Vec::new(),
            normals: None,
            confidence: None,
        }
    }

    pub fn from_xyz(x: Vec<f32>, y: Vec<f32>, z: Vec<f32>) -> Self {
        assert_eq!(x.len(), y.len(), "x and y must have same length");
        assert_eq!(x.len(), z.len(), "x and z must have same length");

        Self {
            x,
            y,
            z,
            normals: None,
            confidence: None,
        }
    }

    pub fn from_points(points: &[[f32; 3]]) -> Self {
        Self::from_xyz(
            points.iter().map(|p| p[0]).collect(),
            points.iter().map(|p| p[1]).collect(),
            points.iter().map(|p| p[2]).collect(),
        )
    }

    /// Build from interleaved `[x0, y0, z0, x1, ...]` data, as produced by
    /// depth sensors and numpy `(N, 3)` arrays.
    ///
    /// # Panics
    ///
    /// Panics if `data.len() != num_points * 3`.
    pub fn from_array(data: &[f32], num_points: usize) -> Self {
        assert_eq!(
            data.len(),
            num_points * 3,
            "interleaved input needs three floats per point"
        );
        let column =
            |axis: usize| -> Vec<f32> { data.iter().skip(axis).step_by(3).copied().collect() };
        Self::from_xyz(column(0), column(1), column(2))
    }

    /// Attach per-point confidence values.
    ///
    /// # Panics
    ///
    /// Panics if `confidence.len() != self.len()`.
    pub fn with_confidence(mut self, confidence: Vec<f32>) -> Self {
        assert_eq!(
            confidence.len(),
            self.len(),
            "confidence must have one value per point"
        );
        self.confidence = Some(confidence);
        self
    }

    /// Attach per-point normals.
    ///
    /// # Panics
    ///
    /// Panics if `normals.len() != self.len()`.
    pub fn with_normals(mut self, normals: Normals) -> Self {
        assert_eq!(
            normals.len(),
            self.len(),
            "normals must have one vector per point"
        );
        self.normals = Some(normals);
        self
    }

    pub fn len(&self) -> usize {
        debug_assert_eq!(self.x.len(), self.y.len());
        debug_assert_eq!(self.x.len(), self.z.len());
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::from_xyz(&self.x, &self.y, &self.z)
    }

    /// Mean position of all finite points.
    pub fn centroid(&self) -> Option<[f32; 3]> {
        let mut sum = [0.0f64; 3];
        let mut n = 0usize;
        for p in self.iter_points() {
            if p.iter().all(|v| v.is_finite()) {
                sum[0] += p[0] as f64;
                sum[1] += p[1] as f64;
                sum[2] += p[2] as f64;
                n += 1;
            }
        }
        if n == 0 {
            return None;
        }
        let inv = 1.0 / n as f64;
        Some([
            (sum[0] * inv) as f32,
            (sum[1] * inv) as f32,
            (sum[2] * inv) as f32,
        ])
    }

    pub fn point(&self, i: usize) -> [f32; 3] {
        [self.x[i], self.y[i], self.z[i]]
    }

    pub fn normal(&self, i: usize) -> Option<[f32; 3]> {
        self.normals.as_ref().map(|n| n.get(i))
    }

    pub fn confidence(&self, i: usize) -> Option<f32> {
        self.confidence.as_ref().map(|c| c[i])
    }

    pub fn iter_points(&self) -> impl Iterator<Item = [f32; 3]> + '_ {
        self.x
            .iter()
            .zip(&self.y)
            .zip(&self.z)
            .map(|((x, y), z)| [*x, *y, *z])
    }

    /// Gather the given points, normals and confidence, in `indices` order.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of bounds.
    pub fn select(&self, indices: &[usize]) -> Self {
        let gather = |values: &[f32]| -> Vec<f32> { indices.iter().map(|&i| values[i]).collect() };

        Self {
            x: gather(&self.x),
            y: gather(&self.y),
            z: gather(&self.z),
            normals: self.normals.as_ref().map(|n| Normals {
                nx: gather(&n.nx),
                ny: gather(&n.ny),
                nz: gather(&n.nz),
            }),
            confidence: self.confidence.as_deref().map(gather),
        }
    }

    /// Every point whose index is not listed, in original order.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of bounds.
    pub fn select_inverse(&self, indices: &[usize]) -> Self {
        let mut keep = vec![true; self.len()];
        for &i in indices {
            keep[i] = false;
        }
        let kept: Vec<usize> = keep
            .iter()
            .enumerate()
            .filter_map(|(i, &k)| k.then_some(i))
            .collect();
        self.select(&kept)
    }

    /// Interleaved `[x0, y0, z0, x1, ...]` copy of the positions.
    pub fn to_array(&self) -> Vec<f32> {
        self.iter_points().flatten().collect()
    }
}

impl Default for PointSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{Normals, PointSet};
    use proptest::prelude::*;

    #[test]
    fn new_is_empty() {
        let set = PointSet::new();
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
        assert_eq!(set.centroid(), None);
    }

    #[test]
    fn from_array_deinterleaves() {
        let arr = vec![1.0, 10.0, 100.0, 2.0, 20.0, 200.0];
        let set = PointSet::from_array(&arr, 2);
        assert_eq!(set.x, vec![1.0, 2.0]);
        assert_eq!(set.y, vec![10.0, 20.0]);
        assert_eq!(set.z, vec![100.0, 200.0]);
        assert_eq!(set.to_array(), arr);
    }

    #[test]
    fn select_carries_normals_and_confidence() {
        let set = PointSet::from_xyz(vec![0.0, 1.0, 2.0], vec![0.0; 3], vec![0.0; 3])
            .with_normals(Normals::from_vectors(&[
                [0.0, 0.0, 1.0],
                [0.0, 1.0, 0.0],
                [1.0, 0.0, 0.0],
            ]))
            .with_confidence(vec![0.1, 0.5, 0.9]);

        let picked = set.select(&[2, 0]);
        assert_eq!(picked.x, vec![2.0, 0.0]);
        assert_eq!(picked.normal(0), Some([1.0, 0.0, 0.0]));
        assert_eq!(picked.confidence, Some(vec![0.9, 0.1]));
    }

    #[test]
    fn select_inverse_preserves_order() {
        let set = PointSet::from_xyz(
            vec![0.0, 1.0, 2.0, 3.0],
            vec![10.0, 11.0, 12.0, 13.0],
            vec![20.0, 21.0, 22.0, 23.0],
        );
        let inv = set.select_inverse(&[0, 2, 2]);
        assert_eq!(inv.x, vec![1.0, 3.0]);
        assert_eq!(inv.z, vec![21.0, 23.0]);
    }

    #[test]
    fn centroid_skips_non_finite() {
        let set = PointSet::from_xyz(vec![0.0, f32::NAN, 2.0], vec![0.0; 3], vec![4.0; 3]);
        assert_eq!(set.centroid(), Some([1.0, 0.0, 4.0]));
    }

    #[test]
    #[should_panic]
    fn with_confidence_panics_on_length_mismatch() {
        let _ = PointSet::from_xyz(vec![1.0], vec![2.0], vec![3.0]).with_confidence(vec![]);
    }

    #[test]
    #[should_panic]
    fn from_xyz_panics_on_mismatch() {
        let _ = PointSet::from_xyz(vec![1.0], vec![2.0, 3.0], vec![4.0]);
    }

    fn grid(n: usize) -> PointSet {
        PointSet::from_points(
            &(0..n)
                .map(|i| [i as f32 * 0.01, (i % 7) as f32, -(i as f32)])
                .collect::<Vec<_>>(),
        )
    }

    proptest! {
        #[test]
        fn bounding_box_holds_every_point(
            pts in prop::collection::vec(prop::array::uniform3(-50.0f32..50.0), 1..300)
        ) {
            let set = PointSet::from_points(&pts);
            let bbox = set.aabb();
            prop_assert!(set.iter_points().all(|p| bbox.contains(&p)));
        }

        #[test]
        fn select_and_inverse_partition_the_set(
            n in 1usize..150,
            picks in prop::collection::vec(any::<prop::sample::Index>(), 0..60)
        ) {
            let set = grid(n).with_confidence(vec![0.5; n]);
            let mut idx: Vec<usize> = picks.iter().map(|p| p.index(n)).collect();
            idx.sort_unstable();
            idx.dedup();

            let picked = set.select(&idx);
            let rest = set.select_inverse(&idx);
            prop_assert_eq!(picked.len() + rest.len(), n);
            prop_assert_eq!(picked.confidence.map(|c| c.len()), Some(idx.len()));
        }
    }
}

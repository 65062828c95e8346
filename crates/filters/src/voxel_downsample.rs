use scanalign_core::PointSet;
use scanalign_spatial::{CellMode, VoxelIndex};

/// Replace all points falling in each `voxel_size` cell by their average.
///
/// Output is ordered by cell key, so it is deterministic for a given input.
/// Normals, when present, are averaged and renormalised; confidence is not
/// carried (filtering happens before downsampling).
///
/// # Panics
///
/// Panics if `voxel_size` is not finite and strictly positive.
pub fn voxel_downsample(set: &PointSet, voxel_size: f32) -> PointSet {
    assert!(
        voxel_size.is_finite() && voxel_size > 0.0,
        "voxel_size must be > 0 and finite"
    );

    if set.is_empty() {
        return PointSet::new();
    }

    VoxelIndex::build(set, voxel_size, CellMode::Centroid).representatives()
}

#[cfg(test)]
mod tests {
    use super::voxel_downsample;
    use proptest::prelude::*;
    use scanalign_core::PointSet;

    #[test]
    fn reduces_points() {
        let set = PointSet::from_xyz(
            vec![0.0, 0.5, 0.0, 0.5, 0.0, 0.5, 0.0, 0.5],
            vec![0.0, 0.0, 0.5, 0.5, 0.0, 0.0, 0.5, 0.5],
            vec![0.0, 0.0, 0.0, 0.0, 0.5, 0.5, 0.5, 0.5],
        );
        let out = voxel_downsample(&set, 1.0);
        assert_eq!(out.len(), 1);
        assert!((out.x[0] - 0.25).abs() < 1e-6);
        assert!((out.y[0] - 0.25).abs() < 1e-6);
        assert!((out.z[0] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn empty_set() {
        assert!(voxel_downsample(&PointSet::new(), 1.0).is_empty());
    }

    #[test]
    fn single_point() {
        let set = PointSet::from_xyz(vec![1.0], vec![2.0], vec![3.0]);
        let out = voxel_downsample(&set, 1.0);
        assert_eq!(out.len(), 1);
        assert_eq!(out.point(0), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn non_finite_points_are_ignored() {
        let set = PointSet::from_xyz(vec![f32::NAN, 0.2], vec![0.0, 0.2], vec![0.0, 0.2]);
        let out = voxel_downsample(&set, 1.0);
        assert_eq!(out.len(), 1);
        assert_eq!(out.point(0), [0.2, 0.2, 0.2]);
    }

    #[test]
    fn output_is_ordered_by_cell() {
        let set = PointSet::from_xyz(vec![5.5, 0.5, 2.5], vec![0.0; 3], vec![0.0; 3]);
        let out = voxel_downsample(&set, 1.0);
        assert_eq!(out.x, vec![0.5, 2.5, 5.5]);
    }

    #[test]
    #[should_panic]
    fn zero_voxel_panics() {
        let _ = voxel_downsample(&PointSet::from_xyz(vec![0.0], vec![0.0], vec![0.0]), 0.0);
    }

    proptest! {
        #[test]
        fn never_increases_points(
            pts in prop::collection::vec((-100.0f32..100.0f32, -100.0f32..100.0f32, -100.0f32..100.0f32), 1..3000),
            voxel_size in 0.01f32..10.0f32,
        ) {
            let set = PointSet::from_xyz(
                pts.iter().map(|p| p.0).collect(),
                pts.iter().map(|p| p.1).collect(),
                pts.iter().map(|p| p.2).collect(),
            );
            prop_assert!(voxel_downsample(&set, voxel_size).len() <= set.len());
        }
    }
}

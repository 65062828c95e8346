use scanalign_core::PointSet;
use scanalign_spatial::{CellMode, VoxelIndex};

/// Remove isolated speckle: keep points with at least `min_neighbors` points
/// (itself included) within `radius`.
pub fn radius_outlier_removal(set: &PointSet, radius: f32, min_neighbors: usize) -> PointSet {
    if set.is_empty() || min_neighbors == 0 || !(radius.is_finite() && radius > 0.0) {
        return set.clone();
    }

    let index = VoxelIndex::build(set, radius, CellMode::Raw);
    let keep: Vec<usize> = set
        .iter_points()
        .enumerate()
        .filter(|(_, q)| index.within_radius(q, radius).len() >= min_neighbors)
        .map(|(i, _)| i)
        .collect();

    set.select(&keep)
}

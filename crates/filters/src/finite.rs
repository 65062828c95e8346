use scanalign_core::PointSet;

/// Drop points whose position has a NaN or infinite coordinate.
///
/// Normals and confidence of the surviving points are carried along.
pub fn finite_filter(set: &PointSet) -> PointSet {
    let keep: Vec<usize> = set
        .iter_points()
        .enumerate()
        .filter(|(_, p)| p.iter().all(|v| v.is_finite()))
        .map(|(i, _)| i)
        .collect();

    if keep.len() == set.len() {
        return set.clone();
    }
    set.select(&keep)
}

use scanalign_core::PointSet;

/// Keep points whose Euclidean distance from `origin` lies in
/// `[min_range, max_range]`.
///
/// Removes near-field speckle and far-field noise from sensor captures.
pub fn range_filter(set: &PointSet, origin: [f32; 3], min_range: f32, max_range: f32) -> PointSet {
    if set.is_empty() {
        return PointSet::new();
    }

    let min_sq = min_range.max(0.0).powi(2);
    let max_sq = max_range * max_range;

    let mut keep = Vec::new();
    for (i, p) in set.iter_points().enumerate() {
        let dx = p[0] - origin[0];
        let dy = p[1] - origin[1];
        let dz = p[2] - origin[2];
        let d2 = dx * dx + dy * dy + dz * dz;

        if d2.is_finite() && d2 >= min_sq && d2 <= max_sq {
            keep.push(i);
        }
    }

    set.select(&keep)
}

#[cfg(test)]
mod tests {
    use super::range_filter;
    use proptest::prelude::*;
    use scanalign_core::PointSet;

    fn radial() -> PointSet {
        // distances 0.1, 0.25, 1.0, 5.0, 6.0 from the origin
        PointSet::from_xyz(
            vec![0.1, 0.0, 0.0, 3.0, 6.0],
            vec![0.0, 0.25, 0.0, 4.0, 0.0],
            vec![0.0, 0.0, 1.0, 0.0, 0.0],
        )
    }

    #[test]
    fn default_band_is_inclusive() {
        let out = range_filter(&radial(), [0.0; 3], 0.25, 5.0);
        assert_eq!(out.len(), 3);
        assert_eq!(out.point(0), [0.0, 0.25, 0.0]);
        assert_eq!(out.point(2), [3.0, 4.0, 0.0]);
    }

    #[test]
    fn origin_shifts_the_band() {
        let out = range_filter(&radial(), [6.0, 0.0, 0.0], 0.0, 0.5);
        assert_eq!(out.len(), 1);
        assert_eq!(out.point(0), [6.0, 0.0, 0.0]);
    }

    #[test]
    fn empty_set() {
        assert!(range_filter(&PointSet::new(), [0.0; 3], 0.0, 10.0).is_empty());
    }

    #[test]
    fn non_finite_points_are_dropped() {
        let set = PointSet::from_xyz(vec![f32::NAN, 1.0], vec![0.0; 2], vec![0.0; 2]);
        assert_eq!(range_filter(&set, [0.0; 3], 0.0, 10.0).len(), 1);
    }

    proptest! {
        #[test]
        fn survivors_within_band(
            pts in prop::collection::vec((-10.0f32..10.0, -10.0f32..10.0, -10.0f32..10.0), 1..300),
            min_r in 0.0f32..3.0,
            span in 0.0f32..10.0,
        ) {
            let set = PointSet::from_xyz(
                pts.iter().map(|p| p.0).collect(),
                pts.iter().map(|p| p.1).collect(),
                pts.iter().map(|p| p.2).collect(),
            );
            let max_r = min_r + span;
            let out = range_filter(&set, [0.0; 3], min_r, max_r);
            for p in out.iter_points() {
                let d = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
                prop_assert!(d >= min_r - 1e-4 && d <= max_r + 1e-4);
            }
        }
    }
}

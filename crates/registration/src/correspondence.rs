use scanalign_core::PointSet;
use scanalign_spatial::VoxelIndex;

use crate::error::IcpFailure;

/// A model point paired with its nearest compatible scan point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub model_index: usize,
    pub scan_index: usize,
    /// Model point after the current pose.
    pub model_point: [f32; 3],
    pub scan_point: [f32; 3],
    pub scan_normal: [f32; 3],
    /// Signed point-to-plane residual `(model - scan) · scan_normal`.
    pub residual: f32,
    /// Euclidean distance between the paired points.
    pub distance: f32,
}

/// Pair every point of `model` (already posed into the scan frame) with the
/// nearest scan point within `max_distance`.
///
/// Pairs whose normals disagree (`|cos| < cos_threshold`) are rejected, as
/// are scan points without a normal. Normals are compared unsigned because
/// PCA orientation is only a convention.
pub fn find_correspondences(
    model: &PointSet,
    scan_index: &VoxelIndex,
    max_distance: f32,
    cos_threshold: f32,
) -> Vec<Correspondence> {
    let mut correspondences = Vec::with_capacity(model.len());

    for (i, query) in model.iter_points().enumerate() {
        let Some(hit) = scan_index.nearest(&query, max_distance) else {
            continue;
        };
        let Some(scan_normal) = hit.normal else {
            continue;
        };
        if let Some(model_normal) = model.normal(i) {
            if dot(&model_normal, &scan_normal).abs() < cos_threshold {
                continue;
            }
        }

        let diff = [
            query[0] - hit.position[0],
            query[1] - hit.position[1],
            query[2] - hit.position[2],
        ];
        correspondences.push(Correspondence {
            model_index: i,
            scan_index: hit.index,
            model_point: query,
            scan_point: hit.position,
            scan_normal,
            residual: dot(&diff, &scan_normal),
            distance: hit.distance,
        });
    }

    correspondences
}

/// Keep the `round(len * fraction)` correspondences with the smallest
/// residual magnitude.
///
/// # Errors
///
/// Returns [`IcpFailure::TooFewCorrespondences`] when fewer than three
/// survive, which leaves the 6-DoF system underdetermined.
pub fn trim_correspondences(
    mut correspondences: Vec<Correspondence>,
    fraction: f32,
) -> Result<Vec<Correspondence>, IcpFailure> {
    let keep = (correspondences.len() as f32 * fraction.clamp(0.0, 1.0)).round() as usize;
    let keep = keep.min(correspondences.len());

    if keep < correspondences.len() {
        correspondences.sort_unstable_by(|a, b| a.residual.abs().total_cmp(&b.residual.abs()));
        correspondences.truncate(keep);
    }

    if correspondences.len() < 3 {
        return Err(IcpFailure::TooFewCorrespondences {
            found: correspondences.len(),
        });
    }
    Ok(correspondences)
}

/// Root mean square of the point-to-plane residuals.
pub fn residual_rmse(correspondences: &[Correspondence]) -> f32 {
    if correspondences.is_empty() {
        return f32::INFINITY;
    }
    let sum_sq: f64 = correspondences
        .iter()
        .map(|c| (c.residual as f64) * (c.residual as f64))
        .sum();
    (sum_sq / correspondences.len() as f64).sqrt() as f32
}

#[inline]
fn dot(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanalign_core::Normals;
    use scanalign_spatial::CellMode;

    fn with_up_normals(points: &[[f32; 3]]) -> PointSet {
        PointSet::from_points(points)
            .with_normals(Normals::from_vectors(&vec![[0.0, 0.0, 1.0]; points.len()]))
    }

    #[test]
    fn residual_is_signed_along_scan_normal() {
        let scan = with_up_normals(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);
        let index = VoxelIndex::build(&scan, 0.5, CellMode::Raw);
        let model = with_up_normals(&[[0.1, 0.0, 0.2], [1.0, 0.0, -0.1]]);

        let corrs = find_correspondences(&model, &index, 0.5, 0.75);
        assert_eq!(corrs.len(), 2);
        assert_eq!(corrs[0].scan_index, 0);
        assert!((corrs[0].residual - 0.2).abs() < 1e-6);
        assert!((corrs[1].residual + 0.1).abs() < 1e-6);
    }

    #[test]
    fn far_points_are_unmatched() {
        let scan = with_up_normals(&[[0.0, 0.0, 0.0]]);
        let index = VoxelIndex::build(&scan, 0.1, CellMode::Raw);
        let model = with_up_normals(&[[0.0, 0.0, 0.5]]);
        assert!(find_correspondences(&model, &index, 0.1, 0.75).is_empty());
    }

    #[test]
    fn incompatible_normals_are_rejected() {
        let scan = with_up_normals(&[[0.0, 0.0, 0.0]]);
        let index = VoxelIndex::build(&scan, 0.5, CellMode::Raw);

        let wall = PointSet::from_points(&[[0.05, 0.0, 0.0]])
            .with_normals(Normals::from_vectors(&[[1.0, 0.0, 0.0]]));
        assert!(find_correspondences(&wall, &index, 0.5, 0.75).is_empty());

        // flipped normals still count as the same surface
        let flipped = PointSet::from_points(&[[0.05, 0.0, 0.0]])
            .with_normals(Normals::from_vectors(&[[0.0, 0.0, -1.0]]));
        assert_eq!(find_correspondences(&flipped, &index, 0.5, 0.75).len(), 1);
    }

    fn synthetic(residuals: &[f32]) -> Vec<Correspondence> {
        residuals
            .iter()
            .enumerate()
            .map(|(i, &r)| Correspondence {
                model_index: i,
                scan_index: i,
                model_point: [0.0, 0.0, r],
                scan_point: [0.0; 3],
                scan_normal: [0.0, 0.0, 1.0],
                residual: r,
                distance: r.abs(),
            })
            .collect()
    }

    #[test]
    fn trim_keeps_smallest_magnitudes() {
        let kept = trim_correspondences(synthetic(&[0.5, -0.01, 0.02, -0.9, 0.03]), 0.6).unwrap();
        let mut idx: Vec<usize> = kept.iter().map(|c| c.model_index).collect();
        idx.sort_unstable();
        assert_eq!(idx, vec![1, 2, 4]);
    }

    #[test]
    fn trim_one_keeps_everything() {
        let all = synthetic(&[0.5, -0.01, 0.02, -0.9]);
        assert_eq!(trim_correspondences(all.clone(), 1.0).unwrap(), all);
    }

    #[test]
    fn trim_zero_is_a_numerical_failure() {
        assert_eq!(
            trim_correspondences(synthetic(&[0.1; 10]), 0.0),
            Err(IcpFailure::TooFewCorrespondences { found: 0 })
        );
    }

    #[test]
    fn rmse_of_residuals() {
        let rmse = residual_rmse(&synthetic(&[0.3, -0.4]));
        assert!((rmse - (0.125f32).sqrt()).abs() < 1e-6);
        assert!(residual_rmse(&[]).is_infinite());
    }
}

//! Robust point-to-plane ICP over one pyramid level, and across a pyramid.

use log::{debug, trace, warn};
use nalgebra::{Matrix3, Matrix3x6, Matrix6, Rotation3, Vector3, Vector6};
use scanalign_core::{transform_points, PointSet, RigidPose};
use scanalign_spatial::VoxelIndex;
use serde::Serialize;

use crate::config::{LevelSpec, RegistrationConfig};
use crate::correspondence::{
    find_correspondences, residual_rmse, trim_correspondences, Correspondence,
};
use crate::error::IcpFailure;
use crate::pyramid::Pyramid;

/// Per-level refinement settings, resolved from the configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelParams {
    pub voxel_size: f32,
    pub max_correspondence_distance: f32,
    pub max_iterations: usize,
    pub normal_cos_threshold: f32,
    pub trim_fraction: f32,
    /// Huber threshold in meters.
    pub huber_delta: f32,
    pub point_to_point_weight: f32,
    /// Stop once the RMSE changes by less than this (meters).
    pub convergence_threshold: f32,
}

impl LevelParams {
    pub fn from_config(config: &RegistrationConfig, level: &LevelSpec) -> Self {
        Self {
            voxel_size: level.voxel_size,
            max_correspondence_distance: level.max_correspondence_distance,
            max_iterations: config.max_iterations_per_level,
            normal_cos_threshold: config.normal_cos_threshold,
            trim_fraction: config.trim_fraction,
            huber_delta: config.huber_delta_factor * level.voxel_size,
            point_to_point_weight: config.point_to_point_weight,
            convergence_threshold: config.convergence_factor * level.voxel_size,
        }
    }
}

/// Fit quality of a pose on one pyramid level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelMetrics {
    pub voxel_size: f32,
    pub max_correspondence_distance: f32,
    pub iterations: usize,
    /// RMS point-to-plane residual over the kept correspondences.
    pub rmse: f32,
    /// Kept correspondences over model points at this level.
    pub inlier_fraction: f32,
    pub converged: bool,
    pub failure: Option<IcpFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelOutcome {
    pub pose: RigidPose,
    pub metrics: LevelMetrics,
}

/// A seed carried through every pyramid level.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedOutcome {
    pub pose: RigidPose,
    pub levels: Vec<LevelMetrics>,
}

impl SeedOutcome {
    /// Metrics of the finest level reached.
    pub fn finest(&self) -> Option<&LevelMetrics> {
        self.levels.last()
    }

    pub fn total_iterations(&self) -> usize {
        self.levels.iter().map(|l| l.iterations).sum()
    }
}

/// Refine `initial` (model-in-world) against one scan level.
///
/// Each iteration poses the model, pairs it with the scan, trims the worst
/// residuals, Huber-weights the rest and solves a damped 6×6 linear system
/// for a small rigid update. Numerical failures end the level early and are
/// reported in the metrics; the pose reached so far is kept.
pub fn refine_level(
    model: &PointSet,
    scan_index: &VoxelIndex,
    initial: &RigidPose,
    params: &LevelParams,
) -> LevelOutcome {
    let mut pose = *initial;
    let mut prev_rmse = f32::INFINITY;
    let mut converged = false;
    let mut num_iterations = 0;
    let mut failure = None;

    for iter in 0..params.max_iterations {
        num_iterations = iter + 1;

        let current = transform_points(model, &pose);
        let correspondences = find_correspondences(
            &current,
            scan_index,
            params.max_correspondence_distance,
            params.normal_cos_threshold,
        );
        let matched = correspondences.len();

        let kept = match trim_correspondences(correspondences, params.trim_fraction) {
            Ok(kept) => kept,
            Err(err) => {
                failure = Some(err);
                break;
            }
        };

        let rmse = residual_rmse(&kept);
        trace!(
            "voxel={:.4} iter={} matched={} kept={} rmse={:.6}",
            params.voxel_size,
            num_iterations,
            matched,
            kept.len(),
            rmse
        );

        if (prev_rmse - rmse).abs() < params.convergence_threshold {
            converged = true;
            break;
        }
        prev_rmse = rmse;

        match solve_increment(&kept, params) {
            Ok(incremental) => pose = pose.compose(&incremental).orthonormalized(),
            Err(err) => {
                failure = Some(err);
                break;
            }
        }
    }

    if let Some(err) = failure {
        warn!(
            "voxel={:.4}: stopped after {} iterations: {}",
            params.voxel_size, num_iterations, err
        );
    }

    let (rmse, inlier_fraction) = evaluate(model, scan_index, &pose, params);
    LevelOutcome {
        pose,
        metrics: LevelMetrics {
            voxel_size: params.voxel_size,
            max_correspondence_distance: params.max_correspondence_distance,
            iterations: num_iterations,
            rmse,
            inlier_fraction,
            converged,
            failure,
        },
    }
}

/// Carry one seed through every level, coarsest first.
///
/// A level that fails numerically hands its last pose on to the next level.
///
/// # Panics
///
/// Panics if the pyramid, index and parameter lists differ in length.
pub fn refine_seed(
    model: &Pyramid,
    scan_indices: &[VoxelIndex],
    seed: &RigidPose,
    params: &[LevelParams],
) -> SeedOutcome {
    assert_eq!(model.len(), scan_indices.len(), "one scan index per level");
    assert_eq!(model.len(), params.len(), "one parameter set per level");

    let mut pose = *seed;
    let mut levels = Vec::with_capacity(params.len());

    for ((level, index), level_params) in model.levels.iter().zip(scan_indices).zip(params) {
        let outcome = refine_level(&level.points, index, &pose, level_params);
        debug!(
            "level voxel={:.4}: {} iterations, rmse={:.5}, inliers={:.3}, converged={}",
            level_params.voxel_size,
            outcome.metrics.iterations,
            outcome.metrics.rmse,
            outcome.metrics.inlier_fraction,
            outcome.metrics.converged
        );
        pose = outcome.pose;
        levels.push(outcome.metrics);
    }

    SeedOutcome { pose, levels }
}

/// RMSE and inlier fraction of `pose` on one level, with the level's
/// correspondence rules.
fn evaluate(
    model: &PointSet,
    scan_index: &VoxelIndex,
    pose: &RigidPose,
    params: &LevelParams,
) -> (f32, f32) {
    if model.is_empty() {
        return (f32::INFINITY, 0.0);
    }
    let current = transform_points(model, pose);
    let correspondences = find_correspondences(
        &current,
        scan_index,
        params.max_correspondence_distance,
        params.normal_cos_threshold,
    );
    match trim_correspondences(correspondences, params.trim_fraction) {
        Ok(kept) => (
            residual_rmse(&kept),
            kept.len() as f32 / model.len() as f32,
        ),
        Err(IcpFailure::TooFewCorrespondences { found }) => {
            (f32::INFINITY, found as f32 / model.len() as f32)
        }
        Err(_) => (f32::INFINITY, 0.0),
    }
}

/// Huber weight: 1 inside `delta`, `delta / |r|` beyond it.
#[inline]
pub fn huber_weight(residual: f32, delta: f32) -> f32 {
    let r = residual.abs();
    if r <= delta {
        1.0
    } else {
        delta / r
    }
}

/// Solve the linearized robust problem for one ICP step.
///
/// Uses the small-angle approximation `R ≈ I + [ω]×` around the posed model
/// points, giving a 6×6 system in `x = [ω, t]`:
///
/// - point-to-plane rows `a = [s × n, n]`, `b = (q - s) · n`
/// - point-to-point rows `J = [-[s]×, I]`, `d = q - s`, scaled by
///   `point_to_point_weight` so tangential motion on flat scenes stays
///   observable.
///
/// Each row carries its Huber weight. The update is returned as a proper
/// rotation (exponential map of `ω`) plus `t`, to be applied after the
/// current pose.
fn solve_increment(
    correspondences: &[Correspondence],
    params: &LevelParams,
) -> Result<RigidPose, IcpFailure> {
    if correspondences.len() < 3 {
        return Err(IcpFailure::TooFewCorrespondences {
            found: correspondences.len(),
        });
    }

    let mut ata = Matrix6::<f64>::zeros();
    let mut atb = Vector6::<f64>::zeros();
    let p2p = params.point_to_point_weight as f64;

    for c in correspondences {
        let s = to_f64(&c.model_point);
        let q = to_f64(&c.scan_point);
        let n = to_f64(&c.scan_normal);

        let w = huber_weight(c.residual, params.huber_delta) as f64;
        let cross = s.cross(&n);
        let a = Vector6::new(cross.x, cross.y, cross.z, n.x, n.y, n.z);
        let b = (q - s).dot(&n);
        ata += w * a * a.transpose();
        atb += w * a * b;

        if p2p > 0.0 {
            let d = q - s;
            let w = p2p * huber_weight(c.distance, params.huber_delta) as f64;
            let mut j = Matrix3x6::<f64>::zeros();
            j.fixed_view_mut::<3, 3>(0, 0).copy_from(&(-s.cross_matrix()));
            j.fixed_view_mut::<3, 3>(0, 3).copy_from(&Matrix3::identity());
            ata += w * j.transpose() * j;
            atb += w * j.transpose() * d;
        }
    }

    // Tikhonov damping, scaled to the system, keeps rank-deficient cases
    // (a single plane, few correspondences) solvable.
    let diag_max = (0..6).map(|i| ata[(i, i)].abs()).fold(0.0_f64, f64::max);
    if !diag_max.is_finite() || diag_max <= 1e-12 {
        return Err(IcpFailure::SingularSystem);
    }
    let lambda = 1e-6 * diag_max;
    for i in 0..6 {
        ata[(i, i)] += lambda;
    }

    let x = match ata.cholesky() {
        Some(chol) => chol.solve(&atb),
        None => ata.lu().solve(&atb).ok_or(IcpFailure::SingularSystem)?,
    };

    if !x.iter().all(|v| v.is_finite()) {
        return Err(IcpFailure::NonFiniteUpdate);
    }

    let rotation = Rotation3::from_scaled_axis(Vector3::new(x[0], x[1], x[2]));
    let translation = Vector3::new(x[3], x[4], x[5]);
    Ok(RigidPose::from_nalgebra(rotation.matrix(), &translation))
}

#[inline]
fn to_f64(v: &[f32; 3]) -> Vector3<f64> {
    Vector3::new(v[0] as f64, v[1] as f64, v[2] as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;
    use scanalign_core::Normals;
    use scanalign_spatial::CellMode;

    fn params(voxel: f32) -> LevelParams {
        LevelParams {
            voxel_size: voxel,
            max_correspondence_distance: 0.2,
            max_iterations: 50,
            normal_cos_threshold: 0.75,
            trim_fraction: 1.0,
            huber_delta: voxel,
            point_to_point_weight: 0.05,
            convergence_threshold: 1e-7,
        }
    }

    /// Floor plus two walls meeting in a corner: every DoF is constrained.
    fn corner(spacing: f32) -> PointSet {
        let n = (0.6 / spacing) as usize;
        let mut pts = Vec::new();
        let mut normals = Vec::new();
        for i in 0..n {
            for j in 0..n {
                let a = i as f32 * spacing;
                let b = j as f32 * spacing;
                pts.push([a, b, 0.0]);
                normals.push([0.0, 0.0, 1.0]);
                pts.push([0.0, a, b + spacing]);
                normals.push([1.0, 0.0, 0.0]);
                pts.push([a + spacing, 0.0, b + spacing]);
                normals.push([0.0, 1.0, 0.0]);
            }
        }
        PointSet::from_points(&pts).with_normals(Normals::from_vectors(&normals))
    }

    fn index(set: &PointSet, cell: f32) -> VoxelIndex {
        VoxelIndex::build(set, cell, CellMode::Raw)
    }

    #[test]
    fn identity_stays_put() {
        let scan = corner(0.05);
        let outcome = refine_level(&scan, &index(&scan, 0.2), &RigidPose::identity(), &params(0.05));
        assert!(outcome.pose.is_identity(1e-5), "{:?}", outcome.pose);
        assert!(outcome.metrics.rmse < 1e-6);
        assert_abs_diff_eq!(outcome.metrics.inlier_fraction, 1.0);
        assert!(outcome.metrics.failure.is_none());
    }

    #[test]
    fn recovers_small_offset() {
        let model = corner(0.04);
        let truth = RigidPose::from_axis_angle([0.0, 0.0, 1.0], 0.05)
            .compose(&RigidPose::from_translation([0.02, -0.03, 0.01]));
        let scan = transform_points(&model, &truth);

        let outcome = refine_level(&model, &index(&scan, 0.2), &RigidPose::identity(), &params(0.04));
        let err = outcome.pose.compose(&truth.inverse());
        assert!(err.rotation_angle() < 0.01, "rotation error {}", err.rotation_angle());
        for t in err.translation {
            assert!(t.abs() < 0.005, "translation error {:?}", err.translation);
        }
        assert!(outcome.pose.is_orthonormal(1e-5));
    }

    #[test]
    fn trim_zero_fails_numerically() {
        let scan = corner(0.05);
        let mut p = params(0.05);
        p.trim_fraction = 0.0;
        let outcome = refine_level(&scan, &index(&scan, 0.2), &RigidPose::identity(), &p);
        assert_eq!(
            outcome.metrics.failure,
            Some(IcpFailure::TooFewCorrespondences { found: 0 })
        );
        assert_eq!(outcome.metrics.iterations, 1);
        assert!(outcome.pose.is_identity(0.0));
        assert!(outcome.metrics.rmse.is_infinite());
    }

    #[test]
    fn no_overlap_reports_failure() {
        let scan = corner(0.05);
        let far = RigidPose::from_translation([5.0, 5.0, 5.0]);
        let outcome = refine_level(&scan, &index(&scan, 0.2), &far, &params(0.05));
        assert_eq!(
            outcome.metrics.failure,
            Some(IcpFailure::TooFewCorrespondences { found: 0 })
        );
        assert_eq!(outcome.pose, far);
    }

    #[test]
    fn huber_is_linear_beyond_delta() {
        assert_eq!(huber_weight(0.01, 0.02), 1.0);
        assert_eq!(huber_weight(-0.02, 0.02), 1.0);
        assert_abs_diff_eq!(huber_weight(-0.08, 0.02), 0.25, epsilon = 1e-6);
    }

    #[test]
    fn single_plane_translation_along_normal() {
        // Pure point-to-plane on one plane: only the normal offset is observable.
        let mut pts = Vec::new();
        for i in 0..10 {
            for j in 0..10 {
                pts.push([i as f32 * 0.05, j as f32 * 0.05, 0.0]);
            }
        }
        let n = pts.len();
        let scan = PointSet::from_points(&pts)
            .with_normals(Normals::from_vectors(&vec![[0.0, 0.0, 1.0]; n]));
        let model = transform_points(&scan, &RigidPose::from_translation([0.0, 0.0, 0.03]));

        let mut p = params(0.05);
        p.point_to_point_weight = 0.0;
        let outcome = refine_level(&model, &index(&scan, 0.2), &RigidPose::identity(), &p);
        assert_abs_diff_eq!(outcome.pose.translation[2], -0.03, epsilon = 1e-4);
        assert!(outcome.metrics.rmse < 1e-4);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn refined_pose_is_orthonormal(
            yaw in -0.1f32..0.1,
            tx in -0.04f32..0.04,
            ty in -0.04f32..0.04,
        ) {
            let model = corner(0.06);
            let truth = RigidPose::from_axis_angle([0.0, 0.0, 1.0], yaw)
                .compose(&RigidPose::from_translation([tx, ty, 0.0]));
            let scan = transform_points(&model, &truth);
            let outcome = refine_level(&model, &index(&scan, 0.2), &RigidPose::identity(), &params(0.06));
            prop_assert!(outcome.pose.is_orthonormal(1e-5));
        }
    }
}

//! Single entry point wiring preprocessing, seeding and refinement together.

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rayon::prelude::*;
use scanalign_core::{PointSet, RigidPose};
use scanalign_spatial::{CellMode, VoxelIndex};
use serde::Serialize;

use crate::coarse::{estimate_seeds, CandidateSeed};
use crate::config::RegistrationConfig;
use crate::error::RegistrationError;
use crate::icp::{refine_seed, LevelMetrics, LevelParams, SeedOutcome};
use crate::pyramid::{build_pyramid, preprocess_model, preprocess_scan};

/// A prior surface model to place in the scan.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceModel {
    pub id: String,
    pub points: PointSet,
}

impl SurfaceModel {
    pub fn new(id: impl Into<String>, points: PointSet) -> Self {
        Self {
            id: id.into(),
            points,
        }
    }
}

/// Descriptive quality of the winning pose. Never fed back into the
/// algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegistrationMetrics {
    pub inlier_fraction: f32,
    /// RMS point-to-plane residual on the finest level (meters).
    pub rmse: f32,
    /// ICP iterations summed over every level of the winning seed.
    pub iterations: usize,
    /// Finest voxel size used.
    pub voxel_size: f32,
    /// Wall-clock time of the whole request.
    pub elapsed: Duration,
}

/// Final pose of a registration request, owned by the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrationResult {
    /// Model-in-world: model point `p` lies at `pose.apply_to_point(&p)` in
    /// the scan frame.
    pub pose: RigidPose,
    pub metrics: RegistrationMetrics,
    /// Per-level metrics of the winning seed, coarsest first.
    pub level_metrics: Vec<LevelMetrics>,
    /// RMSE or inlier fraction failed the quality gate. The pose is still the
    /// best found; callers decide whether to retry with more coverage.
    pub low_confidence: bool,
    pub model_id: String,
    pub seeds_evaluated: usize,
}

impl RegistrationResult {
    pub fn to_row_major(&self) -> [[f32; 4]; 4] {
        self.pose.to_row_major()
    }

    pub fn to_column_major(&self) -> [f32; 16] {
        self.pose.to_column_major()
    }
}

struct Candidate {
    rank: usize,
    seed: CandidateSeed,
    outcome: SeedOutcome,
}

impl Candidate {
    fn rmse(&self) -> f32 {
        match self.outcome.finest() {
            Some(m) if !m.rmse.is_nan() => m.rmse,
            _ => f32::INFINITY,
        }
    }

    fn inlier_fraction(&self) -> f32 {
        self.outcome.finest().map_or(0.0, |m| m.inlier_fraction)
    }

    /// Lower RMSE wins; RMSEs within `tolerance` tie and fall back to higher
    /// inlier fraction, then better coarse rank.
    fn beats(&self, other: &Candidate, tolerance: f32) -> bool {
        let (a, b) = (self.rmse(), other.rmse());
        if (a - b).abs() > tolerance || !(a - b).is_finite() {
            return a < b;
        }
        let (ia, ib) = (self.inlier_fraction(), other.inlier_fraction());
        if ia != ib {
            return ia > ib;
        }
        self.rank < other.rank
    }
}

/// Register `model` against `scan`.
///
/// Preprocesses both sets, builds their pyramids (coarsest first), ranks
/// coarse seeds on the coarsest level and refines the best few through every
/// level in parallel. Neither input is modified and no state survives the
/// call.
///
/// # Errors
///
/// - [`RegistrationError::InvalidConfig`] when `config` fails validation.
/// - [`RegistrationError::InvalidInput`] when either set is empty after
///   filtering. No PCA or ICP is attempted in that case.
pub fn register(
    scan: &PointSet,
    model: &SurfaceModel,
    config: &RegistrationConfig,
) -> Result<RegistrationResult, RegistrationError> {
    let start = Instant::now();
    config.validate()?;

    let scan_points = preprocess_scan(scan, config);
    let model_points = preprocess_model(&model.points);
    match (scan_points.is_empty(), model_points.is_empty()) {
        (true, true) => {
            return Err(RegistrationError::InvalidInput(
                "scan and model are empty after filtering".into(),
            ))
        }
        (true, false) => {
            return Err(RegistrationError::InvalidInput(
                "scan is empty after filtering".into(),
            ))
        }
        (false, true) => {
            return Err(RegistrationError::InvalidInput(format!(
                "model '{}' is empty after filtering",
                model.id
            )))
        }
        (false, false) => {}
    }

    let levels = config.levels();
    let voxel_sizes: Vec<f32> = levels.iter().map(|l| l.voxel_size).collect();
    let (scan_pyramid, model_pyramid) = rayon::join(
        || {
            build_pyramid(
                &scan_points,
                &voxel_sizes,
                config.normal_radius_factor,
                config.unit_up(),
            )
        },
        || {
            build_pyramid(
                &model_points,
                &voxel_sizes,
                config.normal_radius_factor,
                config.unit_model_up(),
            )
        },
    );

    // One read-only index per scan level, cell sized to the search radius so
    // the 27-cell neighbourhood covers every candidate.
    let scan_indices: Vec<VoxelIndex> = scan_pyramid
        .levels
        .par_iter()
        .zip(levels.par_iter())
        .map(|(level, bounds)| {
            VoxelIndex::build(&level.points, bounds.max_correspondence_distance, CellMode::Raw)
        })
        .collect();

    let (Some(model_coarse), Some(scan_coarse), Some(coarse_index)) = (
        model_pyramid.coarsest(),
        scan_pyramid.coarsest(),
        scan_indices.first(),
    ) else {
        return Err(RegistrationError::InvalidInput(
            "no pyramid levels were built".into(),
        ));
    };

    let seeds = estimate_seeds(&model_coarse.points, &scan_coarse.points, coarse_index, config);
    if seeds.is_empty() {
        return Err(RegistrationError::InvalidInput(
            "no coarse pose could be formed".into(),
        ));
    }

    let params: Vec<LevelParams> = levels
        .iter()
        .map(|level| LevelParams::from_config(config, level))
        .collect();

    let candidates: Vec<Candidate> = seeds
        .iter()
        .take(config.seeds_to_refine)
        .enumerate()
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|(rank, seed)| {
            let outcome = refine_seed(&model_pyramid, &scan_indices, &seed.pose, &params);
            debug!(
                "seed #{} {:?} (score {:.5}): rmse={:.5} inliers={:.3}",
                rank,
                seed.kind,
                seed.score,
                outcome.finest().map_or(f32::INFINITY, |m| m.rmse),
                outcome.finest().map_or(0.0, |m| m.inlier_fraction)
            );
            Candidate {
                rank,
                seed: *seed,
                outcome,
            }
        })
        .collect();

    let finest_voxel = levels.last().map_or(0.0, |l| l.voxel_size);
    let tolerance = 1e-3 * finest_voxel;
    let mut winner: Option<&Candidate> = None;
    for candidate in &candidates {
        if winner.map_or(true, |best| candidate.beats(best, tolerance)) {
            winner = Some(candidate);
        }
    }
    let Some(winner) = winner else {
        return Err(RegistrationError::InvalidInput(
            "no seed could be refined".into(),
        ));
    };

    let rmse = winner.rmse();
    let inlier_fraction = winner.inlier_fraction();
    let low_confidence = !(rmse <= config.max_rmse_factor * finest_voxel)
        || !(inlier_fraction >= config.min_inlier_fraction);

    let metrics = RegistrationMetrics {
        inlier_fraction,
        rmse,
        iterations: winner.outcome.total_iterations(),
        voxel_size: finest_voxel,
        elapsed: start.elapsed(),
    };

    if low_confidence {
        warn!(
            "model '{}': low-confidence registration (rmse={:.4} m, inliers={:.3})",
            model.id, rmse, inlier_fraction
        );
    }
    info!(
        "model '{}': registered with seed {:?} in {} iterations, rmse={:.4} m, inliers={:.3}, {:?}",
        model.id, winner.seed.kind, metrics.iterations, rmse, inlier_fraction, metrics.elapsed
    );

    Ok(RegistrationResult {
        pose: winner.outcome.pose,
        metrics,
        level_metrics: winner.outcome.levels.clone(),
        low_confidence,
        model_id: model.id.clone(),
        seeds_evaluated: seeds.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanalign_core::transform_points;

    const Z_UP: [f32; 3] = [0.0, 0.0, 1.0];

    fn config() -> RegistrationConfig {
        RegistrationConfig::default()
            .with_up(Z_UP)
            .with_model_up(Z_UP)
            .with_levels(vec![0.1, 0.05], vec![0.3, 0.15])
    }

    /// Floor with two walls, 0.5 m to 1.7 m from the sensor.
    fn room() -> PointSet {
        let mut pts = Vec::new();
        let s = 0.05;
        for i in 0..24 {
            for j in 0..16 {
                let x = 0.5 + i as f32 * s;
                let y = -0.4 + j as f32 * s;
                pts.push([x, y, -0.3]);
            }
            for k in 0..12 {
                pts.push([0.5 + i as f32 * s, 0.4, -0.3 + (k + 1) as f32 * s]);
            }
        }
        for j in 0..16 {
            for k in 0..12 {
                pts.push([1.7, -0.4 + j as f32 * s, -0.3 + (k + 1) as f32 * s]);
            }
        }
        PointSet::from_points(&pts)
    }

    #[test]
    fn self_registration_is_identity() {
        let set = room();
        let model = SurfaceModel::new("room", set.clone());
        let result = register(&set, &model, &config()).unwrap();

        assert!(result.pose.is_identity(1e-3), "{:?}", result.pose);
        assert!(!result.low_confidence);
        assert_eq!(result.model_id, "room");
        assert_eq!(result.level_metrics.len(), 2);
        assert_eq!(result.seeds_evaluated, 5);
        assert!(result.metrics.rmse < 1e-3);
    }

    #[test]
    fn recovers_known_offset() {
        let model_points = room();
        let truth = RigidPose::about_pivot(Z_UP, 0.08, [1.1, 0.0, 0.0])
            .compose(&RigidPose::from_translation([0.05, -0.04, 0.02]));
        let scan = transform_points(&model_points, &truth);
        let model = SurfaceModel::new("room", model_points);

        let result = register(&scan, &model, &config().with_trim_fraction(1.0)).unwrap();
        let err = result.pose.compose(&truth.inverse());
        assert!(err.rotation_angle().to_degrees() < 1.0, "{:?}", err);
        for t in err.translation {
            assert!(t.abs() < 0.02, "{:?}", err.translation);
        }
        assert!(result.pose.is_orthonormal(1e-5));
    }

    #[test]
    fn empty_scan_is_invalid_input() {
        let model = SurfaceModel::new("room", room());
        let err = register(&PointSet::new(), &model, &config()).unwrap_err();
        assert!(matches!(err, RegistrationError::InvalidInput(_)));
    }

    #[test]
    fn scan_filtered_to_nothing_is_invalid_input() {
        // Everything is beyond the 5 m range band.
        let far = transform_points(&room(), &RigidPose::from_translation([10.0, 0.0, 0.0]));
        let model = SurfaceModel::new("room", room());
        let err = register(&far, &model, &config()).unwrap_err();
        assert!(matches!(err, RegistrationError::InvalidInput(_)));
    }

    #[test]
    fn invalid_config_is_rejected_before_work() {
        let model = SurfaceModel::new("room", room());
        let err = register(&room(), &model, &config().with_levels(vec![], vec![])).unwrap_err();
        assert!(matches!(err, RegistrationError::InvalidConfig(_)));
    }

    #[test]
    fn trim_zero_still_returns_flagged_result() {
        let set = room();
        let model = SurfaceModel::new("room", set.clone());
        let result = register(&set, &model, &config().with_trim_fraction(0.0)).unwrap();
        assert!(result.low_confidence);
        assert!(result
            .level_metrics
            .iter()
            .all(|m| m.failure.is_some()));
    }

    #[test]
    fn tie_breaks_prefer_inliers_then_rank() {
        fn candidate(rank: usize, rmse: f32, inliers: f32) -> Candidate {
            Candidate {
                rank,
                seed: CandidateSeed {
                    pose: RigidPose::identity(),
                    score: 0.0,
                    kind: crate::coarse::SeedKind::Prior,
                },
                outcome: SeedOutcome {
                    pose: RigidPose::identity(),
                    levels: vec![LevelMetrics {
                        voxel_size: 0.01,
                        max_correspondence_distance: 0.04,
                        iterations: 1,
                        rmse,
                        inlier_fraction: inliers,
                        converged: true,
                        failure: None,
                    }],
                },
            }
        }
        let tol = 1e-5;
        assert!(candidate(1, 0.001, 0.5).beats(&candidate(0, 0.002, 0.9), tol));
        assert!(candidate(1, 0.001, 0.9).beats(&candidate(0, 0.001001, 0.5), tol));
        assert!(candidate(0, 0.001, 0.9).beats(&candidate(1, 0.001, 0.9), tol));
        assert!(!candidate(1, 0.001, 0.9).beats(&candidate(0, 0.001, 0.9), tol));
        assert!(candidate(1, 0.5, 0.1).beats(&candidate(0, f32::INFINITY, 0.0), tol));
        assert!(candidate(1, 0.5, 0.1).beats(&candidate(0, f32::NAN, 1.0), tol));
    }
}

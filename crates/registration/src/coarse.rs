//! Coarse pose hypotheses: gravity, principal-axis and centering alignment
//! with a yaw sweep, ranked by a cheap point-to-plane score.

use log::debug;
use rayon::prelude::*;
use scanalign_core::{transform_points, PointSet, RigidPose};
use scanalign_spatial::VoxelIndex;
use serde::Serialize;

use crate::config::RegistrationConfig;
use crate::correspondence::find_correspondences;

/// Below this horizontal anisotropy `(λ1 - λ2) / (λ1 + λ2)` the dominant
/// axis is treated as undefined.
const MIN_ANISOTROPY: f64 = 0.05;

/// How a seed was generated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum SeedKind {
    /// Gravity + principal axis + centering, then rotated by a yaw offset.
    Aligned { yaw_offset_deg: f32 },
    /// Caller-supplied prior pose.
    Prior,
    /// Gravity + centering only, for sets too small for PCA. It is the only
    /// generated seed in that case; a configured prior is still scored next
    /// to it.
    Fallback,
}

/// A pose hypothesis (model-in-world) and its coarse fit score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CandidateSeed {
    pub pose: RigidPose,
    /// RMS point-to-plane residual on the coarsest level, clipped at the
    /// correspondence distance; unmatched points count as that distance.
    /// Lower is better.
    pub score: f32,
    pub kind: SeedKind,
}

/// Generate and rank seeds from the coarsest model and scan levels.
///
/// The aligned pose itself always comes first, followed by one seed per
/// configured yaw offset that is not a whole turn, then the prior. Seeds are
/// sorted ascending by score; equal scores keep that generation order.
/// Empty inputs yield no seeds.
pub fn estimate_seeds(
    model: &PointSet,
    scan: &PointSet,
    scan_index: &VoxelIndex,
    config: &RegistrationConfig,
) -> Vec<CandidateSeed> {
    let up = config.unit_up();
    let gravity = RigidPose::rotation_between(config.unit_model_up(), up);
    let model_g = transform_points(model, &gravity);

    let (Some(model_center), Some(scan_center)) = (model_g.aabb().center(), scan.aabb().center())
    else {
        return Vec::new();
    };
    let to_scan_center = RigidPose::from_translation([
        scan_center[0] - model_center[0],
        scan_center[1] - model_center[1],
        scan_center[2] - model_center[2],
    ]);

    let mut poses: Vec<(RigidPose, SeedKind)> = Vec::new();

    if model.len() < 3 || scan.len() < 3 {
        poses.push((gravity.compose(&to_scan_center), SeedKind::Fallback));
    } else {
        let yaw = match (
            dominant_axis_angle(&model_g, up),
            dominant_axis_angle(scan, up),
        ) {
            (Some(m), Some(s)) => wrap_half_turn(s - m),
            _ => 0.0,
        };
        debug!("coarse alignment: principal-axis yaw {:.2} deg", yaw.to_degrees());

        let aligned = gravity
            .compose(&RigidPose::about_pivot(up, yaw as f32, model_center))
            .compose(&to_scan_center);

        poses.push((aligned, SeedKind::Aligned { yaw_offset_deg: 0.0 }));
        for &offset in &config.yaw_offsets_deg {
            // the unrotated alignment is already a seed
            if offset.rem_euclid(360.0) == 0.0 {
                continue;
            }
            let sweep = RigidPose::about_pivot(up, offset.to_radians(), scan_center);
            poses.push((
                aligned.compose(&sweep),
                SeedKind::Aligned {
                    yaw_offset_deg: offset,
                },
            ));
        }
    }

    if let Some(prior) = config.initial_pose {
        poses.push((prior.orthonormalized(), SeedKind::Prior));
    }

    let max_distance = config
        .levels()
        .first()
        .map(|l| l.max_correspondence_distance)
        .unwrap_or_else(|| scan_index.cell_size());

    let mut seeds: Vec<CandidateSeed> = poses
        .par_iter()
        .map(|(pose, kind)| CandidateSeed {
            pose: *pose,
            score: coarse_score(model, scan_index, pose, max_distance, config.normal_cos_threshold),
            kind: *kind,
        })
        .collect();

    seeds.sort_by(|a, b| a.score.total_cmp(&b.score));
    for seed in &seeds {
        debug!("seed {:?}: score {:.5}", seed.kind, seed.score);
    }
    seeds
}

/// Quick fit score of `pose`: RMS point-to-plane residual, each clipped at
/// `max_distance`, with unmatched model points charged `max_distance`.
pub fn coarse_score(
    model: &PointSet,
    scan_index: &VoxelIndex,
    pose: &RigidPose,
    max_distance: f32,
    cos_threshold: f32,
) -> f32 {
    if model.is_empty() {
        return max_distance;
    }
    let posed = transform_points(model, pose);
    let correspondences = find_correspondences(&posed, scan_index, max_distance, cos_threshold);

    let clip = max_distance as f64;
    let unmatched = model.len() - correspondences.len();
    let sum_sq: f64 = correspondences
        .iter()
        .map(|c| {
            let r = (c.residual.abs() as f64).min(clip);
            r * r
        })
        .sum::<f64>()
        + unmatched as f64 * clip * clip;

    (sum_sq / model.len() as f64).sqrt() as f32
}

/// Orthonormal basis `(e1, e2)` of the plane orthogonal to `up`, with
/// `e1 × e2 = up` so positive angles follow the right-hand rule about `up`.
fn horizontal_basis(up: [f32; 3]) -> ([f64; 3], [f64; 3]) {
    let u = [up[0] as f64, up[1] as f64, up[2] as f64];
    let helper = if u[0].abs() < 0.9 {
        [1.0, 0.0, 0.0]
    } else {
        [0.0, 1.0, 0.0]
    };
    // e1 = helper projected off up
    let d = helper[0] * u[0] + helper[1] * u[1] + helper[2] * u[2];
    let mut e1 = [helper[0] - d * u[0], helper[1] - d * u[1], helper[2] - d * u[2]];
    let len = (e1[0] * e1[0] + e1[1] * e1[1] + e1[2] * e1[2]).sqrt();
    for v in e1.iter_mut() {
        *v /= len;
    }
    let e2 = [
        u[1] * e1[2] - u[2] * e1[1],
        u[2] * e1[0] - u[0] * e1[2],
        u[0] * e1[1] - u[1] * e1[0],
    ];
    (e1, e2)
}

/// Angle (radians, in `(-pi/2, pi/2]`) of the dominant horizontal principal
/// axis, measured from `e1` toward `e2` of [`horizontal_basis`].
///
/// `None` when there are fewer than three points or the horizontal spread is
/// (nearly) isotropic.
fn dominant_axis_angle(points: &PointSet, up: [f32; 3]) -> Option<f64> {
    if points.len() < 3 {
        return None;
    }
    let (e1, e2) = horizontal_basis(up);
    let project = |p: [f32; 3]| {
        let p = [p[0] as f64, p[1] as f64, p[2] as f64];
        (
            p[0] * e1[0] + p[1] * e1[1] + p[2] * e1[2],
            p[0] * e2[0] + p[1] * e2[1] + p[2] * e2[2],
        )
    };

    let n = points.len() as f64;
    let (mut mu, mut mv) = (0.0, 0.0);
    for p in points.iter_points() {
        let (u, v) = project(p);
        mu += u;
        mv += v;
    }
    mu /= n;
    mv /= n;

    let (mut cuu, mut cuv, mut cvv) = (0.0, 0.0, 0.0);
    for p in points.iter_points() {
        let (u, v) = project(p);
        let (du, dv) = (u - mu, v - mv);
        cuu += du * du;
        cuv += du * dv;
        cvv += dv * dv;
    }

    let trace = cuu + cvv;
    let spread = ((cuu - cvv) * (cuu - cvv) + 4.0 * cuv * cuv).sqrt();
    if trace <= 1e-12 || spread / trace < MIN_ANISOTROPY {
        return None;
    }
    Some(0.5 * (2.0 * cuv).atan2(cuu - cvv))
}

/// Wrap an axis-to-axis angle into `(-pi/2, pi/2]`; principal axes have no
/// direction, so a half turn is the same alignment.
fn wrap_half_turn(mut angle: f64) -> f64 {
    use std::f64::consts::{FRAC_PI_2, PI};
    while angle > FRAC_PI_2 {
        angle -= PI;
    }
    while angle <= -FRAC_PI_2 {
        angle += PI;
    }
    angle
}

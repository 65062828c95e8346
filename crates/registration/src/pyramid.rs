//! Input cleanup and multi-resolution pyramids.

use log::debug;
use rayon::prelude::*;
use scanalign_core::{Normals, PointSet};
use scanalign_filters::{
    confidence_filter, finite_filter, radius_outlier_removal, range_filter, voxel_downsample,
};
use scanalign_normals::estimate_normals;

use crate::config::RegistrationConfig;

/// One resolution of a point set: voxel-averaged points with unit normals.
#[derive(Debug, Clone, PartialEq)]
pub struct PyramidLevel {
    pub voxel_size: f32,
    pub points: PointSet,
}

/// Levels of one source, coarsest first, each built from the same input.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pyramid {
    pub levels: Vec<PyramidLevel>,
}

impl Pyramid {
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn coarsest(&self) -> Option<&PyramidLevel> {
        self.levels.first()
    }

    pub fn finest(&self) -> Option<&PyramidLevel> {
        self.levels.last()
    }
}

/// Drop non-finite, low-confidence, out-of-range and (optionally) isolated
/// scan points. The input is never modified.
pub fn preprocess_scan(scan: &PointSet, config: &RegistrationConfig) -> PointSet {
    let finite = finite_filter(scan);
    let confident = confidence_filter(&finite, config.min_confidence);
    let ranged = range_filter(
        &confident,
        config.sensor_origin,
        config.min_range,
        config.max_range,
    );
    let cleaned = radius_outlier_removal(
        &ranged,
        config.speckle_radius,
        config.speckle_min_neighbors,
    );

    debug!(
        "scan preprocessing: {} raw, {} finite, {} confident, {} in range, {} after speckle removal",
        scan.len(),
        finite.len(),
        confident.len(),
        ranged.len(),
        cleaned.len()
    );
    cleaned
}

/// Models come from stored assets, so only non-finite points are removed.
pub fn preprocess_model(model: &PointSet) -> PointSet {
    finite_filter(model)
}

/// Build one level per voxel size, in the order given.
///
/// Every level is downsampled from `points` directly, so levels are
/// independent and are built in parallel. Normals come from the input when
/// it carries them (voxel-averaged), otherwise from radius PCA with radius
/// `normal_radius_factor * voxel_size`, oriented toward `up`.
pub fn build_pyramid(
    points: &PointSet,
    voxel_sizes: &[f32],
    normal_radius_factor: f32,
    up: [f32; 3],
) -> Pyramid {
    let levels: Vec<PyramidLevel> = voxel_sizes
        .par_iter()
        .map(|&voxel_size| build_level(points, voxel_size, normal_radius_factor, up))
        .collect();

    for level in &levels {
        debug!(
            "pyramid level voxel={:.4} -> {} points",
            level.voxel_size,
            level.points.len()
        );
    }
    Pyramid { levels }
}

fn build_level(points: &PointSet, voxel_size: f32, normal_radius_factor: f32, up: [f32; 3]) -> PyramidLevel {
    let mut down = voxel_downsample(points, voxel_size);

    let normals = match down.normals.take() {
        Some(averaged) => fill_missing_normals(averaged, up),
        None => estimate_normals(&down, normal_radius_factor * voxel_size, up),
    };
    down.normals = Some(normals);

    PyramidLevel {
        voxel_size,
        points: down,
    }
}

/// Averaged input normals can cancel out inside a cell; those get `up`.
fn fill_missing_normals(normals: Normals, up: [f32; 3]) -> Normals {
    let filled: Vec<[f32; 3]> = (0..normals.len())
        .map(|i| {
            let n = normals.get(i);
            let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
            if len.is_finite() && len > 1e-6 {
                [n[0] / len, n[1] / len, n[2] / len]
            } else {
                up
            }
        })
        .collect();
    Normals::from_vectors(&filled)
}

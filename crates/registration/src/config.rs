//! Flat registration configuration with documented defaults.

use scanalign_core::RigidPose;
use scanalign_filters::ConfidenceLevel;
use serde::{Deserialize, Serialize};

use crate::error::RegistrationError;

/// Every recognized registration option.
///
/// Deserializes from any subset of fields; unset fields take the defaults
/// documented on each field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Gravity-up direction in the scan frame.
    /// Default: [0, 1, 0]
    pub up: [f32; 3],

    /// Up axis of the model in its own frame.
    /// Default: [0, 1, 0]
    pub model_up: [f32; 3],

    /// Sensor position used by the range filter.
    /// Default: origin
    pub sensor_origin: [f32; 3],

    /// Scan points below this confidence are dropped. Points without a
    /// confidence value always pass.
    /// Default: 0.5 (medium)
    pub min_confidence: f32,

    /// Radial range band kept from the sensor origin (meters, inclusive).
    /// Default: 0.25 to 5.0
    pub min_range: f32,
    pub max_range: f32,

    /// Radius-outlier removal on the scan; disabled when either is zero.
    /// Default: 0.0 / 0
    pub speckle_radius: f32,
    pub speckle_min_neighbors: usize,

    /// Pyramid voxel sizes (meters). Sorted descending before use.
    /// Default: [0.02, 0.01, 0.007]
    pub voxel_sizes: Vec<f32>,

    /// Correspondence search radius per voxel size, paired by position.
    /// Missing entries default to four times the voxel size.
    /// Default: [0.08, 0.04, 0.025]
    pub max_correspondence_distances: Vec<f32>,

    /// ICP iteration cap per pyramid level.
    /// Default: 30
    pub max_iterations_per_level: usize,

    /// Normal estimation radius as a multiple of the level voxel size.
    /// Default: 3.0
    pub normal_radius_factor: f32,

    /// Yaw offsets (degrees) swept around the aligned coarse pose.
    /// Default: [0, 45, -45, 90, -90]
    pub yaw_offsets_deg: Vec<f32>,

    /// Number of best coarse seeds handed to ICP.
    /// Default: 2
    pub seeds_to_refine: usize,

    /// Correspondences whose normals disagree by more than this cosine are
    /// rejected. Compared on `|cos|` since PCA normals carry no sign.
    /// Default: 0.75 (~41 degrees)
    pub normal_cos_threshold: f32,

    /// Fraction of correspondences kept after sorting by residual magnitude.
    /// Default: 0.7
    pub trim_fraction: f32,

    /// Huber threshold as a multiple of the level voxel size.
    /// Default: 1.0
    pub huber_delta_factor: f32,

    /// Weight of the point-to-point term that pins tangential motion on
    /// planar scenes. Zero gives pure point-to-plane ICP.
    /// Default: 0.05
    pub point_to_point_weight: f32,

    /// A level stops once the RMSE changes by less than this multiple of
    /// its voxel size between iterations.
    /// Default: 0.01
    pub convergence_factor: f32,

    /// Results with RMSE above this multiple of the finest voxel size are
    /// flagged low-confidence.
    /// Default: 3.0
    pub max_rmse_factor: f32,

    /// Results with a lower inlier fraction are flagged low-confidence.
    /// Default: 0.45
    pub min_inlier_fraction: f32,

    /// Optional prior pose (model-in-world), scored as an extra seed.
    /// Default: None
    pub initial_pose: Option<RigidPose>,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            up: [0.0, 1.0, 0.0],
            model_up: [0.0, 1.0, 0.0],
            sensor_origin: [0.0; 3],
            min_confidence: ConfidenceLevel::Medium.threshold(),
            min_range: 0.25,
            max_range: 5.0,
            speckle_radius: 0.0,
            speckle_min_neighbors: 0,
            voxel_sizes: vec![0.02, 0.01, 0.007],
            max_correspondence_distances: vec![0.08, 0.04, 0.025],
            max_iterations_per_level: 30,
            normal_radius_factor: 3.0,
            yaw_offsets_deg: vec![0.0, 45.0, -45.0, 90.0, -90.0],
            seeds_to_refine: 2,
            normal_cos_threshold: 0.75,
            trim_fraction: 0.7,
            huber_delta_factor: 1.0,
            point_to_point_weight: 0.05,
            convergence_factor: 0.01,
            max_rmse_factor: 3.0,
            min_inlier_fraction: 0.45,
            initial_pose: None,
        }
    }
}

/// Voxel size and correspondence radius of one pyramid level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelSpec {
    pub voxel_size: f32,
    pub max_correspondence_distance: f32,
}

impl RegistrationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_up(mut self, up: [f32; 3]) -> Self {
        self.up = up;
        self
    }

    pub fn with_model_up(mut self, up: [f32; 3]) -> Self {
        self.model_up = up;
        self
    }

    pub fn with_confidence_level(mut self, level: ConfidenceLevel) -> Self {
        self.min_confidence = level.threshold();
        self
    }

    pub fn with_levels(mut self, voxel_sizes: Vec<f32>, distances: Vec<f32>) -> Self {
        self.voxel_sizes = voxel_sizes;
        self.max_correspondence_distances = distances;
        self
    }

    pub fn with_yaw_offsets(mut self, degrees: Vec<f32>) -> Self {
        self.yaw_offsets_deg = degrees;
        self
    }

    pub fn with_trim_fraction(mut self, fraction: f32) -> Self {
        self.trim_fraction = fraction;
        self
    }

    pub fn with_initial_pose(mut self, pose: RigidPose) -> Self {
        self.initial_pose = Some(pose);
        self
    }

    /// Reject values no run could use.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<(), RegistrationError> {
        fn bad(msg: impl Into<String>) -> Result<(), RegistrationError> {
            Err(RegistrationError::InvalidConfig(msg.into()))
        }
        let is_direction = |v: &[f32; 3]| {
            v.iter().all(|c| c.is_finite()) && v.iter().map(|c| c * c).sum::<f32>() > 1e-12
        };

        if !is_direction(&self.up) {
            return bad("up must be a finite non-zero vector");
        }
        if !is_direction(&self.model_up) {
            return bad("model_up must be a finite non-zero vector");
        }
        if !self.sensor_origin.iter().all(|c| c.is_finite()) {
            return bad("sensor_origin must be finite");
        }
        if !self.min_confidence.is_finite() {
            return bad("min_confidence must be finite");
        }
        if !(self.min_range >= 0.0 && self.max_range > self.min_range) {
            return bad(format!(
                "range band [{}, {}] is empty",
                self.min_range, self.max_range
            ));
        }
        if self.voxel_sizes.is_empty() {
            return bad("voxel_sizes must not be empty");
        }
        if let Some(v) = self
            .voxel_sizes
            .iter()
            .find(|v| !(v.is_finite() && **v > 0.0))
        {
            return bad(format!("voxel size {v} must be finite and > 0"));
        }
        if let Some(d) = self
            .max_correspondence_distances
            .iter()
            .find(|d| !(d.is_finite() && **d > 0.0))
        {
            return bad(format!("correspondence distance {d} must be finite and > 0"));
        }
        if self.max_iterations_per_level == 0 {
            return bad("max_iterations_per_level must be at least 1");
        }
        if !(self.normal_radius_factor.is_finite() && self.normal_radius_factor > 0.0) {
            return bad("normal_radius_factor must be finite and > 0");
        }
        if !self.yaw_offsets_deg.iter().all(|d| d.is_finite()) {
            return bad("yaw offsets must be finite");
        }
        if self.seeds_to_refine == 0 {
            return bad("seeds_to_refine must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.normal_cos_threshold) {
            return bad("normal_cos_threshold must lie in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.trim_fraction) {
            return bad("trim_fraction must lie in [0, 1]");
        }
        if !(self.huber_delta_factor.is_finite() && self.huber_delta_factor > 0.0) {
            return bad("huber_delta_factor must be finite and > 0");
        }
        if !(self.point_to_point_weight.is_finite() && self.point_to_point_weight >= 0.0) {
            return bad("point_to_point_weight must be finite and >= 0");
        }
        if !(self.convergence_factor.is_finite() && self.convergence_factor >= 0.0) {
            return bad("convergence_factor must be finite and >= 0");
        }
        if !(self.speckle_radius.is_finite() && self.speckle_radius >= 0.0) {
            return bad("speckle_radius must be finite and >= 0");
        }
        if !(self.max_rmse_factor.is_finite() && self.max_rmse_factor > 0.0) {
            return bad("max_rmse_factor must be finite and > 0");
        }
        if !self.min_inlier_fraction.is_finite() {
            return bad("min_inlier_fraction must be finite");
        }
        Ok(())
    }

    /// Pyramid levels, coarsest first.
    ///
    /// Voxel sizes are paired with correspondence distances by position,
    /// then sorted descending; repeated voxel sizes keep their first pairing.
    pub fn levels(&self) -> Vec<LevelSpec> {
        let mut levels: Vec<LevelSpec> = self
            .voxel_sizes
            .iter()
            .enumerate()
            .map(|(i, &voxel_size)| LevelSpec {
                voxel_size,
                max_correspondence_distance: self
                    .max_correspondence_distances
                    .get(i)
                    .copied()
                    .unwrap_or(4.0 * voxel_size),
            })
            .collect();

        levels.sort_by(|a, b| b.voxel_size.total_cmp(&a.voxel_size));
        levels.dedup_by(|later, first| later.voxel_size == first.voxel_size);
        levels
    }

    pub(crate) fn unit_up(&self) -> [f32; 3] {
        unit(self.up)
    }

    pub(crate) fn unit_model_up(&self) -> [f32; 3] {
        unit(self.model_up)
    }
}

fn unit(v: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len.is_finite() && len > 1e-12 {
        [v[0] / len, v[1] / len, v[2] / len]
    } else {
        [0.0, 1.0, 0.0]
    }
}

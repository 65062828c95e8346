use crate::cloud::PyPointSet;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use scanalign_core::RigidPose;
use scanalign_registration::{register, RegistrationConfig, SurfaceModel};

#[pyclass(name = "RegistrationResult")]
#[derive(Debug, Clone)]
pub struct PyRegistrationResult {
    /// Model-in-world pose, row-major 4x4.
    #[pyo3(get)]
    pub matrix: [[f32; 4]; 4],
    #[pyo3(get)]
    pub rmse: f32,
    #[pyo3(get)]
    pub inlier_fraction: f32,
    #[pyo3(get)]
    pub iterations: usize,
    #[pyo3(get)]
    pub voxel_size: f32,
    #[pyo3(get)]
    pub low_confidence: bool,
    #[pyo3(get)]
    pub model_id: String,
    #[pyo3(get)]
    pub elapsed_seconds: f64,
}

#[pymethods]
impl PyRegistrationResult {
    pub fn __repr__(&self) -> String {
        format!(
            "RegistrationResult(model_id={:?}, rmse={:.6}, inlier_fraction={:.3}, low_confidence={})",
            self.model_id, self.rmse, self.inlier_fraction, self.low_confidence
        )
    }
}

/// Register `model` against `scan`. Keyword arguments override fields of the
/// default configuration by name; unknown names raise ValueError.
/// `initial_pose` takes a row-major 4x4 matrix (nested lists) or None.
#[pyfunction(name = "register")]
#[pyo3(signature = (scan, model, model_id="model", **config))]
pub fn register_py(
    py: Python<'_>,
    scan: &PyPointSet,
    model: &PyPointSet,
    model_id: &str,
    config: Option<&Bound<'_, PyDict>>,
) -> PyResult<PyRegistrationResult> {
    let config = match config {
        Some(overrides) => config_from_kwargs(overrides)?,
        None => RegistrationConfig::default(),
    };
    let surface = SurfaceModel::new(model_id, model.inner.clone());
    let scan = scan.inner.clone();

    let result = py
        .allow_threads(|| register(&scan, &surface, &config))
        .map_err(|e| PyValueError::new_err(e.to_string()))?;

    Ok(PyRegistrationResult {
        matrix: result.to_row_major(),
        rmse: result.metrics.rmse,
        inlier_fraction: result.metrics.inlier_fraction,
        iterations: result.metrics.iterations,
        voxel_size: result.metrics.voxel_size,
        low_confidence: result.low_confidence,
        model_id: result.model_id,
        elapsed_seconds: result.metrics.elapsed.as_secs_f64(),
    })
}

fn config_from_kwargs(kwargs: &Bound<'_, PyDict>) -> PyResult<RegistrationConfig> {
    let mut config = RegistrationConfig::default();
    for (key, value) in kwargs.iter() {
        let key: String = key.extract()?;
        match key.as_str() {
            "up" => config.up = value.extract()?,
            "model_up" => config.model_up = value.extract()?,
            "sensor_origin" => config.sensor_origin = value.extract()?,
            "min_confidence" => config.min_confidence = value.extract()?,
            "min_range" => config.min_range = value.extract()?,
            "max_range" => config.max_range = value.extract()?,
            "speckle_radius" => config.speckle_radius = value.extract()?,
            "speckle_min_neighbors" => config.speckle_min_neighbors = value.extract()?,
            "voxel_sizes" => config.voxel_sizes = value.extract()?,
            "max_correspondence_distances" => {
                config.max_correspondence_distances = value.extract()?
            }
            "max_iterations_per_level" => config.max_iterations_per_level = value.extract()?,
            "normal_radius_factor" => config.normal_radius_factor = value.extract()?,
            "yaw_offsets_deg" => config.yaw_offsets_deg = value.extract()?,
            "seeds_to_refine" => config.seeds_to_refine = value.extract()?,
            "normal_cos_threshold" => config.normal_cos_threshold = value.extract()?,
            "trim_fraction" => config.trim_fraction = value.extract()?,
            "huber_delta_factor" => config.huber_delta_factor = value.extract()?,
            "point_to_point_weight" => config.point_to_point_weight = value.extract()?,
            "convergence_factor" => config.convergence_factor = value.extract()?,
            "max_rmse_factor" => config.max_rmse_factor = value.extract()?,
            "min_inlier_fraction" => config.min_inlier_fraction = value.extract()?,
            "initial_pose" => {
                config.initial_pose = if value.is_none() {
                    None
                } else {
                    let matrix: [[f32; 4]; 4] = value.extract()?;
                    Some(RigidPose::from_row_major(&matrix).ok_or_else(|| {
                        PyValueError::new_err(
                            "initial_pose must be a finite 4x4 rigid transform (row-major)",
                        )
                    })?)
                }
            }
            other => {
                return Err(PyValueError::new_err(format!(
                    "unknown registration option '{other}'"
                )))
            }
        }
    }
    Ok(config)
}

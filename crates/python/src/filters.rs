use crate::cloud::PyPointSet;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

#[pyfunction(name = "voxel_downsample")]
pub fn voxel_downsample_py(cloud: &PyPointSet, voxel_size: f32) -> PyResult<PyPointSet> {
    if !voxel_size.is_finite() || voxel_size <= 0.0 {
        return Err(PyValueError::new_err("voxel_size must be > 0 and finite"));
    }
    let out = scanalign_filters::voxel_downsample(&cloud.inner, voxel_size);
    Ok(PyPointSet { inner: out })
}

#[pyfunction(name = "range_filter")]
#[pyo3(signature = (cloud, min_range=0.25, max_range=5.0, origin=[0.0, 0.0, 0.0]))]
pub fn range_filter_py(
    cloud: &PyPointSet,
    min_range: f32,
    max_range: f32,
    origin: [f32; 3],
) -> PyPointSet {
    let out = scanalign_filters::range_filter(&cloud.inner, origin, min_range, max_range);
    PyPointSet { inner: out }
}

/// Keep points whose confidence reaches `level` ("low", "medium", "high").
#[pyfunction(name = "confidence_filter")]
#[pyo3(signature = (cloud, level="medium"))]
pub fn confidence_filter_py(cloud: &PyPointSet, level: &str) -> PyResult<PyPointSet> {
    let level = match level {
        "low" => scanalign_filters::ConfidenceLevel::Low,
        "medium" => scanalign_filters::ConfidenceLevel::Medium,
        "high" => scanalign_filters::ConfidenceLevel::High,
        _ => {
            return Err(PyValueError::new_err(
                "level must be 'low', 'medium', or 'high'",
            ))
        }
    };
    let out = scanalign_filters::confidence_filter(&cloud.inner, level.threshold());
    Ok(PyPointSet { inner: out })
}

#[pyfunction(name = "radius_outlier_removal")]
pub fn radius_outlier_removal_py(
    cloud: &PyPointSet,
    radius: f32,
    min_neighbors: usize,
) -> PyResult<PyPointSet> {
    if !radius.is_finite() || radius <= 0.0 {
        return Err(PyValueError::new_err("radius must be > 0 and finite"));
    }
    let out = scanalign_filters::radius_outlier_removal(&cloud.inner, radius, min_neighbors);
    Ok(PyPointSet { inner: out })
}

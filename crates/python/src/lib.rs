#![allow(clippy::useless_conversion)]

use pyo3::prelude::*;

mod cloud;
mod filters;
mod normals;
mod registration;

#[pymodule]
fn scanalign_py(_py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Core
    m.add_class::<cloud::PyPointSet>()?;

    // Filters
    m.add_function(wrap_pyfunction!(filters::voxel_downsample_py, m)?)?;
    m.add_function(wrap_pyfunction!(filters::range_filter_py, m)?)?;
    m.add_function(wrap_pyfunction!(filters::confidence_filter_py, m)?)?;
    m.add_function(wrap_pyfunction!(filters::radius_outlier_removal_py, m)?)?;

    // Normals
    m.add_function(wrap_pyfunction!(normals::estimate_normals_py, m)?)?;

    // Registration
    m.add_class::<registration::PyRegistrationResult>()?;
    m.add_function(wrap_pyfunction!(registration::register_py, m)?)?;

    Ok(())
}

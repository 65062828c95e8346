use crate::cloud::PyPointSet;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

#[pyfunction(name = "estimate_normals")]
#[pyo3(signature = (cloud, radius, up=[0.0, 1.0, 0.0]))]
pub fn estimate_normals_py(cloud: &PyPointSet, radius: f32, up: [f32; 3]) -> PyResult<PyPointSet> {
    if !radius.is_finite() || radius <= 0.0 {
        return Err(PyValueError::new_err("radius must be > 0 and finite"));
    }
    let out = scanalign_normals::with_normals(&cloud.inner, radius, up);
    Ok(PyPointSet { inner: out })
}

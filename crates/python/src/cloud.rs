use numpy::{Element, PyArray1, PyArray2, PyArrayMethods, PyUntypedArrayMethods};
use pyo3::exceptions::{PyTypeError, PyValueError};
use pyo3::prelude::*;
use scanalign_core::PointSet;

#[pyclass(name = "PointSet")]
#[derive(Debug, Clone)]
pub struct PyPointSet {
    pub(crate) inner: PointSet,
}

#[pymethods]
impl PyPointSet {
    #[new]
    pub fn new() -> Self {
        Self {
            inner: PointSet::new(),
        }
    }

    /// Create a PointSet from an Nx3 NumPy array, with optional per-point
    /// confidence of shape (N,).
    ///
    /// Accepts f32 or f64 arrays; f64 is cast to f32. Arrays must be
    /// C-contiguous (row-major); Fortran-order input is rejected rather than
    /// silently misread.
    #[staticmethod]
    #[pyo3(signature = (points, confidence=None))]
    pub fn from_numpy(
        points: &Bound<'_, PyAny>,
        confidence: Option<&Bound<'_, PyAny>>,
    ) -> PyResult<Self> {
        let xyz = if let Ok(arr) = points.downcast::<PyArray2<f32>>() {
            read_xyz(arr, |v| v)?
        } else if let Ok(arr) = points.downcast::<PyArray2<f64>>() {
            read_xyz(arr, |v| v as f32)?
        } else {
            return Err(PyTypeError::new_err(
                "expected NumPy array with dtype float32 or float64, shape (N, 3)",
            ));
        };
        let n = xyz.len() / 3;
        let mut inner = PointSet::from_array(&xyz, n);

        if let Some(conf) = confidence {
            let values = if let Ok(arr) = conf.downcast::<PyArray1<f32>>() {
                arr.to_vec()
                    .map_err(|e| PyValueError::new_err(e.to_string()))?
            } else if let Ok(arr) = conf.downcast::<PyArray1<f64>>() {
                arr.to_vec()
                    .map_err(|e| PyValueError::new_err(e.to_string()))?
                    .into_iter()
                    .map(|v| v as f32)
                    .collect()
            } else {
                return Err(PyTypeError::new_err(
                    "confidence must be a float32 or float64 array of shape (N,)",
                ));
            };
            if values.len() != n {
                return Err(PyValueError::new_err(format!(
                    "confidence has {} values for {} points",
                    values.len(),
                    n
                )));
            }
            inner = inner.with_confidence(values);
        }

        Ok(Self { inner })
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn has_normals(&self) -> bool {
        self.inner.normals.is_some()
    }

    pub fn to_numpy<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray2<f32>>> {
        let rows: Vec<Vec<f32>> = self.inner.iter_points().map(|p| p.to_vec()).collect();
        Ok(PyArray2::from_vec2_bound(py, &rows)?)
    }

    /// Normals as an Nx3 array, or None when absent.
    pub fn normals_to_numpy<'py>(
        &self,
        py: Python<'py>,
    ) -> PyResult<Option<Bound<'py, PyArray2<f32>>>> {
        let Some(normals) = self.inner.normals.as_ref() else {
            return Ok(None);
        };
        let rows: Vec<Vec<f32>> = (0..normals.len()).map(|i| normals.get(i).to_vec()).collect();
        Ok(Some(PyArray2::from_vec2_bound(py, &rows)?))
    }

    pub fn __len__(&self) -> usize {
        self.inner.len()
    }

    pub fn __repr__(&self) -> String {
        format!(
            "PointSet(n={}, normals={}, confidence={})",
            self.inner.len(),
            self.inner.normals.is_some(),
            self.inner.confidence.is_some()
        )
    }
}

/// Interleaved xyz from a C-contiguous (N, 3) array.
fn read_xyz<T: Element + Copy>(
    array: &Bound<'_, PyArray2<T>>,
    cast: impl Fn(T) -> f32,
) -> PyResult<Vec<f32>> {
    if !array.is_c_contiguous() {
        return Err(PyValueError::new_err(
            "array must be C-contiguous (row-major). \
             Use numpy.ascontiguousarray(arr) to convert.",
        ));
    }
    let readonly = array.readonly();
    let shape = readonly.shape();
    if shape.len() != 2 || shape[1] != 3 {
        return Err(PyValueError::new_err("expected shape (N, 3)"));
    }
    let slice = readonly
        .as_slice()
        .map_err(|_| PyValueError::new_err("failed to read array as contiguous slice"))?;
    Ok(slice.iter().map(|&v| cast(v)).collect())
}

use rayon::prelude::*;
use scanalign_core::{Normals, PointSet};
use scanalign_spatial::{CellMode, VoxelIndex};

/// Estimate a unit surface normal for every point using PCA over the
/// neighbours within `radius`.
///
/// Neighbours are gathered through a [`VoxelIndex`] with cell size equal to
/// `radius`. The normal is the eigenvector of the smallest eigenvalue of the
/// neighbourhood covariance, flipped so that it never points against `up`.
/// Points with fewer than three neighbours (itself included), and points whose
/// neighbourhood is degenerate, get `up` itself.
///
/// The computation is parallelized across points using rayon.
pub fn estimate_normals(set: &PointSet, radius: f32, up: [f32; 3]) -> Normals {
    if set.is_empty() {
        return Normals::empty();
    }

    let up = unit_or_z(up);
    let n = set.len();

    if !(radius.is_finite() && radius > 0.0) {
        return Normals::from_vectors(&vec![up; n]);
    }

    let index = VoxelIndex::build(set, radius, CellMode::Raw);

    // Pre-extract points into contiguous array for cache-friendly access
    let points: Vec<[f32; 3]> = set.iter_points().collect();

    let normals: Vec<[f32; 3]> = points
        .par_iter()
        .map(|point| {
            let neighbors = index.within_radius(point, radius);
            if neighbors.len() < 3 {
                return up;
            }
            plane_normal(&points, &neighbors)
                .map(|n| orient_toward(n, up))
                .unwrap_or(up)
        })
        .collect();

    Normals::from_vectors(&normals)
}

/// Same points, with normals from [`estimate_normals`] attached.
pub fn with_normals(set: &PointSet, radius: f32, up: [f32; 3]) -> PointSet {
    let mut out = set.clone();
    out.normals = Some(estimate_normals(set, radius, up));
    out
}

/// Best-fit plane normal of the selected points, or `None` when the
/// neighbourhood has no well-defined smallest-variance direction.
fn plane_normal(points: &[[f32; 3]], neighbors: &[usize]) -> Option<[f32; 3]> {
    let count = neighbors.len() as f64;

    let mut c = [0.0f64; 3];
    for &idx in neighbors {
        for axis in 0..3 {
            c[axis] += points[idx][axis] as f64;
        }
    }
    for v in c.iter_mut() {
        *v /= count;
    }

    // Upper triangle of the symmetric 3x3 covariance
    let mut c00 = 0.0f64;
    let mut c01 = 0.0f64;
    let mut c02 = 0.0f64;
    let mut c11 = 0.0f64;
    let mut c12 = 0.0f64;
    let mut c22 = 0.0f64;
    for &idx in neighbors {
        let dx = points[idx][0] as f64 - c[0];
        let dy = points[idx][1] as f64 - c[1];
        let dz = points[idx][2] as f64 - c[2];
        c00 += dx * dx;
        c01 += dx * dy;
        c02 += dx * dz;
        c11 += dy * dy;
        c12 += dy * dz;
        c22 += dz * dz;
    }

    smallest_eigenvector_3x3(c00, c01, c02, c11, c12, c22)
}

fn orient_toward(n: [f32; 3], up: [f32; 3]) -> [f32; 3] {
    if n[0] * up[0] + n[1] * up[1] + n[2] * up[2] < 0.0 {
        [-n[0], -n[1], -n[2]]
    } else {
        n
    }
}

fn unit_or_z(v: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len.is_finite() && len > 1e-12 {
        [v[0] / len, v[1] / len, v[2] / len]
    } else {
        [0.0, 0.0, 1.0]
    }
}

/// Eigenvector of the smallest eigenvalue of a 3x3 symmetric matrix, using
/// Cardano's closed form for the eigenvalues and a cross product of two rows
/// of `A - λI` for the null direction.
///
/// The matrix is:
///   | a00  a01  a02 |
///   | a01  a11  a12 |
///   | a02  a12  a22 |
///
/// Returns `None` for a (near) scalar matrix, where every direction is an
/// eigenvector.
#[inline]
fn smallest_eigenvector_3x3(
    a00: f64,
    a01: f64,
    a02: f64,
    a11: f64,
    a12: f64,
    a22: f64,
) -> Option<[f32; 3]> {
    let m = (a00 + a11 + a22) / 3.0;

    let b00 = a00 - m;
    let b11 = a11 - m;
    let b22 = a22 - m;

    // q = det(B) / 2, p = |B|_F^2 / 6 with B = A - mI
    let q = (b00 * (b11 * b22 - a12 * a12) - a01 * (a01 * b22 - a12 * a02)
        + a02 * (a01 * a12 - b11 * a02))
        / 2.0;
    let p = (b00 * b00 + b11 * b11 + b22 * b22 + 2.0 * (a01 * a01 + a02 * a02 + a12 * a12)) / 6.0;

    let pp = p.max(0.0);
    let scale = (a00.abs() + a11.abs() + a22.abs()).max(1e-300);
    if pp < 1e-30 || pp.sqrt() < 1e-9 * scale {
        return None;
    }

    let det_ratio = (q / (pp * pp.sqrt())).clamp(-1.0, 1.0);
    let phi = det_ratio.acos() / 3.0;

    // Covariances are positive semi-definite, so this root is the smallest.
    let lambda = m + 2.0 * pp.sqrt() * (phi + 2.0 * std::f64::consts::FRAC_PI_3).cos();

    let r00 = a00 - lambda;
    let r11 = a11 - lambda;
    let r22 = a22 - lambda;

    // Rows of A - λI; the null direction is orthogonal to all of them. Take
    // the best-conditioned of the three pairwise cross products.
    let rows = [[r00, a01, a02], [a01, r11, a12], [a02, a12, r22]];
    let crosses = [
        cross(&rows[0], &rows[1]),
        cross(&rows[0], &rows[2]),
        cross(&rows[1], &rows[2]),
    ];
    let (best, len2) = crosses
        .iter()
        .map(|c| (c, c[0] * c[0] + c[1] * c[1] + c[2] * c[2]))
        .fold((&crosses[0], -1.0), |acc, cur| if cur.1 > acc.1 { cur } else { acc });

    if len2 < 1e-30 {
        return None;
    }
    let inv = 1.0 / len2.sqrt();
    Some([
        (best[0] * inv) as f32,
        (best[1] * inv) as f32,
        (best[2] * inv) as f32,
    ])
}

#[inline]
fn cross(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

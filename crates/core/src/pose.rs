use nalgebra::{Matrix3, Rotation3, Unit, Vector3, SVD};
use serde::{Deserialize, Serialize};

use crate::{Normals, PointSet};

/// A rigid-body transform: a proper rotation (row-major 3×3) plus a
/// translation, acting on points as `R * p + t`.
///
/// Registration output is always *model-in-world*: a model point `p` is
/// placed in the scan frame at `pose.apply_to_point(&p)`. Apply the pose to
/// the placed object directly, never to an intermediate parent frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidPose {
    pub rotation: [[f32; 3]; 3],
    pub translation: [f32; 3],
}

impl RigidPose {
    pub fn identity() -> Self {
        Self {
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            translation: [0.0, 0.0, 0.0],
        }
    }

    pub fn from_parts(rotation: [[f32; 3]; 3], translation: [f32; 3]) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn from_translation(translation: [f32; 3]) -> Self {
        Self {
            translation,
            ..Self::identity()
        }
    }

    /// Rotation of `angle` radians about `axis` (right-hand rule), no
    /// translation. A zero or non-finite axis yields the identity.
    pub fn from_axis_angle(axis: [f32; 3], angle: f32) -> Self {
        let axis = Vector3::new(axis[0] as f64, axis[1] as f64, axis[2] as f64);
        if !axis.iter().all(|v| v.is_finite()) || axis.norm() < 1e-12 || !angle.is_finite() {
            return Self::identity();
        }
        let rot = Rotation3::from_axis_angle(&Unit::new_normalize(axis), angle as f64);
        Self::from_nalgebra(rot.matrix(), &Vector3::zeros())
    }

    /// Shortest rotation taking direction `from` onto direction `to`.
    ///
    /// Opposite directions get a half turn about an arbitrary perpendicular
    /// axis. Degenerate (zero or non-finite) inputs yield the identity.
    pub fn rotation_between(from: [f32; 3], to: [f32; 3]) -> Self {
        let a = Vector3::new(from[0] as f64, from[1] as f64, from[2] as f64);
        let b = Vector3::new(to[0] as f64, to[1] as f64, to[2] as f64);
        let finite = a.iter().chain(b.iter()).all(|v| v.is_finite());
        if !finite || a.norm() < 1e-12 || b.norm() < 1e-12 {
            return Self::identity();
        }
        let rot = Rotation3::rotation_between(&a, &b).unwrap_or_else(|| {
            let axis = Unit::new_normalize(perpendicular(&a.normalize()));
            Rotation3::from_axis_angle(&axis, std::f64::consts::PI)
        });
        Self::from_nalgebra(rot.matrix(), &Vector3::zeros())
    }

    /// Rotation of `angle` radians about the line through `pivot` along `axis`.
    pub fn about_pivot(axis: [f32; 3], angle: f32, pivot: [f32; 3]) -> Self {
        let rot = Self::from_axis_angle(axis, angle);
        let rp = rot.rotate_vector(&pivot);
        Self {
            rotation: rot.rotation,
            translation: [pivot[0] - rp[0], pivot[1] - rp[1], pivot[2] - rp[2]],
        }
    }

    pub fn from_nalgebra(rotation: &Matrix3<f64>, translation: &Vector3<f64>) -> Self {
        let mut r = [[0.0f32; 3]; 3];
        for (row, out) in r.iter_mut().enumerate() {
            for (col, v) in out.iter_mut().enumerate() {
                *v = rotation[(row, col)] as f32;
            }
        }
        Self {
            rotation: r,
            translation: [
                translation[0] as f32,
                translation[1] as f32,
                translation[2] as f32,
            ],
        }
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        let r = &self.rotation;
        Matrix3::new(
            r[0][0] as f64,
            r[0][1] as f64,
            r[0][2] as f64,
            r[1][0] as f64,
            r[1][1] as f64,
            r[1][2] as f64,
            r[2][0] as f64,
            r[2][1] as f64,
            r[2][2] as f64,
        )
    }

    pub fn translation_vector(&self) -> Vector3<f64> {
        Vector3::new(
            self.translation[0] as f64,
            self.translation[1] as f64,
            self.translation[2] as f64,
        )
    }

    pub fn is_identity(&self, eps: f32) -> bool {
        let id = Self::identity();
        for r in 0..3 {
            for c in 0..3 {
                if (self.rotation[r][c] - id.rotation[r][c]).abs() > eps {
                    return false;
                }
            }
        }
        self.translation.iter().all(|t| t.abs() <= eps)
    }

    /// Apply the rigid transform to a single point: R * p + t
    pub fn apply_to_point(&self, p: &[f32; 3]) -> [f32; 3] {
        let r = self.rotate_vector(p);
        [
            r[0] + self.translation[0],
            r[1] + self.translation[1],
            r[2] + self.translation[2],
        ]
    }

    /// Apply only the rotation: R * v
    pub fn rotate_vector(&self, v: &[f32; 3]) -> [f32; 3] {
        let r = &self.rotation;
        [
            r[0][0] * v[0] + r[0][1] * v[1] + r[0][2] * v[2],
            r[1][0] * v[0] + r[1][1] * v[1] + r[1][2] * v[2],
            r[2][0] * v[0] + r[2][1] * v[1] + r[2][2] * v[2],
        ]
    }

    /// Compose two transforms: apply `self` first, then `other`.
    ///
    /// Result: R_new = other.R * self.R, t_new = other.R * self.t + other.t
    pub fn compose(&self, other: &RigidPose) -> RigidPose {
        let r_self = self.rotation_matrix();
        let r_other = other.rotation_matrix();
        let r_new = r_other * r_self;
        let t_new = r_other * self.translation_vector() + other.translation_vector();
        Self::from_nalgebra(&r_new, &t_new)
    }

    pub fn inverse(&self) -> RigidPose {
        let rt = self.rotation_matrix().transpose();
        let t = -(rt * self.translation_vector());
        Self::from_nalgebra(&rt, &t)
    }

    pub fn determinant(&self) -> f32 {
        self.rotation_matrix().determinant() as f32
    }

    /// Project the rotation back onto SO(3) (nearest proper rotation in the
    /// Frobenius sense). The translation is left untouched.
    pub fn orthonormalized(&self) -> RigidPose {
        let r = self.rotation_matrix();
        let svd = SVD::new(r, true, true);
        let (mut u, v_t) = match (svd.u, svd.v_t) {
            (Some(u), Some(v_t)) => (u, v_t),
            _ => return *self,
        };
        if (u * v_t).determinant() < 0.0 {
            for row in 0..3 {
                u[(row, 2)] = -u[(row, 2)];
            }
        }
        Self::from_nalgebra(&(u * v_t), &self.translation_vector())
    }

    /// Columns unit length, pairwise orthogonal and `det = +1`, within `tol`.
    pub fn is_orthonormal(&self, tol: f32) -> bool {
        let r = self.rotation_matrix();
        let should_be_identity = r.transpose() * r;
        let tol = tol as f64;
        (should_be_identity - Matrix3::identity())
            .iter()
            .all(|v| v.abs() <= tol)
            && (r.determinant() - 1.0).abs() <= tol
    }

    /// Total rotation angle in radians, in `[0, pi]`.
    pub fn rotation_angle(&self) -> f32 {
        let r = &self.rotation;
        let trace = r[0][0] + r[1][1] + r[2][2];
        ((trace - 1.0) * 0.5).clamp(-1.0, 1.0).acos()
    }

    /// Signed rotation angle about `axis`, measured on the plane orthogonal
    /// to it, in `(-pi, pi]`.
    pub fn yaw_about(&self, axis: [f32; 3]) -> f32 {
        let a = Vector3::new(axis[0] as f64, axis[1] as f64, axis[2] as f64);
        if a.norm() < 1e-12 {
            return 0.0;
        }
        let a = a.normalize();
        let e = perpendicular(&a);
        let re = self.rotation_matrix() * e;
        let re = re - a * a.dot(&re);
        e.cross(&re).dot(&a).atan2(e.dot(&re)) as f32
    }

    /// Homogeneous 4×4 matrix, row-major (`m[row][col]`).
    pub fn to_row_major(&self) -> [[f32; 4]; 4] {
        let r = &self.rotation;
        let t = &self.translation;
        [
            [r[0][0], r[0][1], r[0][2], t[0]],
            [r[1][0], r[1][1], r[1][2], t[1]],
            [r[2][0], r[2][1], r[2][2], t[2]],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }

    /// Inverse of [`to_row_major`](Self::to_row_major). The rotation block
    /// is re-orthonormalized.
    ///
    /// Returns `None` for non-finite entries or a bottom row other than
    /// `[0, 0, 0, 1]`.
    pub fn from_row_major(m: &[[f32; 4]; 4]) -> Option<Self> {
        if !m.iter().flatten().all(|v| v.is_finite()) || m[3] != [0.0, 0.0, 0.0, 1.0] {
            return None;
        }
        let rotation = [
            [m[0][0], m[0][1], m[0][2]],
            [m[1][0], m[1][1], m[1][2]],
            [m[2][0], m[2][1], m[2][2]],
        ];
        let translation = [m[0][3], m[1][3], m[2][3]];
        Some(Self::from_parts(rotation, translation).orthonormalized())
    }

    /// Homogeneous 4×4 matrix flattened column-major, as graphics APIs expect.
    pub fn to_column_major(&self) -> [f32; 16] {
        let m = self.to_row_major();
        let mut out = [0.0f32; 16];
        for col in 0..4 {
            for row in 0..4 {
                out[col * 4 + row] = m[row][col];
            }
        }
        out
    }
}

impl Default for RigidPose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Some unit vector orthogonal to the (unit) input.
fn perpendicular(a: &Vector3<f64>) -> Vector3<f64> {
    let helper = if a.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    a.cross(&helper).normalize()
}

/// Apply a rigid transform to every point in a set, returning a new set.
///
/// Normals are rotated; confidence is copied unchanged.
pub fn transform_points(set: &PointSet, pose: &RigidPose) -> PointSet {
    let n = set.len();
    let mut x = Vec::with_capacity(n);
    let mut y = Vec::with_capacity(n);
    let mut z = Vec::with_capacity(n);

    for p in set.iter_points() {
        let tp = pose.apply_to_point(&p);
        x.push(tp[0]);
        y.push(tp[1]);
        z.push(tp[2]);
    }

    let normals = set.normals.as_ref().map(|normals| {
        let rotated: Vec<[f32; 3]> = (0..normals.len())
            .map(|i| pose.rotate_vector(&normals.get(i)))
            .collect();
        Normals::from_vectors(&rotated)
    });

    PointSet {
        x,
        y,
        z,
        normals,
        confidence: set.confidence.clone(),
    }
}

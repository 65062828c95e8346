#![forbid(unsafe_code)]

pub mod bbox;
pub mod point_set;
pub mod pose;

pub use bbox::Aabb;
pub use point_set::{Normals, PointSet};
pub use pose::{transform_points, RigidPose};

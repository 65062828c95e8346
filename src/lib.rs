//! Align a prior 3D surface model with a live depth scan.
//!
//! This crate re-exports the workspace members so applications can depend on
//! a single crate. The entry point is [`register`].

#![forbid(unsafe_code)]

pub use scanalign_core as core;
pub use scanalign_filters as filters;
pub use scanalign_normals as normals;
pub use scanalign_registration as registration;
pub use scanalign_spatial as spatial;

pub use scanalign_core::{transform_points, Aabb, Normals, PointSet, RigidPose};
pub use scanalign_filters::ConfidenceLevel;
pub use scanalign_registration::{
    register, IcpFailure, LevelMetrics, RegistrationConfig, RegistrationError,
    RegistrationMetrics, RegistrationResult, SurfaceModel,
};

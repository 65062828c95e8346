#![forbid(unsafe_code)]

pub mod estimate;

pub use estimate::{estimate_normals, with_normals};

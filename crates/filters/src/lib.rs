#![forbid(unsafe_code)]

pub mod confidence;
pub mod finite;
pub mod radius_outlier;
pub mod range;
pub mod voxel_downsample;

pub use confidence::{confidence_filter, ConfidenceLevel};
pub use finite::finite_filter;
pub use radius_outlier::radius_outlier_removal;
pub use range::range_filter;
pub use voxel_downsample::voxel_downsample;

#![forbid(unsafe_code)]

pub mod voxel_index;

pub use voxel_index::{voxel_key, CellMode, Neighbor, VoxelIndex, VoxelKey};

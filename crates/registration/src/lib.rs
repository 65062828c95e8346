#![forbid(unsafe_code)]

pub mod coarse;
pub mod config;
pub mod correspondence;
pub mod error;
pub mod icp;
pub mod pipeline;
pub mod pyramid;

pub use coarse::{coarse_score, estimate_seeds, CandidateSeed, SeedKind};
pub use config::{LevelSpec, RegistrationConfig};
pub use correspondence::{find_correspondences, trim_correspondences, Correspondence};
pub use error::{IcpFailure, RegistrationError};
pub use icp::{huber_weight, refine_level, refine_seed, LevelMetrics, LevelOutcome, LevelParams, SeedOutcome};
pub use pipeline::{register, RegistrationMetrics, RegistrationResult, SurfaceModel};
pub use pyramid::{build_pyramid, preprocess_model, preprocess_scan, Pyramid, PyramidLevel};

use serde::Serialize;
use thiserror::Error;

/// Failures that abort a registration request.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistrationError {
    /// A point set is empty or degenerate after filtering.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The configuration cannot describe a valid run.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Numerical failure inside one ICP iteration.
///
/// Never propagated out of the pipeline: the refiner stops the current
/// seed/level, records the failure in its level metrics and moves on.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IcpFailure {
    #[error("need at least 3 correspondences, got {found}")]
    TooFewCorrespondences { found: usize },
    #[error("normal equations are singular")]
    SingularSystem,
    #[error("solver produced a non-finite update")]
    NonFiniteUpdate,
}

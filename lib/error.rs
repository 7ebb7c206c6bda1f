//! Error types shared across model, register, and evolution code.

use thiserror::Error;

/// All failure modes of the register engine.
///
/// Structural errors (`InvalidLevelIndex`, `DimensionMismatch`,
/// `UnsupportedInteractionTopology`) are detected eagerly at the start of the
/// offending `build_*` call, before any matrix is allocated, and leave
/// previously built operators untouched. `NumericalInstability` can only
/// surface during evolution; the partial trajectory is discarded.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum RegisterError {
    /// A term references a level outside `0..nrlevels`.
    #[error("level index {index} out of range for {nrlevels}-level system")]
    InvalidLevelIndex { index: usize, nrlevels: usize },

    /// Composite operator/state dimensions disagree.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// `simulate` was called before the required operators were built.
    #[error("cannot simulate before building: {0}")]
    NotBuilt(&'static str),

    /// Connectivity references atoms/states that cannot be resolved to a
    /// valid interacting pair.
    #[error("unsupported interaction topology: {0}")]
    UnsupportedInteractionTopology(String),

    /// The integrator exhausted its step/tolerance budget before reaching
    /// the final grid time.
    #[error("integrator budget exhausted at t = {t} after {steps} steps")]
    NumericalInstability { t: f64, steps: usize },
}

pub type RegisterResult<T> = Result<T, RegisterError>;

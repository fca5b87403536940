//! Error taxonomy surfaced across the calculation core.

use thiserror::Error;

/// Single sum-type error propagated by value through the core.
///
/// The deserializer enriches [`PgmError::Serialization`] with a `path`
/// pointing at the offending element; the solver reports non-convergence
/// as [`PgmError::IterationDiverge`]; everything else surfaces unchanged.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PgmError {
    /// Schema violation while decoding a dataset. `path` follows
    /// `<root>/<scenario>/<component>/<element>/<attribute>` with segments
    /// omitted where not applicable.
    #[error("{message} (path: {path})")]
    Serialization { message: String, path: String },

    /// An unrecognized `calculation_method` was requested.
    #[error("invalid calculation method: {0}")]
    InvalidCalculationMethod(String),

    /// A pivot magnitude fell below the singularity tolerance during solve.
    #[error("singular matrix encountered during factorization or solve")]
    SingularMatrix,

    /// The fixed-point iteration did not converge within `max_iter`.
    #[error("iteration diverged after {iterations} iterations (last deviation {last_deviation:e})")]
    IterationDiverge { last_deviation: f64, iterations: usize },

    /// A short-circuit phase selection was invalid.
    #[error("invalid short circuit phases: {0}")]
    InvalidShortCircuitPhases(String),

    /// An enum match hit a case the caller did not account for.
    #[error("missing case for enum in {context}: {value}")]
    MissingCaseForEnumError { context: String, value: String },

    /// A function reached a state the implementation asserts can't happen.
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// A named Non-goal of this core (e.g. Newton-Raphson PF, SE, SC).
    #[error("not implemented in this core: {0}")]
    NotImplemented(String),
}

pub type Result<T> = std::result::Result<T, PgmError>;

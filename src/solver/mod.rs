//! Symbolic+numeric factorization of the block-structured admittance
//! matrix with a reusable solve.

#[cfg(feature = "rsparse")]
mod rsparse;
#[cfg(feature = "rsparse")]
pub use rsparse::RSparseSolver;

#[cfg(feature = "faer")]
mod faer_backend;
#[cfg(feature = "faer")]
pub use faer_backend::FaerSolver;

#[cfg(feature = "rsparse")]
pub type DefaultSolver = RSparseSolver;

#[cfg(all(not(feature = "rsparse"), feature = "faer"))]
pub type DefaultSolver = FaerSolver;

use crate::error::{PgmError, Result};
use num_complex::Complex64;

/// A reusable sparse-LU handle over a CSC matrix.
///
/// `factorize` computes (or reuses, see [`Solve::invalidate`]) a fill-reducing
/// LU decomposition; `solve` performs forward/back substitution and may be
/// called many times against the same factorization; `rhs` and `out` may
/// alias, matching the in-place reuse the iterative solver relies on.
#[allow(non_snake_case)]
pub trait Solve: Default {
    /// Factorizes `Y` (given in CSC triplet form: column pointers `Ap`,
    /// row indices `Ai`, values `Ax`) if no factorization is cached, or if
    /// [`Solve::invalidate`] was called since the last factorize. Reuses the
    /// cached symbolic/numeric factorization otherwise.
    fn factorize(&mut self, Ap: &[usize], Ai: &[usize], Ax: &[Complex64]) -> Result<()>;

    /// Solves `Y x = rhs` in place using the cached factorization,
    /// overwriting `rhs` with the solution. Returns
    /// [`PgmError::SingularMatrix`] if a pivot magnitude falls below the
    /// singularity tolerance.
    fn solve_inplace(&mut self, rhs: &mut [Complex64]) -> Result<()>;

    /// Drops the cached numeric factorization; the next [`Solve::factorize`]
    /// (or [`Solve::solve_inplace`] on a fresh instance) recomputes it.
    /// The symbolic pattern may be preserved by implementations that track
    /// it separately.
    fn invalidate(&mut self);

    /// True once a factorization is cached and [`Solve::solve_inplace`] can
    /// be called without `factorize` being called again first.
    fn is_factorized(&self) -> bool;

    /// Number of numeric factorizations performed so far. Repeated calls
    /// against an unchanged topology and admittance matrix should factorize
    /// exactly once, reusing the cached factorization for every solve.
    fn factorize_count(&self) -> usize;
}

pub(crate) fn singular(e: impl std::fmt::Display) -> PgmError {
    let _ = e;
    PgmError::SingularMatrix
}

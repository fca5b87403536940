//! Power-flow calculation: the iterative-current fixed point (C3) wrapped
//! by a thin driving loop (C4) that initializes voltages, iterates to
//! convergence and reports the result.

mod iterative_current;

pub use iterative_current::IterativeCurrentPfSolver;

use crate::complex::{PhaseValue, Symmetry};
use crate::error::{PgmError, Result};
use num_complex::Complex64;

/// Method requested through [`crate::model::CalculationOptions`]. `linear`
/// and `linear_current` share the iterative-current code path (the
/// load-injection linearization makes a single iteration exact);
/// `iterative_linear` and `newton_raphson` are recognized names that
/// [`IterativeCurrentPfSolver::calculate`] rejects with
/// [`PgmError::MissingCaseForEnumError`] rather than silently running the
/// wrong algorithm under a matching name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalculationMethod {
    Linear,
    LinearCurrent,
    IterativeCurrent,
    IterativeLinear,
    NewtonRaphson,
}

impl CalculationMethod {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "linear" => Ok(Self::Linear),
            "linear_current" => Ok(Self::LinearCurrent),
            "iterative_current" => Ok(Self::IterativeCurrent),
            "iterative_linear" => Ok(Self::IterativeLinear),
            "newton_raphson" => Ok(Self::NewtonRaphson),
            other => Err(PgmError::InvalidCalculationMethod(other.to_string())),
        }
    }

    /// True for method names this solver actually implements a code path
    /// for; `iterative_linear`/`newton_raphson` parse but are rejected by
    /// [`IterativeCurrentPfSolver::calculate`].
    pub(crate) fn is_implemented(&self) -> bool {
        !matches!(self, Self::IterativeLinear | Self::NewtonRaphson)
    }

    /// Loads are a fixed-point problem only for the iterative methods; the
    /// `linear*` variants request the same update rule capped to one pass.
    fn max_iter_override(&self) -> Option<usize> {
        match self {
            Self::Linear | Self::LinearCurrent => Some(1),
            _ => None,
        }
    }
}

/// A source feeding one bus: reference voltage and its own admittance to
/// the bus (not yet folded into the Y-bus supplied to the solver).
#[derive(Debug, Clone)]
pub struct Source<T: Symmetry> {
    pub bus: usize,
    pub u_ref: PhaseValue<T>,
    pub y_ref: Complex64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadGenType {
    ConstPq,
    ConstY,
    ConstI,
}

#[derive(Debug, Clone)]
pub struct Load<T: Symmetry> {
    pub bus: usize,
    pub s: PhaseValue<T>,
    pub gen_type: LoadGenType,
}

#[derive(Debug, Clone)]
pub struct PfInput<T: Symmetry> {
    pub sources: Vec<Source<T>>,
    pub loads: Vec<Load<T>>,
}

#[derive(Debug, Clone)]
pub struct PfOutput<T: Symmetry> {
    pub u: Vec<PhaseValue<T>>,
    pub iterations: usize,
}

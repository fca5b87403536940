//! `faer`-backed [`Solve`] implementation.
//!
//! Unlike the `rsparse` backend, `faer`'s sparse LU operates on complex
//! entries directly, so no real/imaginary block expansion is needed.

use faer::sparse::{
    linalg::solvers::{Lu, SymbolicLu},
    SparseColMatRef, SymbolicSparseColMatRef,
};
use faer::MatMut;
use faer::linalg::solvers::Solve as FaerSolveTrait;
use num_complex::Complex64;

use super::Solve;
use crate::error::{PgmError, Result};

#[derive(Default)]
pub struct FaerSolver {
    symbolic: Option<SymbolicLu<usize>>,
    lu: Option<Lu<usize, Complex64>>,
    factorize_count: usize,
}

#[allow(non_snake_case)]
impl Solve for FaerSolver {
    fn factorize(&mut self, Ap: &[usize], Ai: &[usize], Ax: &[Complex64]) -> Result<()> {
        let n = Ap.len() - 1;
        let pattern = unsafe { SymbolicSparseColMatRef::new_unchecked(n, n, Ap, None, Ai) };
        let mat = SparseColMatRef::new(pattern, Ax);

        if self.symbolic.is_none() {
            self.symbolic =
                Some(SymbolicLu::try_new(pattern).map_err(|_| PgmError::SingularMatrix)?);
        }
        let symbolic = self.symbolic.as_ref().unwrap().clone();
        self.lu = Some(
            Lu::try_new_with_symbolic(symbolic, mat).map_err(|_| PgmError::SingularMatrix)?,
        );
        self.factorize_count += 1;
        Ok(())
    }

    fn solve_inplace(&mut self, rhs: &mut [Complex64]) -> Result<()> {
        let n = rhs.len();
        let lu = self.lu.as_ref().ok_or(PgmError::SingularMatrix)?;
        let mat_ref = MatMut::from_column_major_slice_mut(rhs, n, 1);
        lu.solve_in_place(mat_ref);
        Ok(())
    }

    fn invalidate(&mut self) {
        self.lu = None;
    }

    fn is_factorized(&self) -> bool {
        self.lu.is_some()
    }

    fn factorize_count(&self) -> usize {
        self.factorize_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solves_simple_complex_system() {
        let Ap = [0usize, 1];
        let Ai = [0usize];
        let Ax = [Complex64::new(2.0, 0.0)];
        let mut solver = FaerSolver::default();
        solver.factorize(&Ap, &Ai, &Ax).unwrap();
        let mut rhs = [Complex64::new(4.0, 0.0)];
        solver.solve_inplace(&mut rhs).unwrap();
        assert!((rhs[0] - Complex64::new(2.0, 0.0)).norm() < 1e-9);
    }

    #[test]
    fn reuses_factorization_across_solves() {
        let Ap = [0usize, 1, 2];
        let Ai = [0usize, 1];
        let Ax = [Complex64::new(1.0, 0.0), Complex64::new(1.0, 0.0)];
        let mut solver = FaerSolver::default();
        solver.factorize(&Ap, &Ai, &Ax).unwrap();
        assert_eq!(solver.factorize_count(), 1);
        let mut rhs = [Complex64::new(1.0, 0.0), Complex64::new(2.0, 0.0)];
        solver.solve_inplace(&mut rhs).unwrap();
        let mut rhs2 = [Complex64::new(3.0, 0.0), Complex64::new(4.0, 0.0)];
        solver.solve_inplace(&mut rhs2).unwrap();
        assert_eq!(solver.factorize_count(), 1);
    }

    #[test]
    fn invalidate_refactorizes_numerics_only() {
        let Ap = [0usize, 1];
        let Ai = [0usize];
        let Ax = [Complex64::new(2.0, 0.0)];
        let mut solver = FaerSolver::default();
        solver.factorize(&Ap, &Ai, &Ax).unwrap();
        assert_eq!(solver.factorize_count(), 1);

        solver.invalidate();
        assert!(!solver.is_factorized());
        assert!(solver.symbolic.is_some(), "symbolic pattern must survive invalidate");

        let Ax2 = [Complex64::new(4.0, 0.0)];
        solver.factorize(&Ap, &Ai, &Ax2).unwrap();
        assert_eq!(solver.factorize_count(), 2);
        let mut rhs = [Complex64::new(8.0, 0.0)];
        solver.solve_inplace(&mut rhs).unwrap();
        assert!((rhs[0] - Complex64::new(2.0, 0.0)).norm() < 1e-9);
    }
}

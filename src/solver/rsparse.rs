//! `rsparse`-backed [`Solve`] implementation.
//!
//! `rsparse` only solves real systems, so the complex `n x n` problem is
//! expanded once into the real `2n x 2n` block system
//! `[[Re(Y), -Im(Y)], [Im(Y), Re(Y)]] [Re(x); Im(x)] = [Re(b); Im(b)]`
//! before handing it to `rsparse`'s `sqr`/`lu` symbolic-then-numeric split.

use num_complex::Complex64;
use rsparse::{
    data::{self, Numeric, Symb},
    lsolve, lu, sqr, usolve,
};

use super::Solve;
use crate::error::{PgmError, Result};

#[derive(Default)]
pub struct RSparseSolver {
    symbolic: Option<Symb>,
    numeric: Option<Numeric<f64>>,
    x: Option<Vec<f64>>,
    n: usize,
    factorize_count: usize,
}

#[allow(non_snake_case)]
fn to_real_block(n: usize, Ap: &[usize], Ai: &[usize], Ax: &[Complex64]) -> data::Sprs {
    // Build [[Re, -Im], [Im, Re]] in CSC over 2n columns by duplicating each
    // complex column into two real columns.
    let mut p = vec![0isize];
    let mut i = Vec::new();
    let mut x = Vec::new();

    for col in 0..n {
        let start = Ap[col];
        let end = Ap[col + 1];
        for k in start..end {
            i.push(Ai[k]);
            x.push(Ax[k].re);
        }
        for k in start..end {
            i.push(n + Ai[k]);
            x.push(Ax[k].im);
        }
        p.push(i.len() as isize);
    }
    for col in 0..n {
        let start = Ap[col];
        let end = Ap[col + 1];
        for k in start..end {
            i.push(Ai[k]);
            x.push(-Ax[k].im);
        }
        for k in start..end {
            i.push(n + Ai[k]);
            x.push(Ax[k].re);
        }
        p.push(i.len() as isize);
    }

    data::Sprs {
        m: 2 * n,
        n: 2 * n,
        p,
        i,
        x: x.clone(),
        nzmax: x.len(),
    }
}

impl Solve for RSparseSolver {
    #[allow(non_snake_case)]
    fn factorize(&mut self, Ap: &[usize], Ai: &[usize], Ax: &[Complex64]) -> Result<()> {
        let n = Ap.len() - 1;
        self.n = n;
        let a = to_real_block(n, Ap, Ai, Ax);
        if self.symbolic.is_none() {
            self.symbolic = Some(sqr(&a, 1, false));
            self.x = Some(vec![0.0; 2 * n]);
        }
        let s = self.symbolic.as_mut().unwrap();
        self.numeric = Some(lu(&a, s, 1e-20).map_err(|_| PgmError::SingularMatrix)?);
        self.factorize_count += 1;
        Ok(())
    }

    fn solve_inplace(&mut self, rhs: &mut [Complex64]) -> Result<()> {
        let n = self.n;
        let s = self.symbolic.as_ref().ok_or(PgmError::SingularMatrix)?;
        let numeric = self.numeric.as_ref().ok_or(PgmError::SingularMatrix)?;

        let mut b = vec![0.0; 2 * n];
        for k in 0..n {
            b[k] = rhs[k].re;
            b[n + k] = rhs[k].im;
        }

        let x = self.x.as_mut().unwrap();
        ipvec(&numeric.pinv, &b, x);
        lsolve(&numeric.l, x);
        usolve(&numeric.u, x);
        let mut out = vec![0.0; 2 * n];
        ipvec(&s.q, x, &mut out);

        for k in 0..n {
            rhs[k] = Complex64::new(out[k], out[n + k]);
        }
        Ok(())
    }

    fn invalidate(&mut self) {
        self.numeric = None;
    }

    fn is_factorized(&self) -> bool {
        self.numeric.is_some()
    }

    fn factorize_count(&self) -> usize {
        self.factorize_count
    }
}

fn ipvec(p: &Option<Vec<isize>>, b: &[f64], x: &mut [f64]) {
    match p {
        Some(pvec) => {
            for k in 0..b.len() {
                x[pvec[k] as usize] = b[k];
            }
        }
        None => x.copy_from_slice(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solves_simple_complex_system() {
        // (2+0i)x = (4+0i) -> x = 2
        let Ap = [0usize, 1];
        let Ai = [0usize];
        let Ax = [Complex64::new(2.0, 0.0)];
        let mut solver = RSparseSolver::default();
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
        let mut solver = RSparseSolver::default();
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
        let mut solver = RSparseSolver::default();
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

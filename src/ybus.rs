//! Y-bus assembler (C2): builds the sparse nodal admittance matrix from
//! branch and shunt admittances.
//!
//! Source admittances are deliberately not included here — the PF solver
//! adds them to the diagonal after this matrix is built, so the same Y-bus
//! can be shared with routines that don't model sources.

use nalgebra_sparse::{CooMatrix, CscMatrix};
use num_complex::Complex64;
use std::marker::PhantomData;

use crate::complex::Symmetry;

/// A pi-model series branch between two buses, with its own shunt halves.
#[derive(Debug, Clone, Copy)]
pub struct BranchAdmittance {
    pub from: usize,
    pub to: usize,
    pub y_series: Complex64,
    pub y_shunt_from: Complex64,
    pub y_shunt_to: Complex64,
}

/// A shunt admittance attached directly to one bus (e.g. a capacitor bank).
#[derive(Debug, Clone, Copy)]
pub struct ShuntAdmittance {
    pub bus: usize,
    pub y: Complex64,
}

/// Block-sparse nodal admittance matrix, phases decoupled: each phase gets
/// its own copy of the scalar admittance pattern with no cross-phase
/// mutual terms, so the block described in the data model degenerates to a
/// diagonal 1x1 or 3x3 matrix per node.
#[derive(Debug, Clone)]
pub struct YBus<T: Symmetry> {
    pub n_bus: usize,
    pub matrix: CscMatrix<Complex64>,
    _tag: PhantomData<T>,
}

impl<T: Symmetry> YBus<T> {
    fn index(bus: usize, phase: usize) -> usize {
        bus * T::PHASES + phase
    }

    pub fn build(n_bus: usize, branches: &[BranchAdmittance], shunts: &[ShuntAdmittance]) -> Self {
        let dim = n_bus * T::PHASES;
        let mut coo = CooMatrix::new(dim, dim);

        // Every diagonal entry is structurally non-zero regardless of whether
        // a branch or shunt actually touches that bus, so a bus carrying only
        // a source and/or loads still has somewhere for `add_to_diagonal` to
        // graft admittance onto later.
        for i in 0..dim {
            coo.push(i, i, Complex64::new(0.0, 0.0));
        }

        for branch in branches {
            for phase in 0..T::PHASES {
                let i = Self::index(branch.from, phase);
                let j = Self::index(branch.to, phase);
                coo.push(i, i, branch.y_series + branch.y_shunt_from);
                coo.push(j, j, branch.y_series + branch.y_shunt_to);
                coo.push(i, j, -branch.y_series);
                coo.push(j, i, -branch.y_series);
            }
        }
        for shunt in shunts {
            for phase in 0..T::PHASES {
                let i = Self::index(shunt.bus, phase);
                coo.push(i, i, shunt.y);
            }
        }

        Self {
            n_bus,
            matrix: CscMatrix::from(&coo),
            _tag: PhantomData,
        }
    }

    /// Adds `y` to the diagonal entry for `(bus, phase)`, coalescing with any
    /// existing structural non-zero. Used by the PF solver to graft source
    /// admittance onto a shared Y-bus without touching the sparsity pattern.
    pub fn add_to_diagonal(&mut self, bus: usize, phase: usize, y: Complex64) {
        let i = Self::index(bus, phase);
        if let Some(v) = self.matrix.get_entry_mut(i, i) {
            use nalgebra_sparse::SparseEntryMut;
            match v {
                SparseEntryMut::NonZero(slot) => *slot += y,
                SparseEntryMut::Zero => panic!("diagonal entry must be structurally non-zero"),
            }
        } else {
            panic!("diagonal entry must be structurally non-zero");
        }
    }

    /// Adds `delta` to a branch's series contribution: both diagonal entries
    /// gain `delta`, both off-diagonal entries lose it, keeping the matrix
    /// symmetric. Used by the tap-position optimizer to reflect a transformer
    /// admittance change without rebuilding the whole Y-bus.
    pub fn apply_branch_delta(&mut self, from: usize, to: usize, phase: usize, delta: Complex64) {
        self.add_to_diagonal(from, phase, delta);
        self.add_to_diagonal(to, phase, delta);
        self.add_to_off_diagonal(from, to, phase, -delta);
        self.add_to_off_diagonal(to, from, phase, -delta);
    }

    fn add_to_off_diagonal(&mut self, row_bus: usize, col_bus: usize, phase: usize, y: Complex64) {
        let i = Self::index(row_bus, phase);
        let j = Self::index(col_bus, phase);
        use nalgebra_sparse::SparseEntryMut;
        match self.matrix.get_entry_mut(i, j) {
            Some(SparseEntryMut::NonZero(slot)) => *slot += y,
            _ => panic!("off-diagonal entry must be structurally non-zero"),
        }
    }

    pub fn dim(&self) -> usize {
        self.n_bus * T::PHASES
    }

    /// CSC triplet view `(Ap, Ai, Ax)` for the [`crate::solver::Solve`] kernel.
    pub fn csc_triplets(&self) -> (&[usize], &[usize], &[Complex64]) {
        (
            self.matrix.col_offsets(),
            self.matrix.row_indices(),
            self.matrix.values(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complex::Sym;

    #[test]
    fn ybus_is_symmetric_for_a_simple_line() {
        let branches = [BranchAdmittance {
            from: 0,
            to: 1,
            y_series: Complex64::new(10.0, -20.0),
            y_shunt_from: Complex64::new(0.0, 0.001),
            y_shunt_to: Complex64::new(0.0, 0.001),
        }];
        let ybus = YBus::<Sym>::build(2, &branches, &[]);
        let dense = nalgebra_sparse::convert::serial::convert_csc_dense(&ybus.matrix);
        assert_eq!(dense[(0, 1)], dense[(1, 0)]);
        assert_eq!(dense[(0, 0)], dense[(1, 1)]);
    }

    #[test]
    fn isolated_bus_has_a_structural_diagonal_entry() {
        let mut ybus = YBus::<Sym>::build(1, &[], &[]);
        // Must not panic: a bus touched by neither branch nor shunt (e.g. one
        // carrying only a source) still has a structural diagonal slot.
        ybus.add_to_diagonal(0, 0, Complex64::new(1e6, 0.0));
        let dense = nalgebra_sparse::convert::serial::convert_csc_dense(&ybus.matrix);
        assert_eq!(dense[(0, 0)], Complex64::new(1e6, 0.0));
    }

    #[test]
    fn shunt_only_affects_its_own_bus_diagonal() {
        let shunts = [ShuntAdmittance {
            bus: 1,
            y: Complex64::new(0.0, 5.0),
        }];
        let ybus = YBus::<Sym>::build(2, &[], &shunts);
        let dense = nalgebra_sparse::convert::serial::convert_csc_dense(&ybus.matrix);
        assert_eq!(dense[(0, 0)], Complex64::new(0.0, 0.0));
        assert_eq!(dense[(1, 1)], Complex64::new(0.0, 5.0));
    }
}

use std::rc::Rc;

use num_complex::Complex64;

use super::{CalculationMethod, LoadGenType, PfInput, PfOutput};
use crate::complex::{PhaseValue, Symmetry};
use crate::error::{PgmError, Result};
use crate::solver::Solve;
use crate::topology::MathModelTopology;
use crate::ybus::YBus;

/// Jacobi-style fixed point over `Y U = I_inj`, reusing one prefactorization
/// across iterations and across calls while the Y-bus pattern is unchanged.
pub struct IterativeCurrentPfSolver<T: Symmetry, S: Solve> {
    topology: Rc<MathModelTopology>,
    ybus: YBus<T>,
    solver: S,
    factorized: bool,
}

impl<T: Symmetry, S: Solve> IterativeCurrentPfSolver<T, S> {
    pub fn new(topology: Rc<MathModelTopology>, ybus: YBus<T>) -> Self {
        Self {
            topology,
            ybus,
            solver: S::default(),
            factorized: false,
        }
    }

    /// Drops the cached factorization. Call after a parameter update that
    /// changes Y; the next `calculate` re-grafts source admittance and
    /// refactorizes.
    pub fn invalidate(&mut self) {
        self.factorized = false;
        self.solver.invalidate();
    }

    pub fn factorize_count(&self) -> usize {
        self.solver.factorize_count()
    }

    /// Applies a branch admittance delta (e.g. from a tap-position change)
    /// to the underlying Y-bus and invalidates the cached factorization.
    pub fn apply_branch_delta(&mut self, from: usize, to: usize, phase: usize, delta: Complex64) {
        self.ybus.apply_branch_delta(from, to, phase, delta);
        self.invalidate();
    }

    fn ensure_initialized(&mut self, input: &PfInput<T>) -> Result<()> {
        if self.factorized {
            return Ok(());
        }
        for source in &input.sources {
            for phase in 0..T::PHASES {
                self.ybus.add_to_diagonal(source.bus, phase, source.y_ref);
            }
        }
        let (ap, ai, ax) = self.ybus.csc_triplets();
        self.solver.factorize(ap, ai, ax)?;
        self.factorized = true;
        Ok(())
    }

    fn initial_voltage(&self, input: &PfInput<T>) -> Vec<PhaseValue<T>> {
        let n = self.topology.n_bus;
        let mut acc = vec![PhaseValue::<T>::default(); n];
        let mut count = vec![0u32; n];
        for source in &input.sources {
            acc[source.bus] = acc[source.bus] + source.u_ref;
            count[source.bus] += 1;
        }
        (0..n)
            .map(|bus| {
                if count[bus] > 0 {
                    acc[bus] * Complex64::new(1.0 / f64::from(count[bus]), 0.0)
                } else {
                    PhaseValue::<T>::splat(Complex64::new(1.0, 0.0))
                }
            })
            .collect()
    }

    pub fn calculate(
        &mut self,
        input: &PfInput<T>,
        method: CalculationMethod,
        tolerance: f64,
        max_iter: usize,
    ) -> Result<PfOutput<T>> {
        if !method.is_implemented() {
            return Err(PgmError::MissingCaseForEnumError {
                context: "calculation_method".to_string(),
                value: format!("{method:?}"),
            });
        }
        self.ensure_initialized(input)?;
        let max_iter = method.max_iter_override().unwrap_or(max_iter).max(1);

        let n = self.topology.n_bus;
        let mut u = self.initial_voltage(input);
        let mut rhs = vec![Complex64::new(0.0, 0.0); n * T::PHASES];

        for iteration in 1..=max_iter {
            for v in rhs.iter_mut() {
                *v = Complex64::new(0.0, 0.0);
            }
            for source in &input.sources {
                for phase in 0..T::PHASES {
                    rhs[source.bus * T::PHASES + phase] +=
                        source.y_ref * source.u_ref.as_slice()[phase];
                }
            }
            for load in &input.loads {
                let uv = u[load.bus];
                for phase in 0..T::PHASES {
                    let s = load.s.as_slice()[phase];
                    let up = uv.as_slice()[phase];
                    let contribution = match load.gen_type {
                        LoadGenType::ConstPq => (s / up).conj(),
                        LoadGenType::ConstY => s.conj() * up,
                        LoadGenType::ConstI => (s * up.norm() / up).conj(),
                    };
                    rhs[load.bus * T::PHASES + phase] += contribution;
                }
            }

            self.solver.solve_inplace(&mut rhs)?;

            let mut max_dev = 0.0f64;
            for bus in 0..n {
                let mut phases = [Complex64::new(0.0, 0.0); 3];
                phases[..T::PHASES].copy_from_slice(&rhs[bus * T::PHASES..bus * T::PHASES + T::PHASES]);
                let new_u = PhaseValue::<T>::from_phases(phases);
                let dev = (new_u - u[bus]).max_val();
                if dev > max_dev {
                    max_dev = dev;
                }
                u[bus] = new_u;
            }

            if max_dev <= tolerance {
                return Ok(PfOutput {
                    u,
                    iterations: iteration,
                });
            }
            if iteration == max_iter {
                return Err(PgmError::IterationDiverge {
                    last_deviation: max_dev,
                    iterations: iteration,
                });
            }
        }
        Err(PgmError::Unreachable(
            "iterative current loop exited without converging or diverging".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complex::Sym;
    use crate::pf::Source;
    use crate::solver::DefaultSolver;
    use crate::ybus::{BranchAdmittance, YBus};

    fn two_bus_topology() -> Rc<MathModelTopology> {
        Rc::new(MathModelTopology::new(2, vec![(0, 1)]))
    }

    #[test]
    fn zero_injection_converges_in_one_iteration_at_reference_voltage() {
        let topology = two_bus_topology();
        let branches = [BranchAdmittance {
            from: 0,
            to: 1,
            y_series: Complex64::new(10.0, -20.0),
            y_shunt_from: Complex64::new(0.0, 0.0),
            y_shunt_to: Complex64::new(0.0, 0.0),
        }];
        let ybus = YBus::<Sym>::build(2, &branches, &[]);
        let mut solver = IterativeCurrentPfSolver::<Sym, DefaultSolver>::new(topology, ybus);

        let input = PfInput::<Sym> {
            sources: vec![Source {
                bus: 0,
                u_ref: PhaseValue::splat(Complex64::new(1.0, 0.0)),
                y_ref: Complex64::new(1e6, 0.0),
            }],
            loads: vec![],
        };

        let out = solver
            .calculate(&input, CalculationMethod::IterativeCurrent, 1e-8, 20)
            .unwrap();
        assert_eq!(out.iterations, 1);
        for bus_u in &out.u {
            let dev = (*bus_u - PhaseValue::<Sym>::splat(Complex64::new(1.0, 0.0))).max_val();
            assert!(dev < 1e-6, "deviation too large: {dev}");
        }
    }

    #[test]
    fn repeated_calculate_factorizes_once() {
        let topology = two_bus_topology();
        let branches = [BranchAdmittance {
            from: 0,
            to: 1,
            y_series: Complex64::new(10.0, -20.0),
            y_shunt_from: Complex64::new(0.0, 0.0),
            y_shunt_to: Complex64::new(0.0, 0.0),
        }];
        let ybus = YBus::<Sym>::build(2, &branches, &[]);
        let mut solver = IterativeCurrentPfSolver::<Sym, DefaultSolver>::new(topology, ybus);
        let input = PfInput::<Sym> {
            sources: vec![Source {
                bus: 0,
                u_ref: PhaseValue::splat(Complex64::new(1.0, 0.0)),
                y_ref: Complex64::new(1e6, 0.0),
            }],
            loads: vec![],
        };

        solver
            .calculate(&input, CalculationMethod::IterativeCurrent, 1e-8, 20)
            .unwrap();
        solver
            .calculate(&input, CalculationMethod::IterativeCurrent, 1e-8, 20)
            .unwrap();
        assert_eq!(solver.factorize_count(), 1);
    }

    #[test]
    fn newton_raphson_and_iterative_linear_are_rejected() {
        let topology = two_bus_topology();
        let branches = [BranchAdmittance {
            from: 0,
            to: 1,
            y_series: Complex64::new(10.0, -20.0),
            y_shunt_from: Complex64::new(0.0, 0.0),
            y_shunt_to: Complex64::new(0.0, 0.0),
        }];
        let ybus = YBus::<Sym>::build(2, &branches, &[]);
        let mut solver = IterativeCurrentPfSolver::<Sym, DefaultSolver>::new(topology, ybus);
        let input = PfInput::<Sym> {
            sources: vec![Source {
                bus: 0,
                u_ref: PhaseValue::splat(Complex64::new(1.0, 0.0)),
                y_ref: Complex64::new(1e6, 0.0),
            }],
            loads: vec![],
        };

        for method in [CalculationMethod::NewtonRaphson, CalculationMethod::IterativeLinear] {
            assert!(matches!(
                solver.calculate(&input, method, 1e-8, 20),
                Err(PgmError::MissingCaseForEnumError { .. })
            ));
        }
    }
}

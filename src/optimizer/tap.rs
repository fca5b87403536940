use num_complex::Complex64;

use super::graph::TransformerGraph;
use crate::complex::Symmetry;
use crate::error::{PgmError, Result};
use crate::pf::{CalculationMethod, IterativeCurrentPfSolver, PfInput, PfOutput};
use crate::solver::Solve;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapChangingStrategy {
    Any,
    GlobalMinimum,
    GlobalMaximum,
    LocalMinimum,
    LocalMaximum,
}

impl TapChangingStrategy {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "any" => Ok(Self::Any),
            "global_minimum" => Ok(Self::GlobalMinimum),
            "global_maximum" => Ok(Self::GlobalMaximum),
            "local_minimum" => Ok(Self::LocalMinimum),
            "local_maximum" => Ok(Self::LocalMaximum),
            other => Err(PgmError::MissingCaseForEnumError {
                context: "tap_changing_strategy".to_string(),
                value: other.to_string(),
            }),
        }
    }

    fn is_minimum(&self) -> bool {
        matches!(self, Self::GlobalMinimum | Self::LocalMinimum)
    }

    fn is_maximum(&self) -> bool {
        matches!(self, Self::GlobalMaximum | Self::LocalMaximum)
    }
}

/// A two-winding regulated transformer. `y_per_tap` is the series admittance
/// change per tap step, applied to the Y-bus branch `(source_side_bus,
/// tap_side_bus)` whenever `tap_pos` moves.
#[derive(Debug, Clone, Copy)]
pub struct Transformer {
    pub source_side_bus: usize,
    pub tap_side_bus: usize,
    pub tap_pos: i32,
    pub tap_min: i32,
    pub tap_max: i32,
    /// +1 if increasing `tap_pos` decreases the controlled-side voltage,
    /// -1 otherwise. A static property of the physical winding.
    pub tap_direction: i32,
    pub y_per_tap: Complex64,
    pub source_side_connected: bool,
    pub tap_side_connected: bool,
}

/// Pairs a regulator descriptor with the transformer it controls.
#[derive(Debug, Clone, Copy)]
pub struct TapRegulator {
    pub transformer_index: usize,
    pub control_side_bus: usize,
    pub u_set: f64,
    pub u_band: f64,
    pub z_comp: Complex64,
}

pub struct TapPositionOptimizer<T: Symmetry, S: Solve> {
    pf_solver: IterativeCurrentPfSolver<T, S>,
    regulators: Vec<TapRegulator>,
    transformers: Vec<Transformer>,
    order: Vec<Vec<usize>>,
}

impl<T: Symmetry, S: Solve> TapPositionOptimizer<T, S> {
    pub fn new(
        pf_solver: IterativeCurrentPfSolver<T, S>,
        regulators: Vec<TapRegulator>,
        transformers: Vec<Transformer>,
        n_vertices: usize,
        source_vertices: &[usize],
    ) -> Self {
        let mut graph = TransformerGraph::new(n_vertices);
        for &v in source_vertices {
            graph.mark_source(v);
        }
        for (idx, t) in transformers.iter().enumerate() {
            graph.add_transformer(idx, t.source_side_bus, t.tap_side_bus);
        }
        let order = graph.rank();

        Self {
            pf_solver,
            regulators,
            transformers,
            order,
        }
    }

    fn iteration_cap(&self) -> usize {
        self.regulators
            .iter()
            .map(|r| {
                let t = &self.transformers[r.transformer_index];
                (t.tap_max - t.tap_min + 1).max(1) as usize
            })
            .sum::<usize>()
            .max(1)
    }

    fn snapshot(&self) -> Vec<i32> {
        self.transformers.iter().map(|t| t.tap_pos).collect()
    }

    fn restore(&mut self, snapshot: &[i32]) {
        for (t, &pos) in self.transformers.iter_mut().zip(snapshot) {
            t.tap_pos = pos;
        }
    }

    /// Resolves connectivity for whichever side a regulator actually
    /// measures: `control_side_bus` need not be the source side, so this
    /// can't just read `source_side_connected` unconditionally.
    fn control_side_connected(&self, transformer: &Transformer, regulator: &TapRegulator) -> bool {
        if regulator.control_side_bus == transformer.source_side_bus {
            transformer.source_side_connected
        } else if regulator.control_side_bus == transformer.tap_side_bus {
            transformer.tap_side_connected
        } else {
            true
        }
    }

    fn regulator_indices_in_order(&self) -> Vec<Vec<usize>> {
        self.order
            .iter()
            .map(|group| {
                group
                    .iter()
                    .filter_map(|&tf_idx| {
                        self.regulators
                            .iter()
                            .position(|r| r.transformer_index == tf_idx)
                    })
                    .collect()
            })
            .collect()
    }

    fn seed_strategy(&mut self, strategy: TapChangingStrategy) -> Result<()> {
        if strategy == TapChangingStrategy::Any {
            return Ok(());
        }
        for group in &self.order.clone() {
            for &tf_idx in group {
                let target = if strategy.is_minimum() {
                    self.transformers[tf_idx].tap_min
                } else {
                    self.transformers[tf_idx].tap_max
                };
                self.set_tap(tf_idx, target)?;
            }
        }
        Ok(())
    }

    fn step_all(&mut self, strategy: TapChangingStrategy) -> Result<()> {
        for group in &self.order.clone() {
            for &tf_idx in group {
                let t = &self.transformers[tf_idx];
                let next = if strategy.is_minimum() {
                    (t.tap_pos + 1).min(t.tap_max)
                } else {
                    (t.tap_pos - 1).max(t.tap_min)
                };
                self.set_tap(tf_idx, next)?;
            }
        }
        Ok(())
    }

    fn set_tap(&mut self, tf_idx: usize, new_pos: i32) -> Result<()> {
        let t = &mut self.transformers[tf_idx];
        let clamped = new_pos.clamp(t.tap_min, t.tap_max);
        if clamped == t.tap_pos {
            return Ok(());
        }
        let delta = t.y_per_tap * Complex64::new(f64::from(clamped - t.tap_pos), 0.0);
        let (from, to) = (t.source_side_bus, t.tap_side_bus);
        t.tap_pos = clamped;
        for phase in 0..T::PHASES {
            self.pf_solver.apply_branch_delta(from, to, phase, delta);
        }
        Ok(())
    }

    fn control_transformer(&self, regulator_idx: usize, result: &PfOutput<T>) -> Option<i32> {
        let regulator = &self.regulators[regulator_idx];
        let transformer = &self.transformers[regulator.transformer_index];

        let u_control = result.u[regulator.control_side_bus];
        let u_tap = result.u[transformer.tap_side_bus];
        let i_branch = (u_tap - u_control) * transformer.y_per_tap;
        let u_measured = u_control + i_branch * regulator.z_comp;
        let v = u_measured.max_val();

        if v > regulator.u_set + 0.5 * regulator.u_band {
            let step = transformer.tap_direction;
            let bound = if step > 0 {
                transformer.tap_max
            } else {
                transformer.tap_min
            };
            if transformer.tap_pos == bound {
                return None;
            }
            return Some(transformer.tap_pos + step);
        }
        if v < regulator.u_set - 0.5 * regulator.u_band {
            let step = -transformer.tap_direction;
            let bound = if step > 0 {
                transformer.tap_max
            } else {
                transformer.tap_min
            };
            if transformer.tap_pos == bound {
                return None;
            }
            return Some(transformer.tap_pos + step);
        }
        None
    }

    fn calculate_with_fallback(
        &mut self,
        input: &PfInput<T>,
        method: CalculationMethod,
        tolerance: f64,
        max_iter: usize,
    ) -> Result<PfOutput<T>> {
        match self.pf_solver.calculate(input, method, tolerance, max_iter) {
            Ok(out) => Ok(out),
            Err(PgmError::SingularMatrix) | Err(PgmError::IterationDiverge { .. }) => {
                self.pf_solver
                    .calculate(input, CalculationMethod::Linear, tolerance, max_iter)
            }
            Err(e) => Err(e),
        }
    }

    fn try_calculation_with_regulation(
        &mut self,
        input: &PfInput<T>,
        method: CalculationMethod,
        tolerance: f64,
        max_iter: usize,
    ) -> Result<PfOutput<T>> {
        let mut result = self.calculate_with_fallback(input, method, tolerance, max_iter)?;
        let groups = self.regulator_indices_in_order();
        let cap = self.iteration_cap();

        for _round in 0..cap {
            let mut tap_changed = false;
            'groups: for group in &groups {
                let mut proposals: Vec<(usize, i32)> = Vec::new();
                for &reg_idx in group {
                    let regulator = self.regulators[reg_idx];
                    let transformer = self.transformers[regulator.transformer_index];
                    if !transformer.tap_side_connected
                        || !self.control_side_connected(&transformer, &regulator)
                    {
                        continue;
                    }
                    if let Some(new_pos) = self.control_transformer(reg_idx, &result) {
                        proposals.push((regulator.transformer_index, new_pos));
                    }
                }
                if !proposals.is_empty() {
                    for (tf_idx, new_pos) in proposals {
                        self.set_tap(tf_idx, new_pos)?;
                    }
                    tap_changed = true;
                    break 'groups;
                }
            }

            if !tap_changed {
                return Ok(result);
            }
            result = self.calculate_with_fallback(input, method, tolerance, max_iter)?;
        }

        log::warn!(
            "tap-position optimizer did not settle within {} rounds; returning last result",
            cap
        );
        Ok(result)
    }

    pub fn optimize(
        &mut self,
        strategy: TapChangingStrategy,
        method: CalculationMethod,
        input: &PfInput<T>,
        tolerance: f64,
        max_iter: usize,
    ) -> Result<PfOutput<T>> {
        let snapshot = self.snapshot();

        self.seed_strategy(strategy)?;
        let mut result = self.try_calculation_with_regulation(input, method, tolerance, max_iter)?;

        if strategy != TapChangingStrategy::Any {
            self.step_all(strategy)?;
            result = self.try_calculation_with_regulation(input, method, tolerance, max_iter)?;
        }

        self.restore(&snapshot);
        Ok(result)
    }

    pub fn tap_positions(&self) -> Vec<i32> {
        self.transformers.iter().map(|t| t.tap_pos).collect()
    }
}

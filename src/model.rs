//! Public calculation facade: assembles one scenario's network and input
//! state from a decoded dataset, owns the solver across repeated
//! `calculate` calls, and accepts independent updates between them without
//! disturbing the cached factorization.

use std::collections::HashMap;
use std::rc::Rc;

use num_complex::Complex64;

use crate::complex::{PhaseValue, Symmetry};
use crate::dataset::{AttributeValue, DecodedDataset};
use crate::error::{PgmError, Result};
use crate::optimizer::{TapChangingStrategy, TapPositionOptimizer, TapRegulator, Transformer};
use crate::pf::{CalculationMethod, IterativeCurrentPfSolver, Load, LoadGenType, PfInput, PfOutput, Source};
use crate::solver::{DefaultSolver, Solve};
use crate::topology::MathModelTopology;
use crate::ybus::{BranchAdmittance, YBus};

/// Which of the three named analyses [`Model::calculate`] should run. Only
/// power flow is implemented; the others are accepted so a caller can
/// configure one and get back a precise not-implemented error rather than
/// an enum parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisType {
    PowerFlow,
    StateEstimation,
    ShortCircuit,
}

#[derive(Debug, Clone)]
pub struct CalculationOptions {
    pub analysis_type: AnalysisType,
    pub calculation_method: String,
    pub tap_changing_strategy: String,
    pub error_tolerance: f64,
    pub max_iter: usize,
    /// Accepted for parity with the batch driver's scenario-parallelism
    /// knob; a single `calculate` call always runs one scenario on the
    /// caller's thread, so this has no effect here.
    pub threading: i32,
}

impl Default for CalculationOptions {
    fn default() -> Self {
        Self {
            analysis_type: AnalysisType::PowerFlow,
            calculation_method: "iterative_current".to_string(),
            tap_changing_strategy: "any".to_string(),
            error_tolerance: 1e-8,
            max_iter: 20,
            threading: 0,
        }
    }
}

fn attr_id(row: &[AttributeValue], idx: usize) -> Option<i32> {
    match row.get(idx) {
        Some(AttributeValue::Id(v)) => *v,
        _ => None,
    }
}

fn attr_f64(row: &[AttributeValue], idx: usize) -> Option<f64> {
    match row.get(idx) {
        Some(AttributeValue::Float64(v)) => *v,
        _ => None,
    }
}

fn attr_i8(row: &[AttributeValue], idx: usize) -> Option<i8> {
    match row.get(idx) {
        Some(AttributeValue::Int8(v)) => *v,
        _ => None,
    }
}

fn gen_type_from_code(code: i8) -> Result<LoadGenType> {
    match code {
        0 => Ok(LoadGenType::ConstPq),
        1 => Ok(LoadGenType::ConstY),
        2 => Ok(LoadGenType::ConstI),
        other => Err(PgmError::MissingCaseForEnumError {
            context: "sym_load.type".to_string(),
            value: other.to_string(),
        }),
    }
}

fn missing(path: &str, message: &str) -> PgmError {
    PgmError::Serialization {
        message: message.to_string(),
        path: path.to_string(),
    }
}

/// The assembled network plus input state for one scenario: topology,
/// admittances, source/load records and any regulated transformers, with a
/// tap-position optimizer that keeps the underlying solver's factorization
/// across repeated `calculate` calls.
pub struct Model<T: Symmetry, S: Solve = DefaultSolver> {
    system_frequency: f64,
    topology: Rc<MathModelTopology>,
    optimizer: TapPositionOptimizer<T, S>,
    input: PfInput<T>,
    load_ids: HashMap<i32, usize>,
    load_pq: Vec<(f64, f64)>,
    source_ids: HashMap<i32, usize>,
}

impl<T: Symmetry, S: Solve> Model<T, S> {
    /// Builds a model from a decoded `input` dataset. Expects `node`
    /// (required), and `line`, `source`, `sym_load`, `transformer`,
    /// `transformer_tap_regulator` (each optional, empty if absent).
    pub fn new(system_frequency: f64, input: &DecodedDataset) -> Result<Self> {
        let node_rows = input
            .data
            .component("node")
            .ok_or_else(|| missing("model/node", "input dataset has no node component"))?
            .rows();

        let mut id_to_bus = HashMap::with_capacity(node_rows.len());
        for (bus, row) in node_rows.iter().enumerate() {
            let id = attr_id(row, 0).ok_or_else(|| missing("model/node/id", "node missing id"))?;
            id_to_bus.insert(id, bus);
        }
        let n_bus = node_rows.len();

        let bus_of = |id: i32, path: &str| -> Result<usize> {
            id_to_bus
                .get(&id)
                .copied()
                .ok_or_else(|| missing(path, &format!("unknown node id {id}")))
        };

        let mut branches = Vec::new();
        if let Some(buffer) = input.data.component("line") {
            for row in buffer.rows() {
                let from_id = attr_id(row, 1).ok_or_else(|| missing("model/line/from_node", "line missing from_node"))?;
                let to_id = attr_id(row, 2).ok_or_else(|| missing("model/line/to_node", "line missing to_node"))?;
                let r1 = attr_f64(row, 3).ok_or_else(|| missing("model/line/r1", "line missing r1"))?;
                let x1 = attr_f64(row, 4).ok_or_else(|| missing("model/line/x1", "line missing x1"))?;
                let y_series = Complex64::new(1.0, 0.0) / Complex64::new(r1, x1);
                branches.push(BranchAdmittance {
                    from: bus_of(from_id, "model/line/from_node")?,
                    to: bus_of(to_id, "model/line/to_node")?,
                    y_series,
                    y_shunt_from: Complex64::new(0.0, 0.0),
                    y_shunt_to: Complex64::new(0.0, 0.0),
                });
            }
        }

        let topology = MathModelTopology::new(n_bus, branches.iter().map(|b| (b.from, b.to)).collect());

        let mut sources = Vec::new();
        let mut source_ids = HashMap::new();
        if let Some(buffer) = input.data.component("source") {
            for row in buffer.rows() {
                let id = attr_id(row, 0).ok_or_else(|| missing("model/source/id", "source missing id"))?;
                let node_id = attr_id(row, 1).ok_or_else(|| missing("model/source/node", "source missing node"))?;
                let u_ref = attr_f64(row, 2).ok_or_else(|| missing("model/source/u_ref", "source missing u_ref"))?;
                let y_ref = attr_f64(row, 3).ok_or_else(|| missing("model/source/y_ref", "source missing y_ref"))?;
                source_ids.insert(id, sources.len());
                sources.push(Source {
                    bus: bus_of(node_id, "model/source/node")?,
                    u_ref: PhaseValue::splat(Complex64::new(u_ref, 0.0)),
                    y_ref: Complex64::new(y_ref, 0.0),
                });
            }
        }
        let source_vertices: Vec<usize> = {
            let mut v: Vec<usize> = sources.iter().map(|s| s.bus).collect();
            v.sort_unstable();
            v.dedup();
            v
        };

        let mut loads = Vec::new();
        let mut load_ids = HashMap::new();
        let mut load_pq = Vec::new();
        if let Some(buffer) = input.data.component("sym_load") {
            for row in buffer.rows() {
                let id = attr_id(row, 0).ok_or_else(|| missing("model/sym_load/id", "sym_load missing id"))?;
                let node_id = attr_id(row, 1).ok_or_else(|| missing("model/sym_load/node", "sym_load missing node"))?;
                let p = attr_f64(row, 2).ok_or_else(|| missing("model/sym_load/p_specified", "sym_load missing p_specified"))?;
                let q = attr_f64(row, 3).ok_or_else(|| missing("model/sym_load/q_specified", "sym_load missing q_specified"))?;
                let gen_type = gen_type_from_code(
                    attr_i8(row, 4).ok_or_else(|| missing("model/sym_load/type", "sym_load missing type"))?,
                )?;
                let bus = bus_of(node_id, "model/sym_load/node")?;
                load_ids.insert(id, loads.len());
                load_pq.push((p, q));
                loads.push(Load {
                    bus,
                    s: PhaseValue::splat(Complex64::new(p, q)),
                    gen_type,
                });
            }
        }

        let mut transformers = Vec::new();
        let mut transformer_ids: HashMap<i32, usize> = HashMap::new();
        if let Some(buffer) = input.data.component("transformer") {
            for row in buffer.rows() {
                let id = attr_id(row, 0).ok_or_else(|| missing("model/transformer/id", "transformer missing id"))?;
                let from_id = attr_id(row, 1).ok_or_else(|| missing("model/transformer/from_node", "transformer missing from_node"))?;
                let to_id = attr_id(row, 2).ok_or_else(|| missing("model/transformer/to_node", "transformer missing to_node"))?;
                let tap_pos = attr_i8(row, 3).ok_or_else(|| missing("model/transformer/tap_pos", "transformer missing tap_pos"))?;
                let tap_min = attr_i8(row, 4).ok_or_else(|| missing("model/transformer/tap_min", "transformer missing tap_min"))?;
                let tap_max = attr_i8(row, 5).ok_or_else(|| missing("model/transformer/tap_max", "transformer missing tap_max"))?;
                let tap_direction = attr_i8(row, 6).ok_or_else(|| missing("model/transformer/tap_direction", "transformer missing tap_direction"))?;
                let y_re = attr_f64(row, 7).ok_or_else(|| missing("model/transformer/y_per_tap_re", "transformer missing y_per_tap_re"))?;
                let y_im = attr_f64(row, 8).ok_or_else(|| missing("model/transformer/y_per_tap_im", "transformer missing y_per_tap_im"))?;
                let from_status = attr_i8(row, 9).ok_or_else(|| missing("model/transformer/from_status", "transformer missing from_status"))?;
                let to_status = attr_i8(row, 10).ok_or_else(|| missing("model/transformer/to_status", "transformer missing to_status"))?;

                let source_side_bus = bus_of(from_id, "model/transformer/from_node")?;
                let tap_side_bus = bus_of(to_id, "model/transformer/to_node")?;
                transformer_ids.insert(id, transformers.len());
                transformers.push(Transformer {
                    source_side_bus,
                    tap_side_bus,
                    tap_pos: i32::from(tap_pos),
                    tap_min: i32::from(tap_min),
                    tap_max: i32::from(tap_max),
                    tap_direction: i32::from(tap_direction),
                    y_per_tap: Complex64::new(y_re, y_im),
                    source_side_connected: from_status != 0,
                    tap_side_connected: to_status != 0,
                });
                branches.push(BranchAdmittance {
                    from: source_side_bus,
                    to: tap_side_bus,
                    y_series: Complex64::new(y_re, y_im) * Complex64::new(f64::from(tap_pos), 0.0),
                    y_shunt_from: Complex64::new(0.0, 0.0),
                    y_shunt_to: Complex64::new(0.0, 0.0),
                });
            }
        }

        let mut regulators = Vec::new();
        if let Some(buffer) = input.data.component("transformer_tap_regulator") {
            for row in buffer.rows() {
                let regulated_object = attr_id(row, 1)
                    .ok_or_else(|| missing("model/transformer_tap_regulator/regulated_object", "regulator missing regulated_object"))?;
                let control_side_id = attr_id(row, 2)
                    .ok_or_else(|| missing("model/transformer_tap_regulator/control_side", "regulator missing control_side"))?;
                let u_set = attr_f64(row, 3)
                    .ok_or_else(|| missing("model/transformer_tap_regulator/u_set", "regulator missing u_set"))?;
                let u_band = attr_f64(row, 4)
                    .ok_or_else(|| missing("model/transformer_tap_regulator/u_band", "regulator missing u_band"))?;
                let z_re = attr_f64(row, 5)
                    .ok_or_else(|| missing("model/transformer_tap_regulator/z_comp_re", "regulator missing z_comp_re"))?;
                let z_im = attr_f64(row, 6)
                    .ok_or_else(|| missing("model/transformer_tap_regulator/z_comp_im", "regulator missing z_comp_im"))?;

                let transformer_index = *transformer_ids.get(&regulated_object).ok_or_else(|| {
                    missing(
                        "model/transformer_tap_regulator/regulated_object",
                        &format!("unknown transformer id {regulated_object}"),
                    )
                })?;
                let control_side_bus = bus_of(control_side_id, "model/transformer_tap_regulator/control_side")?;

                regulators.push(TapRegulator {
                    transformer_index,
                    control_side_bus,
                    u_set,
                    u_band,
                    z_comp: Complex64::new(z_re, z_im),
                });
            }
        }

        let ybus = YBus::<T>::build(n_bus, &branches, &[]);
        let topology = Rc::new(topology);
        let pf_solver = IterativeCurrentPfSolver::new(topology.clone(), ybus);
        let optimizer = TapPositionOptimizer::new(pf_solver, regulators, transformers, n_bus, &source_vertices);

        Ok(Self {
            system_frequency,
            topology,
            optimizer,
            input: PfInput { sources, loads },
            load_ids,
            load_pq,
            source_ids,
        })
    }

    pub fn system_frequency(&self) -> f64 {
        self.system_frequency
    }

    pub fn n_bus(&self) -> usize {
        self.topology.n_bus
    }

    /// Applies a batch of attribute-only updates (`sym_load` power/type,
    /// `source` reference voltage). Neither changes the Y-bus pattern or
    /// values, so the cached factorization is preserved. Any other
    /// component name, or a `source.y_ref` change, is rejected rather than
    /// silently ignored: both would require a new factorization this
    /// facade doesn't support after construction.
    pub fn update_component(&mut self, update: &DecodedDataset) -> Result<()> {
        for name in update.component_info.keys() {
            let Some(buffer) = update.data.component(name) else {
                continue;
            };
            match name.as_str() {
                "sym_load" => {
                    for row in buffer.rows() {
                        let id = attr_id(row, 0)
                            .ok_or_else(|| missing("model/sym_load/id", "sym_load update missing id"))?;
                        let idx = *self
                            .load_ids
                            .get(&id)
                            .ok_or_else(|| missing("model/sym_load/id", &format!("unknown sym_load id {id}")))?;
                        let (mut p, mut q) = self.load_pq[idx];
                        if let Some(v) = attr_f64(row, 2) {
                            p = v;
                        }
                        if let Some(v) = attr_f64(row, 3) {
                            q = v;
                        }
                        self.load_pq[idx] = (p, q);
                        self.input.loads[idx].s = PhaseValue::splat(Complex64::new(p, q));
                        if let Some(code) = attr_i8(row, 4) {
                            self.input.loads[idx].gen_type = gen_type_from_code(code)?;
                        }
                    }
                }
                "source" => {
                    for row in buffer.rows() {
                        let id = attr_id(row, 0)
                            .ok_or_else(|| missing("model/source/id", "source update missing id"))?;
                        let idx = *self
                            .source_ids
                            .get(&id)
                            .ok_or_else(|| missing("model/source/id", &format!("unknown source id {id}")))?;
                        if attr_f64(row, 3).is_some() {
                            return Err(PgmError::NotImplemented(
                                "updating source.y_ref after construction".to_string(),
                            ));
                        }
                        if let Some(u_ref) = attr_f64(row, 2) {
                            self.input.sources[idx].u_ref = PhaseValue::splat(Complex64::new(u_ref, 0.0));
                        }
                    }
                }
                other => {
                    return Err(PgmError::NotImplemented(format!(
                        "updating component '{other}' after construction"
                    )))
                }
            }
        }
        Ok(())
    }

    /// True when `update` only touches `sym_load`/`source` attributes, so a
    /// batch of such updates can be run against one prefactorization
    /// instead of refactorizing per scenario.
    pub fn is_update_independent(&self, update: &DecodedDataset) -> bool {
        update
            .component_info
            .keys()
            .all(|name| name == "sym_load" || name == "source")
    }

    pub fn calculate(&mut self, options: &CalculationOptions) -> Result<PfOutput<T>> {
        match options.analysis_type {
            AnalysisType::PowerFlow => {
                let method = CalculationMethod::parse(&options.calculation_method)?;
                let strategy = TapChangingStrategy::parse(&options.tap_changing_strategy)?;
                self.optimizer.optimize(
                    strategy,
                    method,
                    &self.input,
                    options.error_tolerance,
                    options.max_iter,
                )
            }
            AnalysisType::StateEstimation => {
                Err(PgmError::NotImplemented("state estimation".to_string()))
            }
            AnalysisType::ShortCircuit => {
                Err(PgmError::NotImplemented("short circuit calculation".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complex::Sym;
    use crate::dataset::{decode_json_str, SchemaRegistry};
    use crate::solver::DefaultSolver;
    use serde_json::json;

    fn two_bus_dataset() -> DecodedDataset {
        let registry = SchemaRegistry::with_input_schema();
        let doc = json!({
            "type": "input",
            "is_batch": false,
            "attributes": {},
            "data": {
                "node": [{"id": 1, "u_rated": 10.0}, {"id": 2, "u_rated": 10.0}],
                "line": [{"id": 10, "from_node": 1, "to_node": 2, "r1": 0.05, "x1": -0.1}],
                "source": [{"id": 20, "node": 1, "u_ref": 1.0, "y_ref": 1e6}],
                "sym_load": [{"id": 30, "node": 2, "p_specified": 0.0, "q_specified": 0.0, "type": 0}]
            }
        });
        decode_json_str(&doc.to_string(), &registry).unwrap()
    }

    fn regulated_transformer_dataset() -> DecodedDataset {
        let registry = SchemaRegistry::with_input_schema();
        let doc = json!({
            "type": "input",
            "is_batch": false,
            "attributes": {},
            "data": {
                "node": [{"id": 1, "u_rated": 10.0}, {"id": 2, "u_rated": 10.0}],
                "source": [{"id": 20, "node": 1, "u_ref": 1.05, "y_ref": 1e6}],
                "sym_load": [],
                "transformer": [{
                    "id": 40, "from_node": 1, "to_node": 2,
                    "tap_pos": 0, "tap_min": -10, "tap_max": 10, "tap_direction": 1,
                    "y_per_tap_re": 0.0, "y_per_tap_im": 0.0,
                    "from_status": 1, "to_status": 1
                }],
                "transformer_tap_regulator": [{
                    "id": 41, "regulated_object": 40, "control_side": 2,
                    "u_set": 1.0, "u_band": 0.02, "z_comp_re": 0.0, "z_comp_im": 0.0
                }]
            }
        });
        decode_json_str(&doc.to_string(), &registry).unwrap()
    }

    #[test]
    fn zero_load_converges_near_source_voltage() {
        let dataset = two_bus_dataset();
        let mut model = Model::<Sym, DefaultSolver>::new(50.0, &dataset).unwrap();
        let out = model.calculate(&CalculationOptions::default()).unwrap();
        for u in &out.u {
            assert!((u.max_val() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn newton_raphson_reports_missing_case() {
        let dataset = two_bus_dataset();
        let mut model = Model::<Sym, DefaultSolver>::new(50.0, &dataset).unwrap();
        let options = CalculationOptions {
            calculation_method: "newton_raphson".to_string(),
            ..CalculationOptions::default()
        };
        assert!(matches!(
            model.calculate(&options),
            Err(PgmError::MissingCaseForEnumError { .. })
        ));
    }

    #[test]
    fn state_estimation_reports_not_implemented() {
        let dataset = two_bus_dataset();
        let mut model = Model::<Sym, DefaultSolver>::new(50.0, &dataset).unwrap();
        let options = CalculationOptions {
            analysis_type: AnalysisType::StateEstimation,
            ..CalculationOptions::default()
        };
        assert!(matches!(
            model.calculate(&options),
            Err(PgmError::NotImplemented(_))
        ));
    }

    #[test]
    fn independent_update_changes_load_without_touching_sources() {
        let dataset = two_bus_dataset();
        let mut model = Model::<Sym, DefaultSolver>::new(50.0, &dataset).unwrap();

        let registry = SchemaRegistry::with_input_schema();
        let update_doc = json!({
            "type": "input",
            "is_batch": false,
            "attributes": {},
            "data": {
                "sym_load": [{"id": 30, "node": 2, "p_specified": 0.2, "q_specified": 0.0, "type": 0}]
            }
        });
        let update = decode_json_str(&update_doc.to_string(), &registry).unwrap();
        assert!(model.is_update_independent(&update));
        model.update_component(&update).unwrap();
        assert_eq!(model.load_pq[0].0, 0.2);
    }

    #[test]
    fn non_any_strategy_drives_the_tap_optimizer_through_calculate() {
        let dataset = regulated_transformer_dataset();
        let mut model = Model::<Sym, DefaultSolver>::new(50.0, &dataset).unwrap();
        let options = CalculationOptions {
            tap_changing_strategy: "global_minimum".to_string(),
            ..CalculationOptions::default()
        };
        let out = model.calculate(&options).unwrap();
        assert_eq!(out.u.len(), 2);
    }
}

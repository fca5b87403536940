//! Dataset deserializer (C7): decodes the JSON scenario-exchange format,
//! inferring uniform vs ragged batch shape, and populates the typed
//! [`super::writable::WritableDataset`] buffers (C8) solvers read from.
//!
//! The wire format here is JSON (via `serde_json::Value`) rather than the
//! binary dictionary format the root document also allows; decoding that
//! binary encoding is a byte-framing concern, not a schema-decoding one.

use serde_json::Value;
use std::collections::HashMap;

use super::schema::{AttributeType, AttributeValue, SchemaRegistry};
use super::writable::WritableDataset;
use crate::error::{PgmError, Result};

#[derive(Debug, Clone)]
pub struct ComponentInfo {
    /// -1 when this component is ragged across the batch.
    pub elements_per_scenario: i64,
    pub total_elements: usize,
    pub indptr: Option<Vec<usize>>,
}

#[derive(Debug, Clone)]
pub struct DecodedDataset {
    pub dataset_type: String,
    pub is_batch: bool,
    pub batch_size: usize,
    pub component_info: HashMap<String, ComponentInfo>,
    /// The decoded rows, held in the same writable-buffer shape the solver
    /// reads from and writes derived output into (see [`super::writable`]).
    pub data: WritableDataset,
}

/// Scoped guard that pushes a path segment on construction and pops it on
/// drop (normal return or error unwind alike), so the stack always reflects
/// the parser's current structural position.
struct PathGuard<'a> {
    stack: &'a mut Vec<String>,
}

impl<'a> PathGuard<'a> {
    fn push(stack: &'a mut Vec<String>, segment: impl Into<String>) -> Self {
        stack.push(segment.into());
        Self { stack }
    }
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        self.stack.pop();
    }
}

struct Decoder<'a> {
    registry: &'a SchemaRegistry,
    path: Vec<String>,
}

impl<'a> Decoder<'a> {
    fn error(&self, message: impl Into<String>) -> PgmError {
        PgmError::Serialization {
            message: message.into(),
            path: self.path.join("/"),
        }
    }

    fn decode(&mut self, root: &Value) -> Result<DecodedDataset> {
        let _root_guard = PathGuard::push(&mut self.path, "data");

        let obj = root
            .as_object()
            .ok_or_else(|| self.error("root must be a JSON object"))?;

        let dataset_type = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| self.error("missing \"type\""))?
            .to_string();
        let schema = self
            .registry
            .get(&dataset_type)
            .ok_or_else(|| self.error(format!("unknown dataset type: {dataset_type}")))?
            .clone();

        let is_batch = obj
            .get("is_batch")
            .and_then(Value::as_bool)
            .ok_or_else(|| self.error("missing \"is_batch\""))?;

        let attribute_order = self.decode_attribute_order(obj)?;

        let data = obj
            .get("data")
            .ok_or_else(|| self.error("missing \"data\""))?;

        let scenarios: Vec<&Value> = if is_batch {
            data.as_array()
                .ok_or_else(|| self.error("\"data\" must be a list when is_batch is true"))?
                .iter()
                .collect()
        } else {
            vec![data]
        };
        let batch_size = scenarios.len().max(1);

        let mut components: HashMap<String, Vec<Vec<AttributeValue>>> = HashMap::new();
        let mut counts: HashMap<String, Vec<usize>> = HashMap::new();

        for (scenario_index, scenario) in scenarios.iter().enumerate() {
            let _scenario_guard = PathGuard::push(&mut self.path, scenario_index.to_string());
            let scenario_obj = scenario
                .as_object()
                .ok_or_else(|| self.error("scenario must be a JSON object"))?;

            for (component_name, elements) in scenario_obj {
                let _component_guard =
                    PathGuard::push(&mut self.path, component_name.clone());
                let component_schema = schema.component(component_name).ok_or_else(|| {
                    self.error(format!("unknown component: {component_name}"))
                })?;
                let positional = attribute_order.get(component_name);

                let elements = elements
                    .as_array()
                    .ok_or_else(|| self.error("component value must be a list of elements"))?;

                let rows = components.entry(component_name.clone()).or_default();
                let count_vec = counts.entry(component_name.clone()).or_insert_with(Vec::new);
                while count_vec.len() <= scenario_index {
                    count_vec.push(0);
                }
                count_vec[scenario_index] = elements.len();

                for (element_index, element) in elements.iter().enumerate() {
                    let _element_guard =
                        PathGuard::push(&mut self.path, element_index.to_string());
                    rows.push(self.decode_element(element, component_schema, positional)?);
                }
            }
        }

        let component_info = self.infer_batch_shape(&counts, batch_size)?;

        let mut data = WritableDataset::new();
        for (name, info) in &component_info {
            let buffer = data.add_component_info(name, info.elements_per_scenario, info.total_elements);
            if let Some(rows) = components.remove(name) {
                for (i, row) in rows.into_iter().enumerate() {
                    let dest = buffer.advance_ptr(i);
                    dest.extend(row);
                }
            }
        }

        Ok(DecodedDataset {
            dataset_type,
            is_batch,
            batch_size,
            component_info,
            data,
        })
    }

    fn decode_attribute_order(
        &self,
        obj: &serde_json::Map<String, Value>,
    ) -> Result<HashMap<String, Vec<String>>> {
        let mut out = HashMap::new();
        let Some(attributes) = obj.get("attributes") else {
            return Ok(out);
        };
        let attributes = attributes
            .as_object()
            .ok_or_else(|| self.error("\"attributes\" must be an object"))?;
        for (component, names) in attributes {
            let names = names
                .as_array()
                .ok_or_else(|| self.error("attribute list must be an array"))?
                .iter()
                .map(|v| v.as_str().unwrap_or_default().to_string())
                .collect();
            out.insert(component.clone(), names);
        }
        Ok(out)
    }

    fn decode_element(
        &mut self,
        element: &Value,
        schema: &super::schema::ComponentSchema,
        positional_override: Option<&Vec<String>>,
        ) -> Result<Vec<AttributeValue>> {
        match element {
            Value::Array(values) => {
                if values.len() != schema.attributes.len() {
                    return Err(self.error(format!(
                        "element list length {} does not match attribute count {}",
                        values.len(),
                        schema.attributes.len()
                    )));
                }
                let order: Vec<&str> = match positional_override {
                    Some(names) => names.iter().map(String::as_str).collect(),
                    None => schema.attributes.iter().map(|a| a.name).collect(),
                };
                let mut row: Vec<AttributeValue> = schema
                    .attributes
                    .iter()
                    .map(|a| AttributeValue::nil_for(a.ty))
                    .collect();
                for (value, name) in values.iter().zip(order.iter()) {
                    let Some(idx) = schema.attribute_index(name) else {
                        continue;
                    };
                    let _attr_guard = PathGuard::push(&mut self.path, name.to_string());
                    row[idx] = self.decode_scalar(value, schema.attributes[idx].ty)?;
                }
                Ok(row)
            }
            Value::Object(map) => {
                let mut row: Vec<AttributeValue> = schema
                    .attributes
                    .iter()
                    .map(|a| AttributeValue::nil_for(a.ty))
                    .collect();
                for (key, value) in map {
                    let Some(idx) = schema.attribute_index(key) else {
                        continue; // unknown keys are forward-compatible, silently ignored
                    };
                    let _attr_guard = PathGuard::push(&mut self.path, key.clone());
                    row[idx] = self.decode_scalar(value, schema.attributes[idx].ty)?;
                }
                Ok(row)
            }
            _ => Err(self.error("element must be a list or an object")),
        }
    }

    fn decode_scalar(&self, value: &Value, ty: AttributeType) -> Result<AttributeValue> {
        if value.is_null() {
            return Ok(AttributeValue::nil_for(ty));
        }
        match ty {
            AttributeType::Int32 | AttributeType::Id => {
                let n = value
                    .as_i64()
                    .ok_or_else(|| self.error("expected an integer"))?;
                Ok(if ty == AttributeType::Id {
                    AttributeValue::Id(Some(n as i32))
                } else {
                    AttributeValue::Int32(Some(n as i32))
                })
            }
            AttributeType::Int8 => {
                let n = value
                    .as_i64()
                    .ok_or_else(|| self.error("expected an integer"))?;
                Ok(AttributeValue::Int8(Some(n as i8)))
            }
            AttributeType::Float64 => {
                let f = value
                    .as_f64()
                    .ok_or_else(|| self.error("expected a float"))?;
                Ok(AttributeValue::Float64(Some(f)))
            }
            AttributeType::Float64x3 => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| self.error("expected a 3-element list"))?;
                if arr.len() != 3 {
                    return Err(self.error("float64x3 requires exactly 3 elements"));
                }
                let mut out = [None; 3];
                for (i, v) in arr.iter().enumerate() {
                    if !v.is_null() {
                        out[i] = Some(
                            v.as_f64()
                                .ok_or_else(|| self.error("expected a float"))?,
                        );
                    }
                }
                Ok(AttributeValue::Float64x3(out))
            }
        }
    }

    fn infer_batch_shape(
        &self,
        counts: &HashMap<String, Vec<usize>>,
        batch_size: usize,
    ) -> Result<HashMap<String, ComponentInfo>> {
        let mut out = HashMap::new();
        for (component, per_scenario) in counts {
            let mut padded = per_scenario.clone();
            padded.resize(batch_size, 0);

            let uniform = padded.windows(2).all(|w| w[0] == w[1]);
            let total: usize = padded.iter().sum();

            if uniform {
                out.insert(
                    component.clone(),
                    ComponentInfo {
                        elements_per_scenario: padded.first().copied().unwrap_or(0) as i64,
                        total_elements: total,
                        indptr: None,
                    },
                );
            } else {
                let mut indptr = Vec::with_capacity(batch_size + 1);
                indptr.push(0usize);
                let mut running = 0usize;
                for count in &padded {
                    running += count;
                    indptr.push(running);
                }
                out.insert(
                    component.clone(),
                    ComponentInfo {
                        elements_per_scenario: -1,
                        total_elements: total,
                        indptr: Some(indptr),
                    },
                );
            }
        }
        Ok(out)
    }
}

pub fn decode(root: &Value, registry: &SchemaRegistry) -> Result<DecodedDataset> {
    let mut decoder = Decoder {
        registry,
        path: Vec::new(),
    };
    decoder.decode(root)
}

pub fn decode_json_str(text: &str, registry: &SchemaRegistry) -> Result<DecodedDataset> {
    let value: Value = serde_json::from_str(text).map_err(|e| PgmError::Serialization {
        message: format!("invalid JSON: {e}"),
        path: "data".to_string(),
    })?;
    decode(&value, registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_element_key_is_silently_ignored() {
        let registry = SchemaRegistry::with_input_schema();
        let doc = json!({
            "type": "input",
            "is_batch": false,
            "attributes": {},
            "data": {
                "node": [{"id": 1, "u_rated": 10.5, "label": "unused"}]
            }
        });
        let decoded = decode(&doc, &registry).unwrap();
        assert_eq!(decoded.data.component("node").unwrap().rows().len(), 1);
    }

    #[test]
    fn mismatched_positional_length_reports_exact_path() {
        let registry = SchemaRegistry::with_input_schema();
        let doc = json!({
            "type": "input",
            "is_batch": true,
            "attributes": {},
            "data": [
                { "node": [[1, 10.0], [2, 10.0], [1, 2, 3]] }
            ]
        });
        let err = decode(&doc, &registry).unwrap_err();
        match err {
            PgmError::Serialization { path, .. } => assert_eq!(path, "data/0/node/2"),
            other => panic!("expected Serialization error, got {other:?}"),
        }
    }

    #[test]
    fn ragged_batch_produces_expected_indptr() {
        let registry = SchemaRegistry::with_input_schema();
        let one_load = || json!([{"id": 1, "node": 1, "p_specified": 1.0, "q_specified": 0.0, "type": 0}]);
        let five_loads = json!({
            "node": [{"id": 1, "u_rated": 10.0}],
            "sym_load": (0..5).map(|_| one_load()[0].clone()).collect::<Vec<_>>(),
        });
        let six_loads = json!({
            "node": [{"id": 1, "u_rated": 10.0}],
            "sym_load": (0..6).map(|_| one_load()[0].clone()).collect::<Vec<_>>(),
        });
        let doc = json!({
            "type": "input",
            "is_batch": true,
            "attributes": {},
            "data": [five_loads.clone(), five_loads.clone(), five_loads, six_loads]
        });
        let decoded = decode(&doc, &registry).unwrap();
        let info = &decoded.component_info["sym_load"];
        assert_eq!(info.elements_per_scenario, -1);
        assert_eq!(info.indptr, Some(vec![0, 5, 10, 15, 21]));
    }
}

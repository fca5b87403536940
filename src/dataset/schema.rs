//! Process-wide, immutable schema registry. Populated once at startup and
//! passed into the deserializer as an explicit handle rather than touched
//! as global mutable state.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    Int32,
    Int8,
    Float64,
    Float64x3,
    Id,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Int32(Option<i32>),
    Int8(Option<i8>),
    Float64(Option<f64>),
    Float64x3([Option<f64>; 3]),
    Id(Option<i32>),
}

impl AttributeValue {
    pub fn nil_for(ty: AttributeType) -> Self {
        match ty {
            AttributeType::Int32 => AttributeValue::Int32(None),
            AttributeType::Int8 => AttributeValue::Int8(None),
            AttributeType::Float64 => AttributeValue::Float64(None),
            AttributeType::Float64x3 => AttributeValue::Float64x3([None, None, None]),
            AttributeType::Id => AttributeValue::Id(None),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: &'static str,
    pub ty: AttributeType,
}

#[derive(Debug, Clone)]
pub struct ComponentSchema {
    pub name: &'static str,
    pub attributes: Vec<AttributeSchema>,
}

impl ComponentSchema {
    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct DatasetSchema {
    pub name: &'static str,
    pub components: Vec<ComponentSchema>,
}

impl DatasetSchema {
    pub fn component(&self, name: &str) -> Option<&ComponentSchema> {
        self.components.iter().find(|c| c.name == name)
    }
}

pub struct SchemaRegistry {
    datasets: HashMap<&'static str, DatasetSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            datasets: HashMap::new(),
        }
    }

    pub fn register(&mut self, schema: DatasetSchema) {
        self.datasets.insert(schema.name, schema);
    }

    pub fn get(&self, name: &str) -> Option<&DatasetSchema> {
        self.datasets.get(name)
    }

    /// A registry pre-loaded with the `input` dataset schema used by the
    /// tests and examples in this crate: `node` (id, u_rated), `line`
    /// (id, from_node, to_node, r1, x1), `source` (id, node, u_ref, y_ref),
    /// `sym_load` (id, node, p_specified, q_specified, type), `transformer`
    /// (id, from_node, to_node, tap_pos, tap_min, tap_max, tap_direction,
    /// y_per_tap_re, y_per_tap_im, from_status, to_status) and
    /// `transformer_tap_regulator` (id, regulated_object, control_side,
    /// u_set, u_band, z_comp_re, z_comp_im).
    pub fn with_input_schema() -> Self {
        let mut registry = Self::new();
        registry.register(DatasetSchema {
            name: "input",
            components: vec![
                ComponentSchema {
                    name: "node",
                    attributes: vec![
                        AttributeSchema {
                            name: "id",
                            ty: AttributeType::Id,
                        },
                        AttributeSchema {
                            name: "u_rated",
                            ty: AttributeType::Float64,
                        },
                    ],
                },
                ComponentSchema {
                    name: "line",
                    attributes: vec![
                        AttributeSchema {
                            name: "id",
                            ty: AttributeType::Id,
                        },
                        AttributeSchema {
                            name: "from_node",
                            ty: AttributeType::Id,
                        },
                        AttributeSchema {
                            name: "to_node",
                            ty: AttributeType::Id,
                        },
                        AttributeSchema {
                            name: "r1",
                            ty: AttributeType::Float64,
                        },
                        AttributeSchema {
                            name: "x1",
                            ty: AttributeType::Float64,
                        },
                    ],
                },
                ComponentSchema {
                    name: "source",
                    attributes: vec![
                        AttributeSchema {
                            name: "id",
                            ty: AttributeType::Id,
                        },
                        AttributeSchema {
                            name: "node",
                            ty: AttributeType::Id,
                        },
                        AttributeSchema {
                            name: "u_ref",
                            ty: AttributeType::Float64,
                        },
                        AttributeSchema {
                            name: "y_ref",
                            ty: AttributeType::Float64,
                        },
                    ],
                },
                ComponentSchema {
                    name: "sym_load",
                    attributes: vec![
                        AttributeSchema {
                            name: "id",
                            ty: AttributeType::Id,
                        },
                        AttributeSchema {
                            name: "node",
                            ty: AttributeType::Id,
                        },
                        AttributeSchema {
                            name: "p_specified",
                            ty: AttributeType::Float64,
                        },
                        AttributeSchema {
                            name: "q_specified",
                            ty: AttributeType::Float64,
                        },
                        AttributeSchema {
                            name: "type",
                            ty: AttributeType::Int8,
                        },
                    ],
                },
                ComponentSchema {
                    name: "transformer",
                    attributes: vec![
                        AttributeSchema { name: "id", ty: AttributeType::Id },
                        AttributeSchema { name: "from_node", ty: AttributeType::Id },
                        AttributeSchema { name: "to_node", ty: AttributeType::Id },
                        AttributeSchema { name: "tap_pos", ty: AttributeType::Int8 },
                        AttributeSchema { name: "tap_min", ty: AttributeType::Int8 },
                        AttributeSchema { name: "tap_max", ty: AttributeType::Int8 },
                        AttributeSchema { name: "tap_direction", ty: AttributeType::Int8 },
                        AttributeSchema { name: "y_per_tap_re", ty: AttributeType::Float64 },
                        AttributeSchema { name: "y_per_tap_im", ty: AttributeType::Float64 },
                        AttributeSchema { name: "from_status", ty: AttributeType::Int8 },
                        AttributeSchema { name: "to_status", ty: AttributeType::Int8 },
                    ],
                },
                ComponentSchema {
                    name: "transformer_tap_regulator",
                    attributes: vec![
                        AttributeSchema { name: "id", ty: AttributeType::Id },
                        AttributeSchema { name: "regulated_object", ty: AttributeType::Id },
                        AttributeSchema { name: "control_side", ty: AttributeType::Id },
                        AttributeSchema { name: "u_set", ty: AttributeType::Float64 },
                        AttributeSchema { name: "u_band", ty: AttributeType::Float64 },
                        AttributeSchema { name: "z_comp_re", ty: AttributeType::Float64 },
                        AttributeSchema { name: "z_comp_im", ty: AttributeType::Float64 },
                    ],
                },
            ],
        });
        registry
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

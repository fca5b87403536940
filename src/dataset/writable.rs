//! Writable dataset handler (C8): the mutable component buffers that the
//! deserializer populates and that solvers read from / write derived
//! output into.
//!
//! The source models this with raw per-element pointer arithmetic sized by
//! a schema-known record layout; here each component is a `Vec` of typed
//! attribute rows instead; `advance_ptr` becomes ordinary indexing, which
//! is the safe-Rust rendition of the same "locate element i" contract.

use std::collections::HashMap;

use super::schema::AttributeValue;

#[derive(Debug, Clone)]
pub struct ComponentBuffer {
    pub elements_per_scenario: i64,
    pub total_elements: usize,
    pub indptr: Option<Vec<usize>>,
    rows: Vec<Vec<AttributeValue>>,
}

impl ComponentBuffer {
    pub fn advance_ptr(&mut self, i: usize) -> &mut Vec<AttributeValue> {
        &mut self.rows[i]
    }

    pub fn row(&self, i: usize) -> &[AttributeValue] {
        &self.rows[i]
    }

    pub fn rows(&self) -> &[Vec<AttributeValue>] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [Vec<AttributeValue>] {
        &mut self.rows
    }
}

#[derive(Default)]
pub struct WritableDataset {
    components: HashMap<String, ComponentBuffer>,
}

impl WritableDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a buffer of `total_elements` empty rows for `name`,
    /// optionally tracking a ragged `indptr` (only when
    /// `elements_per_scenario < 0`), and returns it for population.
    pub fn add_component_info(
        &mut self,
        name: &str,
        elements_per_scenario: i64,
        total_elements: usize,
    ) -> &mut ComponentBuffer {
        let indptr = (elements_per_scenario < 0).then(Vec::new);
        self.components.insert(
            name.to_string(),
            ComponentBuffer {
                elements_per_scenario,
                total_elements,
                indptr,
                rows: vec![Vec::new(); total_elements],
            },
        );
        self.components.get_mut(name).unwrap()
    }

    pub fn component(&self, name: &str) -> Option<&ComponentBuffer> {
        self.components.get(name)
    }

    pub fn component_mut(&mut self, name: &str) -> Option<&mut ComponentBuffer> {
        self.components.get_mut(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_ptr_locates_the_requested_element() {
        let mut dataset = WritableDataset::new();
        let buffer = dataset.add_component_info("node", 2, 4);
        buffer.advance_ptr(3).push(AttributeValue::Id(Some(7)));
        assert_eq!(
            dataset.component("node").unwrap().row(3),
            &[AttributeValue::Id(Some(7))]
        );
    }
}

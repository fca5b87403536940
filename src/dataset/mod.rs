//! Scenario exchange format: schema registry (meta-data), deserializer (C7)
//! and writable buffer handler (C8).

pub mod deserializer;
pub mod schema;
pub mod writable;

pub use deserializer::{decode, decode_json_str, ComponentInfo, DecodedDataset};
pub use schema::{AttributeType, AttributeValue, ComponentSchema, DatasetSchema, SchemaRegistry};
pub use writable::{ComponentBuffer, WritableDataset};

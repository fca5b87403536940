//! Transformer tap-position optimizer: ranks regulated transformers by
//! electrical distance from sources (C5) then runs a discrete-continuous
//! outer loop over the PF solver until every regulator settles (C6).
//!
//! Edge weights in the ranking graph are uniform (every hop costs 1); the
//! source material hints at future non-uniform weighting by voltage-level
//! change, left as a later extension since nothing here depends on it.

mod graph;
mod tap;

pub use graph::TransformerGraph;
pub use tap::{TapChangingStrategy, TapPositionOptimizer, TapRegulator, Transformer};

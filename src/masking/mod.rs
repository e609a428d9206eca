//! Field masking driven by schema sensitivity annotations.
//!
//! 1. `schema` parses annotations into a validated field tree
//! 2. `taxonomy` resolves the configured emit level (numeric or categorical)
//! 3. `mask` compiles both into a reusable [`MaskFn`]

pub mod mask;
pub mod schema;
pub mod taxonomy;

pub use mask::{MaskBuilder, MaskFn};
pub use schema::{FieldDef, Schema, Sensitivity};
pub use taxonomy::{EmitLevel, Taxonomy};

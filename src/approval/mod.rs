//! Approval filtering.
//!
//! A compiled [`ApprovalFn`] looks up one field (by [`FieldPath`]) in the
//! unmasked message and checks it against a set of accepted values.

pub mod filter;
pub mod path;

pub use filter::{ApprovalBuilder, ApprovalConfig, ApprovalFn, DEFAULT_FIELD_PATH};
pub use path::FieldPath;

//! # Validation
//!
//! - `names.rs` - Name and identifier rules of the receiving AWS APIs
//! - `topology.rs` - Structural properties every built stack must satisfy

pub mod names;
pub mod topology;

pub use topology::{validate_stack, CheckResult, ValidationReport};

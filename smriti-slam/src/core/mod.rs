//! Foundation layer: geometric types and math primitives.
//!
//! Nothing in here depends on any other module of the crate.

pub mod math;
pub mod types;

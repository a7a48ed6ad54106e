//! Mapping engine.
//!
//! # Contents
//!
//! - [`graph`]: pose graph, solver plugins, spatial index, manager
//! - [`lifelong`]: overlap-based vertex retention and eviction
//! - [`map`]: occupancy map regeneration from the graph

pub mod graph;
pub mod lifelong;
pub mod map;

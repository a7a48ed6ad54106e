//! Pure algorithms with no shared state.
//!
//! - [`matching`]: scan-to-scan alignment used to build ScanMatch edges
//! - [`mapping`]: ray-traced hit/pass counting grid used by map regeneration

pub mod mapping;
pub mod matching;

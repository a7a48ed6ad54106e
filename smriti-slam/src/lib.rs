//! SmritiSLAM - lifelong 2D pose-graph SLAM with a bounded graph.
//!
//! Range scans are admitted through a rate-limited queue, turned into pose
//! graph vertices with odometry and scan-match edges, optimized by a
//! pluggable solver, and pruned by a lifelong pass that evicts vertices
//! whose footprint is already covered by their neighbors. A background
//! thread rebuilds an occupancy grid from the graph.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │            system / threads / state                 │  ← Runtime
//! │   (SlamSystem, ingestion + map threads, commands)   │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                ingestion/   io/                     │  ← Infrastructure
//! │   (admission queue, pose lookup, persistence)       │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                    engine/                          │  ← Orchestration
//! │        (pose graph, lifelong pruning, map)          │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                  algorithms/                        │  ← Core algorithms
//! │              (matching, mapping)                    │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │                (types, math)                        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! `sim/` provides a simulated room and range sensor for the daemon and the
//! tests.

// ============================================================================
// Layer 1: Core foundation (no internal deps)
// ============================================================================
pub mod core;

// ============================================================================
// Layer 2: Algorithms (depends on core)
// ============================================================================
pub mod algorithms;

// ============================================================================
// Layer 3: Engine (depends on core, algorithms)
// ============================================================================
pub mod engine;

// ============================================================================
// Layer 4: Infrastructure (depends on engine)
// ============================================================================
pub mod error;
pub mod ingestion;
pub mod io;

// ============================================================================
// Layer 5: Runtime
// ============================================================================
pub mod config;
pub mod state;
mod system;
pub mod threads;

pub mod sim;

// ============================================================================
// Convenience re-exports (flat namespace for common use)
// ============================================================================

// Core types
pub use core::math;
pub use core::types::{BoundingBox2D, LaserScan, PointCloud2D, PosedScan};
pub use core::types::{Point2D, Pose2D, Timestamped};

// Engine
pub use engine::graph::{
    DeserializeMode, EdgeKind, GraphStats, LaserGeometry, PoseGraph, PoseGraphConfig,
    PoseGraphManager, SharedGraph, VertexId,
};
pub use engine::lifelong::{LifelongConfig, LifelongPruner};
pub use engine::map::{MapConfig, MapRegenerator, MapSink, Snapshot};

// Ingestion
pub use ingestion::{
    Admission, AdmissionConfig, OdometryBuffer, RejectionReason, ScanQueue, SensorFrontend,
    TransformProvider,
};

// Runtime
pub use config::{SmritiConfig, load_config};
pub use error::{Result, SlamError};
pub use state::{CommandResponse, LatestMap, SlamCommand};
pub use system::{DEFAULT_COMMAND_TIMEOUT_MS, SlamSystem};

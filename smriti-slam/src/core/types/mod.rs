//! Core geometric and sensor types.
//!
//! - [`Pose2D`], [`Point2D`]: SE(2) poses and points in meters/radians
//! - [`LaserScan`], [`PointCloud2D`]: raw polar scans and Cartesian clouds
//! - [`PosedScan`]: a scan paired with its capture pose (queue element)
//! - [`BoundingBox2D`]: axis-aligned scan footprints used for overlap scoring
//! - [`Timestamped<T>`]: generic timestamp wrapper

mod bounding_box;
mod pose;
mod scan;
mod timestamped;

pub use bounding_box::BoundingBox2D;
pub use pose::{Point2D, Pose2D};
pub use scan::{LaserScan, PointCloud2D, PosedScan};
pub use timestamped::Timestamped;

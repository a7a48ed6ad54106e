//! Simulated environment for the daemon and integration tests.
//!
//! A polygonal room ray-cast by a noisy range sensor, an odometry source
//! that drifts, and a loop route to drive. Nothing here is used by the
//! mapping pipeline itself.

mod lidar;
mod room;
mod route;

pub use lidar::{LidarSimConfig, LidarSimulator, OdometrySimulator};
pub use room::Room;
pub use route::LoopRoute;

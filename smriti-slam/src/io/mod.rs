//! File I/O: pose graph persistence and map export.
//!
//! - [`persistence`]: bincode pose graph files
//! - [`map_export`]: ROS map_server compatible PGM + YAML

pub mod map_export;
pub mod persistence;

pub use map_export::{MapInfo, load_map_info, save_map};
pub use persistence::{
    PersistenceError, deserialize_graph, load_graph, save_graph, serialize_graph,
};

//! Pose graph files.
//!
//! The graph is written as a versioned bincode record: every surviving
//! vertex with its scan and lifelong state, every edge, and the id
//! allocators so ids stay unique across save/load cycles. Point clouds are
//! derived data and are recomputed on load.

use std::collections::{BTreeSet, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::{BoundingBox2D, LaserScan, Pose2D};
use crate::engine::graph::{Edge, EdgeId, PoseGraph, RetentionState, Vertex, VertexId};

/// Current on-disk format version.
const FORMAT_VERSION: u32 = 1;

/// Pose graph and map file errors.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unsupported pose graph format version {0}")]
    UnsupportedVersion(u32),

    #[error("corrupt pose graph: {0}")]
    Corrupt(String),

    #[error("no map available to save")]
    NoMap,
}

#[derive(Serialize, Deserialize)]
struct GraphRecord {
    version: u32,
    next_vertex_id: VertexId,
    next_edge_id: EdgeId,
    vertices: Vec<VertexRecord>,
    edges: Vec<Edge>,
}

#[derive(Serialize, Deserialize)]
struct VertexRecord {
    id: VertexId,
    pose: Pose2D,
    odom_pose: Pose2D,
    sensor_offset: Pose2D,
    scan: LaserScan,
    bounding_box: BoundingBox2D,
    retention_score: Option<f32>,
    retention_state: RetentionState,
}

impl From<&Vertex> for VertexRecord {
    fn from(v: &Vertex) -> Self {
        Self {
            id: v.id,
            pose: v.pose,
            odom_pose: v.odom_pose,
            sensor_offset: v.sensor_offset,
            scan: (*v.scan).clone(),
            bounding_box: v.bounding_box,
            retention_score: v.retention_score,
            retention_state: v.retention_state,
        }
    }
}

impl From<VertexRecord> for Vertex {
    fn from(r: VertexRecord) -> Self {
        let cloud = r.scan.to_point_cloud().transform(&r.sensor_offset);
        Vertex {
            id: r.id,
            pose: r.pose,
            odom_pose: r.odom_pose,
            sensor_offset: r.sensor_offset,
            scan: Arc::new(r.scan),
            cloud: Arc::new(cloud),
            bounding_box: r.bounding_box,
            retention_score: r.retention_score,
            retention_state: r.retention_state,
            edges: BTreeSet::new(),
        }
    }
}

/// Encode a graph.
pub fn serialize_graph(graph: &PoseGraph) -> Result<Vec<u8>, PersistenceError> {
    let record = GraphRecord {
        version: FORMAT_VERSION,
        next_vertex_id: graph.next_vertex_id(),
        next_edge_id: graph.next_edge_id(),
        vertices: graph.vertices().map(VertexRecord::from).collect(),
        edges: graph.edges().cloned().collect(),
    };
    Ok(bincode::serialize(&record)?)
}

/// Decode a graph, validating its structure before building it.
pub fn deserialize_graph(bytes: &[u8]) -> Result<PoseGraph, PersistenceError> {
    let record: GraphRecord = bincode::deserialize(bytes)?;
    from_record(record)
}

fn from_record(record: GraphRecord) -> Result<PoseGraph, PersistenceError> {
    if record.version != FORMAT_VERSION {
        return Err(PersistenceError::UnsupportedVersion(record.version));
    }

    let mut ids = HashSet::with_capacity(record.vertices.len());
    for v in &record.vertices {
        if !ids.insert(v.id) {
            return Err(PersistenceError::Corrupt(format!("duplicate vertex {}", v.id)));
        }
    }
    let mut edge_ids = HashSet::with_capacity(record.edges.len());
    for e in &record.edges {
        if !edge_ids.insert(e.id) {
            return Err(PersistenceError::Corrupt(format!("duplicate edge {}", e.id)));
        }
        if e.from == e.to || !ids.contains(&e.from) || !ids.contains(&e.to) {
            return Err(PersistenceError::Corrupt(format!(
                "edge {} has invalid endpoints ({} -> {})",
                e.id, e.from, e.to
            )));
        }
    }

    let mut graph = PoseGraph::new();
    for v in record.vertices {
        graph.restore_vertex(Vertex::from(v));
    }
    for e in record.edges {
        graph.restore_edge(e);
    }
    graph.advance_allocators(record.next_vertex_id, record.next_edge_id);
    Ok(graph)
}

/// Write a graph file.
pub fn save_graph(path: &Path, graph: &PoseGraph) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let bytes = serialize_graph(graph)?;
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&bytes)?;
    writer.flush()?;
    log::info!(
        "Saved pose graph ({} vertices, {} edges) to {}",
        graph.num_vertices(),
        graph.num_edges(),
        path.display()
    );
    Ok(())
}

/// Read a graph file.
pub fn load_graph(path: &Path) -> Result<PoseGraph, PersistenceError> {
    let reader = BufReader::new(File::open(path)?);
    let record: GraphRecord = bincode::deserialize_from(reader)?;
    let graph = from_record(record)?;
    log::info!(
        "Loaded pose graph ({} vertices, {} edges) from {}",
        graph.num_vertices(),
        graph.num_edges(),
        path.display()
    );
    Ok(graph)
}

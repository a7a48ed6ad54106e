//! Vertex eviction with constraint transfer.
//!
//! Dropping a vertex's edges outright can split the graph. Instead, every
//! edge of the evicted vertex is re-attached to its strongest surviving
//! neighbor (the one joined by the highest-information edge): the two
//! relative measurements are chained and their information combined in
//! series, so the transferred constraint is weaker than either original.

use crate::engine::graph::{Constraint, Edge, PoseGraph, Vertex, VertexId};

/// Outcome of one eviction.
#[derive(Debug, Clone)]
pub struct Eviction {
    /// The removed vertex (its scan is dropped with it).
    pub vertex: Vertex,
    /// Edges removed with the vertex.
    pub removed_edges: Vec<Edge>,
    /// Edges created on the strongest neighbor.
    pub added_edges: Vec<Edge>,
}

/// Remove `id` from the graph, transferring its constraints.
///
/// Returns `None` if the vertex does not exist.
pub fn evict_with_transfer(graph: &mut PoseGraph, id: VertexId) -> Option<Eviction> {
    let incident: Vec<(VertexId, Edge)> = graph
        .neighbors(id)
        .map(|(n, e)| (n, e.clone()))
        .collect();

    let hub = incident
        .iter()
        .max_by(|a, b| {
            a.1.constraint
                .information
                .strength()
                .total_cmp(&b.1.constraint.information.strength())
                .then(b.0.cmp(&a.0))
        })
        .cloned();

    let (vertex, removed_edges) = graph.remove_vertex(id)?;

    let mut added_edges = Vec::new();
    if let Some((hub_id, hub_edge)) = hub
        && let Some(hub_to_evicted) = hub_edge.measurement_from(hub_id)
    {
        for (neighbor, edge) in &incident {
            if *neighbor == hub_id {
                continue;
            }
            let Some(evicted_to_neighbor) = edge.measurement_from(id) else {
                continue;
            };
            let constraint = Constraint::new(
                edge.constraint.kind,
                hub_to_evicted.compose(&evicted_to_neighbor),
                hub_edge
                    .constraint
                    .information
                    .series(&edge.constraint.information),
            );
            let new_id = graph.add_edge(hub_id, *neighbor, constraint);
            if let Some(new_edge) = graph.edge(new_id) {
                added_edges.push(new_edge.clone());
            }
        }
    }

    log::debug!(
        "Evicted vertex {} ({} edges removed, {} transferred)",
        id,
        removed_edges.len(),
        added_edges.len()
    );

    Some(Eviction {
        vertex,
        removed_edges,
        added_edges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Pose2D;
    use crate::engine::graph::pose_graph::tests::new_vertex;
    use crate::engine::graph::{EdgeKind, Information2D};
    use approx::assert_relative_eq;

    fn constraint(kind: EdgeKind, m: Pose2D, info: f32) -> Constraint {
        Constraint::new(kind, m, Information2D::diagonal(info, info, info))
    }

    #[test]
    fn test_edges_move_to_strongest_neighbor() {
        let mut graph = PoseGraph::new();
        let a = graph.add_vertex(new_vertex(Pose2D::identity()));
        let b = graph.add_vertex(new_vertex(Pose2D::new(1.0, 0.0, 0.0)));
        let c = graph.add_vertex(new_vertex(Pose2D::new(2.0, 0.0, 0.0)));
        graph.add_edge(a, b, constraint(EdgeKind::Odometry, Pose2D::new(1.0, 0.0, 0.0), 10.0));
        graph.add_edge(b, c, constraint(EdgeKind::ScanMatch, Pose2D::new(1.0, 0.0, 0.0), 100.0));

        let eviction = evict_with_transfer(&mut graph, b).unwrap();

        assert_eq!(eviction.removed_edges.len(), 2);
        assert_eq!(eviction.added_edges.len(), 1);
        let moved = &eviction.added_edges[0];
        // c is the hub; the a-edge is re-read from c.
        assert_eq!((moved.from, moved.to), (c, a));
        assert_eq!(moved.constraint.kind, EdgeKind::Odometry);
        assert_relative_eq!(moved.constraint.measurement.x, -2.0, epsilon = 1e-5);
        assert!(moved.constraint.information.xx < 10.0);
        assert!(!graph.contains(b));
        assert_eq!(graph.num_edges(), 1);
    }

    #[test]
    fn test_isolated_vertex_evicted_without_transfer() {
        let mut graph = PoseGraph::new();
        let a = graph.add_vertex(new_vertex(Pose2D::identity()));
        let eviction = evict_with_transfer(&mut graph, a).unwrap();
        assert!(eviction.added_edges.is_empty());
        assert!(graph.is_empty());
        assert!(evict_with_transfer(&mut graph, a).is_none());
    }

    #[test]
    fn test_parallel_edges_to_hub_are_dropped() {
        let mut graph = PoseGraph::new();
        let a = graph.add_vertex(new_vertex(Pose2D::identity()));
        let b = graph.add_vertex(new_vertex(Pose2D::new(1.0, 0.0, 0.0)));
        graph.add_edge(a, b, constraint(EdgeKind::Odometry, Pose2D::new(1.0, 0.0, 0.0), 10.0));
        graph.add_edge(a, b, constraint(EdgeKind::ScanMatch, Pose2D::new(1.0, 0.0, 0.0), 50.0));

        let eviction = evict_with_transfer(&mut graph, b).unwrap();
        assert!(eviction.added_edges.is_empty());
        assert_eq!(graph.num_edges(), 0);
    }
}

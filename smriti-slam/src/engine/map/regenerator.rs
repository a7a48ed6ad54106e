use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::snapshot::Snapshot;
use crate::algorithms::mapping::{HitCountGrid, RayTracer};
use crate::core::types::{BoundingBox2D, LaserScan, Point2D, Pose2D};
use crate::engine::graph::PoseGraph;

/// Map regeneration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Meters per cell.
    pub resolution: f32,

    /// Hit ratio above which a cell is occupied.
    pub occupied_threshold: f32,

    /// Rays that must cross a cell before it is classified.
    pub min_pass_through: u32,

    /// Seconds between periodic rebuilds.
    pub update_interval_secs: f32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            resolution: 0.05,
            occupied_threshold: 0.1,
            min_pass_through: 2,
            update_interval_secs: 5.0,
        }
    }
}

impl MapConfig {
    /// Rebuild period.
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs_f32(self.update_interval_secs.max(0.01))
    }
}

/// Builds occupancy snapshots from the graph.
#[derive(Debug, Clone, Default)]
pub struct MapRegenerator {
    config: MapConfig,
    tracer: RayTracer,
}

/// What a rebuild needs from one vertex.
struct ScanView {
    sensor_pose: Pose2D,
    scan: Arc<LaserScan>,
}

impl MapRegenerator {
    /// Create a regenerator.
    pub fn new(config: MapConfig) -> Self {
        Self {
            config,
            tracer: RayTracer::default(),
        }
    }

    /// Settings in use.
    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Rebuild with the configured resolution and threshold.
    ///
    /// Returns `None` while the graph is empty.
    pub fn rebuild(&self, graph: &RwLock<PoseGraph>) -> Option<Snapshot> {
        self.rebuild_with(graph, self.config.resolution, self.config.occupied_threshold)
    }

    /// Rebuild with explicit resolution and occupied threshold.
    pub fn rebuild_with(
        &self,
        graph: &RwLock<PoseGraph>,
        resolution: f32,
        occupied_threshold: f32,
    ) -> Option<Snapshot> {
        // Scans are shared; copying them is a refcount bump per vertex.
        let (revision, views) = {
            let graph = graph.read();
            let views: Vec<ScanView> = graph
                .vertices()
                .map(|v| ScanView {
                    sensor_pose: v.sensor_pose(),
                    scan: Arc::clone(&v.scan),
                })
                .collect();
            (graph.revision(), views)
        };

        if views.is_empty() || resolution <= 0.0 {
            return None;
        }

        let bounds = Self::bounds(&views)?;
        let mut grid = HitCountGrid::covering(&bounds, resolution, 2.0 * resolution);

        for view in &views {
            self.rasterize(&mut grid, view);
        }

        let (origin_x, origin_y) = grid.origin();
        let snapshot = Snapshot {
            revision,
            vertex_count: views.len(),
            resolution,
            width: grid.width(),
            height: grid.height(),
            origin: Point2D::new(origin_x, origin_y),
            cells: grid.to_cells(self.config.min_pass_through, occupied_threshold),
        };
        log::debug!(
            "Rebuilt map from {} vertices: {}x{} cells at revision {}",
            snapshot.vertex_count,
            snapshot.width,
            snapshot.height,
            revision
        );
        Some(snapshot)
    }

    /// Extent of every sensor position and obstacle return.
    fn bounds(views: &[ScanView]) -> Option<BoundingBox2D> {
        let mut bounds: Option<BoundingBox2D> = None;
        for view in views {
            let origin = view.sensor_pose.position();
            let bb = bounds.get_or_insert_with(|| BoundingBox2D::from_point(origin));
            bb.expand_to_include(&origin);
            for (angle, range) in view.scan.iter_valid() {
                if !view.scan.is_hit(range) {
                    continue;
                }
                bb.expand_to_include(&endpoint(&view.sensor_pose, angle, range));
            }
        }
        bounds
    }

    fn rasterize(&self, grid: &mut HitCountGrid, view: &ScanView) {
        let origin = view.sensor_pose.position();
        let scan = &view.scan;
        for (angle, range) in scan.iter_valid() {
            let hit = scan.is_hit(range);
            let end = endpoint(&view.sensor_pose, angle, range.min(scan.range_max));
            self.tracer.trace_ray(grid, origin.x, origin.y, end.x, end.y, hit);
        }
    }
}

/// World position of a sensor-frame polar reading.
fn endpoint(sensor: &Pose2D, angle: f32, range: f32) -> Point2D {
    let (sin_a, cos_a) = angle.sin_cos();
    sensor.transform_point(&Point2D::new(range * cos_a, range * sin_a))
}

//! Ingestion Thread - the single writer of the pose graph.
//!
//! This thread:
//! - Dequeues admitted scans and runs them through the pose-graph manager
//!   (insert, optimize, lifelong pass)
//! - Handles operator commands between scans (non-blocking `try_recv`)
//!
//! The queue is polled with a timeout so commands are answered while no
//! scans arrive or while ingestion is paused. Queue shutdown ends the loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::PersistenceConfig;
use crate::core::types::PosedScan;
use crate::engine::graph::{AddScanRejection, PoseGraphManager};
use crate::engine::map::{MapRegenerator, Snapshot};
use crate::error::SlamError;
use crate::ingestion::ScanQueue;
use crate::io::{PersistenceError, load_graph, save_graph, save_map};
use crate::state::{
    CommandReceiver, CommandResponse, CommandResult, LatestMap, SlamCommand, SystemStats,
};

/// Owns everything the ingestion role mutates.
pub struct IngestionWorker {
    manager: PoseGraphManager,
    queue: Arc<ScanQueue>,
    latest_map: Arc<LatestMap>,
    regenerator: MapRegenerator,
    persistence: PersistenceConfig,
}

impl IngestionWorker {
    pub fn new(
        manager: PoseGraphManager,
        queue: Arc<ScanQueue>,
        latest_map: Arc<LatestMap>,
        regenerator: MapRegenerator,
        persistence: PersistenceConfig,
    ) -> Self {
        Self {
            manager,
            queue,
            latest_map,
            regenerator,
            persistence,
        }
    }

    /// The wrapped manager.
    pub fn manager(&self) -> &PoseGraphManager {
        &self.manager
    }

    /// Run one dequeued scan through the manager.
    ///
    /// Rejections and solver failures are logged and never stop ingestion.
    pub fn process(&mut self, posed: &PosedScan) {
        match self.manager.process_scan(posed) {
            Ok(outcome) => {
                log::debug!(
                    "Vertex {} added ({} scan matches)",
                    outcome.vertex,
                    outcome.scan_matches
                );
            }
            Err(AddScanRejection::DuplicatePose) => {
                log::debug!("Scan at {} us duplicates the last pose", posed.scan.timestamp_us);
            }
            // Unknown lasers are warned about once by the registry.
            Err(rejection) => log::debug!("Scan rejected: {}", rejection),
        }
    }

    /// Answer every pending command.
    pub fn process_commands(&mut self, command_rx: &CommandReceiver) {
        while let Ok(cmd_with_response) = command_rx.try_recv() {
            let result = self.handle_command(&cmd_with_response.command);
            // The caller may have timed out already.
            cmd_with_response.response_tx.send(result).ok();
        }
    }

    /// Handle a single command.
    pub fn handle_command(&mut self, cmd: &SlamCommand) -> CommandResult {
        let result = self.execute(cmd);
        if let Err(e) = &result {
            log::warn!("Command {:?} failed: {}", cmd, e);
        }
        result.map_err(|e| e.to_string())
    }

    fn execute(&mut self, cmd: &SlamCommand) -> Result<CommandResponse, SlamError> {
        match cmd {
            SlamCommand::Pause => {
                self.queue.pause();
                Ok(CommandResponse::Paused)
            }

            SlamCommand::Resume => {
                self.queue.resume();
                Ok(CommandResponse::Resumed)
            }

            SlamCommand::ClearQueue => Ok(CommandResponse::QueueCleared {
                discarded: self.queue.clear_queue(),
            }),

            SlamCommand::ClearGraph => {
                self.manager.clear_graph();
                self.latest_map.clear();
                Ok(CommandResponse::GraphCleared)
            }

            SlamCommand::ManualLoopClosure { a, b } => {
                let edge = self.manager.add_manual_loop_closure(*a, *b)?;
                Ok(CommandResponse::LoopClosureAdded { edge })
            }

            SlamCommand::RelocateVertex {
                id,
                pose,
                reoptimize,
            } => {
                self.manager.relocate_vertex(*id, *pose, *reoptimize)?;
                Ok(CommandResponse::VertexRelocated)
            }

            SlamCommand::Correction { id, pose } => {
                let staged = self.manager.is_interactive();
                self.manager.handle_correction(*id, *pose)?;
                Ok(CommandResponse::CorrectionHandled { staged })
            }

            SlamCommand::ToggleInteractive => {
                let (enabled, applied) = self.manager.toggle_interactive()?;
                Ok(CommandResponse::InteractiveToggled { enabled, applied })
            }

            SlamCommand::ClearChanges => Ok(CommandResponse::ChangesCleared {
                discarded: self.manager.clear_changes(),
            }),

            SlamCommand::SaveMap { path } => {
                let (dir, name) = self.map_target(path.as_deref())?;
                let snapshot = self.current_map()?;
                let path = save_map(&dir, &name, &snapshot)?;
                Ok(CommandResponse::MapSaved { path })
            }

            SlamCommand::SerializePoseGraph { path } => {
                let graph = self.manager.graph();
                let graph = graph.read();
                save_graph(path, &graph)?;
                log::info!(
                    "Pose graph saved to {} ({} vertices)",
                    path.display(),
                    graph.num_vertices()
                );
                Ok(CommandResponse::PoseGraphSerialized {
                    path: path.clone(),
                    vertices: graph.num_vertices(),
                })
            }

            SlamCommand::DeserializePoseGraph { path, mode } => {
                let restored = load_graph(path)?;
                self.manager.restore(restored, *mode)?;
                self.latest_map.clear();
                Ok(CommandResponse::PoseGraphDeserialized {
                    vertices: self.manager.stats().vertices,
                })
            }

            SlamCommand::Stats => Ok(CommandResponse::Stats(self.stats())),
        }
    }

    /// Counters for the operator surface.
    pub fn stats(&self) -> SystemStats {
        SystemStats {
            graph: self.manager.stats(),
            queue: self.queue.stats(),
            paused: self.queue.is_paused(),
            map_revision: self.latest_map.revision(),
        }
    }

    /// The published map, or a fresh rebuild when none is current.
    fn current_map(&self) -> Result<Arc<Snapshot>, SlamError> {
        let graph = self.manager.graph();
        let revision = graph.read().revision();
        if let Some(map) = self.latest_map.get()
            && map.revision == revision
        {
            return Ok(map);
        }
        self.regenerator
            .rebuild(&graph)
            .map(Arc::new)
            .ok_or_else(|| PersistenceError::NoMap.into())
    }

    /// Split a requested map path into directory and base name.
    fn map_target(&self, path: Option<&Path>) -> Result<(PathBuf, String), SlamError> {
        let Some(path) = path else {
            return Ok((
                self.persistence.output_dir.clone(),
                self.persistence.map_name.clone(),
            ));
        };
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| SlamError::InvalidCommand(format!("bad map path {}", path.display())))?;
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok((dir, name.to_string()))
    }

    /// Save the graph and the map into the configured output directory.
    pub fn save_on_exit(&mut self) {
        if self.manager.graph().read().is_empty() {
            log::info!("Pose graph empty, nothing to save");
            return;
        }
        let graph_path = self.persistence.graph_path();
        for cmd in [
            SlamCommand::SerializePoseGraph { path: graph_path },
            SlamCommand::SaveMap { path: None },
        ] {
            if let Ok(response) = self.handle_command(&cmd) {
                log::info!("{:?}", response);
            }
        }
    }
}

/// Ingestion thread handle.
pub struct IngestionThread {
    handle: JoinHandle<IngestionWorker>,
}

impl IngestionThread {
    /// Spawn the ingestion thread.
    ///
    /// The worker is handed back by [`join`](Self::join).
    pub fn spawn(
        worker: IngestionWorker,
        command_rx: CommandReceiver,
        running: Arc<AtomicBool>,
        poll: Duration,
    ) -> std::io::Result<Self> {
        let handle = thread::Builder::new()
            .name("ingestion".into())
            .spawn(move || run_ingestion_loop(worker, command_rx, running, poll))?;
        Ok(Self { handle })
    }

    /// Wait for the thread to finish.
    pub fn join(self) -> thread::Result<IngestionWorker> {
        self.handle.join()
    }
}

fn run_ingestion_loop(
    mut worker: IngestionWorker,
    command_rx: CommandReceiver,
    running: Arc<AtomicBool>,
    poll: Duration,
) -> IngestionWorker {
    log::info!("Ingestion thread starting");
    let queue = Arc::clone(&worker.queue);

    while running.load(Ordering::Relaxed) {
        worker.process_commands(&command_rx);

        match queue.dequeue_timeout(poll) {
            Some(posed) => worker.process(&posed),
            None if queue.is_shutdown() => break,
            None => {}
        }
    }

    // Answer anything sent before shutdown was observed.
    worker.process_commands(&command_rx);
    log::info!("Ingestion thread stopped ({} vertices)", worker.manager.stats().vertices);
    worker
}

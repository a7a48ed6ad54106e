//! The running SLAM pipeline: queue, ingestion thread and map publisher.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::SmritiConfig;
use crate::engine::graph::{DeserializeMode, PoseGraphManager, SharedGraph};
use crate::engine::map::{MapRegenerator, MapSink};
use crate::error::{Result, SlamError};
use crate::ingestion::{ScanQueue, SensorFrontend, TransformProvider};
use crate::io::load_graph;
use crate::state::{
    CommandResponse, CommandResult, CommandSender, LatestMap, SlamCommand, create_command_channel,
    send_command_sync,
};
use crate::threads::{IngestionThread, IngestionWorker, MapPublisherThread};

/// How long the ingestion thread waits on an empty queue before checking
/// for commands again.
const INGESTION_POLL: Duration = Duration::from_millis(20);

/// Default command timeout. Commands queue behind the scan in progress,
/// which includes a full optimization.
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 10_000;

/// Handle to a running pipeline.
///
/// Sensor callbacks submit scans through [`frontend`](Self::frontend);
/// operators use [`execute`](Self::execute). Call
/// [`shutdown`](Self::shutdown) to stop the threads.
pub struct SlamSystem {
    frontend: SensorFrontend,
    queue: Arc<ScanQueue>,
    graph: SharedGraph,
    latest_map: Arc<LatestMap>,
    command_tx: CommandSender,
    command_timeout_ms: u64,
    running: Arc<AtomicBool>,
    ingestion: IngestionThread,
    publisher: MapPublisherThread,
}

impl SlamSystem {
    /// Validate the configuration and start the threads.
    ///
    /// A configured pose graph file is restored before ingestion starts.
    /// `sinks` receive every published map in addition to the built-in
    /// latest-map handle.
    pub fn spawn(
        config: SmritiConfig,
        transforms: Arc<dyn TransformProvider>,
        sinks: Vec<Arc<dyn MapSink>>,
    ) -> Result<Self> {
        config.validate()?;

        let mut manager = PoseGraphManager::new(
            config.graph.clone(),
            &config.solver,
            &config.lifelong,
            config.lasers.clone(),
        )?;
        if let Some(path) = &config.persistence.pose_graph_file {
            let restored = load_graph(path)?;
            manager.restore(restored, DeserializeMode::StartAtFirstNode)?;
            log::info!("Restored pose graph from {}", path.display());
        }
        let graph = manager.graph();

        let queue = Arc::new(ScanQueue::new(config.ingestion.clone()));
        let frontend = SensorFrontend::new(
            Arc::clone(&queue),
            transforms,
            config.frames.base_frame.clone(),
            config.frames.odom_frame.clone(),
        );
        let latest_map = Arc::new(LatestMap::new());
        let running = Arc::new(AtomicBool::new(true));
        let (command_tx, command_rx) = create_command_channel();

        let worker = IngestionWorker::new(
            manager,
            Arc::clone(&queue),
            Arc::clone(&latest_map),
            MapRegenerator::new(config.map.clone()),
            config.persistence.clone(),
        );
        let ingestion =
            IngestionThread::spawn(worker, command_rx, Arc::clone(&running), INGESTION_POLL)?;

        let mut all_sinks: Vec<Arc<dyn MapSink>> = vec![latest_map.clone()];
        all_sinks.extend(sinks);
        let publisher = match MapPublisherThread::spawn(
            MapRegenerator::new(config.map.clone()),
            Arc::clone(&graph),
            all_sinks,
            Arc::clone(&running),
        ) {
            Ok(publisher) => publisher,
            Err(e) => {
                running.store(false, Ordering::Relaxed);
                queue.shutdown();
                ingestion.join().ok();
                return Err(e.into());
            }
        };

        log::info!("SLAM pipeline started");
        Ok(Self {
            frontend,
            queue,
            graph,
            latest_map,
            command_tx,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            running,
            ingestion,
            publisher,
        })
    }

    /// Entry point for sensor callbacks.
    pub fn frontend(&self) -> &SensorFrontend {
        &self.frontend
    }

    /// The admission queue.
    pub fn queue(&self) -> &Arc<ScanQueue> {
        &self.queue
    }

    /// Read access to the pose graph.
    pub fn graph(&self) -> SharedGraph {
        Arc::clone(&self.graph)
    }

    /// Latest published map.
    pub fn latest_map(&self) -> &Arc<LatestMap> {
        &self.latest_map
    }

    /// Change how long [`execute`](Self::execute) waits for a response.
    pub fn set_command_timeout(&mut self, timeout_ms: u64) {
        self.command_timeout_ms = timeout_ms;
    }

    /// Run an operator command.
    ///
    /// Pause, resume and clear-queue act on the queue directly and return
    /// immediately. Everything else is handled by the ingestion thread.
    pub fn execute(&self, command: SlamCommand) -> CommandResult {
        match command {
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
            command => send_command_sync(&self.command_tx, command, self.command_timeout_ms),
        }
    }

    /// Stop both threads and hand back the ingestion worker.
    ///
    /// Pending scans are not processed. Returns an error if a thread
    /// panicked.
    pub fn shutdown(self) -> Result<IngestionWorker> {
        log::info!("Shutting down SLAM pipeline");
        self.running.store(false, Ordering::Relaxed);
        self.queue.shutdown();

        let publisher = self.publisher.join();
        let worker = self.ingestion.join();
        if publisher.is_err() {
            log::error!("Map publisher thread panicked");
        }
        worker.map_err(|_| SlamError::ThreadPanicked("ingestion"))
    }
}

//! Operator commands for the ingestion thread.
//!
//! Commands travel over a crossbeam channel; each carries its own response
//! channel. Pause, resume and clear-queue are also handled directly by
//! [`SlamSystem::execute`](crate::SlamSystem::execute) so they never wait
//! behind a running optimization.

use std::path::PathBuf;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use serde::{Deserialize, Serialize};

use crate::core::types::Pose2D;
use crate::engine::graph::{DeserializeMode, EdgeId, GraphStats, VertexId};
use crate::ingestion::QueueStats;

/// Commands handled by the ingestion thread.
#[derive(Debug, Clone)]
pub enum SlamCommand {
    /// Close the admission gate.
    Pause,

    /// Reopen the admission gate.
    Resume,

    /// Discard pending scans.
    ClearQueue,

    /// Reset the pose graph.
    ClearGraph,

    /// Add a loop closure between two vertices.
    ManualLoopClosure {
        a: VertexId,
        b: VertexId,
    },

    /// Move a vertex and pin it there.
    RelocateVertex {
        id: VertexId,
        pose: Pose2D,
        reoptimize: bool,
    },

    /// Relocation event from the interactive-correction source; staged
    /// while interactive mode is on.
    Correction {
        id: VertexId,
        pose: Pose2D,
    },

    /// Flip interactive mode.
    ToggleInteractive,

    /// Discard staged interactive moves.
    ClearChanges,

    /// Write the latest map as PGM + YAML.
    SaveMap {
        /// Directory and base name; `None` uses the configured ones.
        path: Option<PathBuf>,
    },

    /// Write the pose graph.
    SerializePoseGraph { path: PathBuf },

    /// Replace the pose graph with one read from disk.
    DeserializePoseGraph { path: PathBuf, mode: DeserializeMode },

    /// Report counters.
    Stats,
}

/// Counters reported by [`SlamCommand::Stats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub graph: GraphStats,
    pub queue: QueueStats,
    pub paused: bool,
    pub map_revision: Option<u64>,
}

/// Result of a command execution.
pub type CommandResult = Result<CommandResponse, String>;

/// Response data from command execution.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResponse {
    Paused,
    Resumed,
    QueueCleared { discarded: usize },
    GraphCleared,
    LoopClosureAdded { edge: EdgeId },
    VertexRelocated,
    CorrectionHandled { staged: bool },
    InteractiveToggled { enabled: bool, applied: usize },
    ChangesCleared { discarded: usize },
    MapSaved { path: PathBuf },
    PoseGraphSerialized { path: PathBuf, vertices: usize },
    PoseGraphDeserialized { vertices: usize },
    Stats(SystemStats),
}

/// Command with response channel for acknowledgment.
pub struct CommandWithResponse {
    /// The command to execute.
    pub command: SlamCommand,
    /// Channel to send the response back.
    pub response_tx: Sender<CommandResult>,
}

impl std::fmt::Debug for CommandWithResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandWithResponse")
            .field("command", &self.command)
            .field("response_tx", &"...")
            .finish()
    }
}

/// Sender end of the command channel.
pub type CommandSender = Sender<CommandWithResponse>;

/// Receiver end of the command channel (held by the ingestion thread).
pub type CommandReceiver = Receiver<CommandWithResponse>;

/// Create a new command channel pair.
pub fn create_command_channel() -> (CommandSender, CommandReceiver) {
    unbounded()
}

/// Send a command and wait for its response.
pub fn send_command_sync(
    sender: &CommandSender,
    command: SlamCommand,
    timeout_ms: u64,
) -> CommandResult {
    let (response_tx, response_rx) = bounded(1);

    sender
        .send(CommandWithResponse {
            command,
            response_tx,
        })
        .map_err(|_| "ingestion thread not running (channel closed)".to_string())?;

    response_rx
        .recv_timeout(Duration::from_millis(timeout_ms))
        .map_err(|e| match e {
            RecvTimeoutError::Timeout => "command timeout".to_string(),
            RecvTimeoutError::Disconnected => "ingestion thread disconnected".to_string(),
        })?
}

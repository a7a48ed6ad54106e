//! State shared between the ingestion thread, the map publisher and the
//! operator surface.
//!
//! - `SlamCommand`: operator commands sent to the ingestion thread
//! - `LatestMap`: the most recently published map snapshot

mod commands;
mod latest_map;

pub use commands::{
    CommandReceiver, CommandResponse, CommandResult, CommandSender, CommandWithResponse,
    SlamCommand, SystemStats, create_command_channel, send_command_sync,
};
pub use latest_map::LatestMap;

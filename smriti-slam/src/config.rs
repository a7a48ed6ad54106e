//! Daemon configuration.
//!
//! Loaded from TOML; every section is optional and falls back to its
//! defaults.
//!
//! ```toml
//! [ingestion]
//! minimum_travel_distance = 0.3
//!
//! [graph]
//! solver = "gauss_newton"
//!
//! [[lasers]]
//! frame_id = "laser"
//! range_max = 8.0
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::graph::{LaserGeometry, PoseGraphConfig, SolverSettings, is_registered};
use crate::engine::lifelong::LifelongConfig;
use crate::engine::map::MapConfig;
use crate::error::SlamError;
use crate::ingestion::AdmissionConfig;

/// Errors loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<ConfigError> for SlamError {
    fn from(e: ConfigError) -> Self {
        SlamError::ConfigurationFatal(e.to_string())
    }
}

/// Frame names used for pose lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Robot body frame.
    pub base_frame: String,
    /// Odometry frame poses are looked up in.
    pub odom_frame: String,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            base_frame: "base_link".to_string(),
            odom_frame: "odom".to_string(),
        }
    }
}

/// Where maps and pose graphs are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Output directory for saved maps and graphs.
    pub output_dir: PathBuf,
    /// Base name for saved maps (`{map_name}.pgm`, `{map_name}.yaml`).
    pub map_name: String,
    /// Pose graph to restore at startup.
    pub pose_graph_file: Option<PathBuf>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("maps"),
            map_name: "map".to_string(),
            pose_graph_file: None,
        }
    }
}

impl PersistenceConfig {
    /// Path the pose graph is saved to on shutdown.
    pub fn graph_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.graph", self.map_name))
    }
}

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SmritiConfig {
    pub ingestion: AdmissionConfig,
    pub graph: PoseGraphConfig,
    pub solver: SolverSettings,
    pub lifelong: LifelongConfig,
    pub map: MapConfig,
    pub persistence: PersistenceConfig,
    pub frames: FrameConfig,
    /// Calibrated range sensors. Scans from other frames are rejected.
    pub lasers: Vec<LaserGeometry>,
}

impl SmritiConfig {
    /// Parse a TOML document and validate it.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: SmritiConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if !is_registered(&self.graph.solver) {
            return invalid(format!("unknown solver '{}'", self.graph.solver));
        }

        let ingestion = &self.ingestion;
        if ingestion.minimum_time_interval < 0.0
            || ingestion.minimum_travel_distance < 0.0
            || ingestion.minimum_travel_heading < 0.0
        {
            return invalid("admission thresholds must be non-negative".to_string());
        }
        if ingestion.throttle_scans == 0 {
            return invalid("throttle_scans must be at least 1".to_string());
        }

        if self.graph.scan_match_radius <= 0.0 {
            return invalid("scan_match_radius must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.graph.min_match_score) {
            return invalid("min_match_score must lie in [0, 1]".to_string());
        }

        if !(0.0..=1.0).contains(&self.lifelong.retention_threshold) {
            return invalid("retention_threshold must lie in [0, 1]".to_string());
        }

        if self.map.resolution <= 0.0 {
            return invalid("map resolution must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.map.occupied_threshold) {
            return invalid("occupied_threshold must lie in [0, 1]".to_string());
        }
        if self.map.update_interval_secs <= 0.0 {
            return invalid("map update interval must be positive".to_string());
        }

        if let Some(laser) = self.lasers.iter().find(|l| !l.is_calibrated()) {
            return invalid(format!("laser '{}' is not calibrated", laser.frame_id));
        }

        Ok(())
    }
}

/// Load and validate a configuration file.
pub fn load_config(path: &Path) -> Result<SmritiConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let config = SmritiConfig::from_toml(&contents)?;
    log::info!("Loaded config from {}", path.display());
    Ok(config)
}

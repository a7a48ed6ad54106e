//! Map export in ROS map_server format.
//!
//! A map is written as two files:
//! - `{name}.pgm` - binary PGM (P5), 255 free, 0 occupied, 205 unknown
//! - `{name}.yaml` - metadata (image, resolution, origin, thresholds)

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::persistence::PersistenceError;
use crate::engine::map::Snapshot;

/// map_server thresholds. The grid is already classified, so these only
/// tell readers how to re-threshold the image.
const OCCUPIED_THRESH: f32 = 0.65;
const FREE_THRESH: f32 = 0.196;

/// Map metadata in ROS-standard YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapInfo {
    /// PGM image filename (relative to the YAML file).
    pub image: String,

    /// Meters per pixel.
    pub resolution: f32,

    /// World pose of the lower-left pixel [x, y, yaw].
    pub origin: [f32; 3],

    /// Pixels darker than this are occupied.
    pub occupied_thresh: f32,

    /// Pixels lighter than this are free.
    pub free_thresh: f32,

    /// Whether white means occupied.
    pub negate: u8,

    /// Map width in cells.
    pub width: usize,

    /// Map height in cells.
    pub height: usize,

    /// Graph revision the map was built from.
    pub revision: u64,
}

impl MapInfo {
    fn for_snapshot(image: String, snapshot: &Snapshot) -> Self {
        Self {
            image,
            resolution: snapshot.resolution,
            origin: [snapshot.origin.x, snapshot.origin.y, 0.0],
            occupied_thresh: OCCUPIED_THRESH,
            free_thresh: FREE_THRESH,
            negate: 0,
            width: snapshot.width,
            height: snapshot.height,
            revision: snapshot.revision,
        }
    }
}

/// Write `{dir}/{name}.pgm` and `{dir}/{name}.yaml`.
///
/// Returns the YAML path.
pub fn save_map(dir: &Path, name: &str, snapshot: &Snapshot) -> Result<PathBuf, PersistenceError> {
    fs::create_dir_all(dir)?;
    let image = format!("{}.pgm", name);
    let pgm_path = dir.join(&image);
    let yaml_path = dir.join(format!("{}.yaml", name));

    write_pgm(&pgm_path, snapshot)?;

    let info = MapInfo::for_snapshot(image, snapshot);
    let mut writer = BufWriter::new(File::create(&yaml_path)?);
    writeln!(writer, "# Map saved by SmritiSLAM")?;
    serde_yaml::to_writer(&mut writer, &info)?;
    writer.flush()?;

    log::info!(
        "Saved {}x{} map to {}",
        snapshot.width,
        snapshot.height,
        yaml_path.display()
    );
    Ok(yaml_path)
}

/// Write the cells as a binary PGM, flipping rows so north is up.
fn write_pgm(path: &Path, snapshot: &Snapshot) -> Result<(), PersistenceError> {
    let mut pixels = Vec::with_capacity(snapshot.width * snapshot.height);
    for cy in (0..snapshot.height).rev() {
        for cx in 0..snapshot.width {
            pixels.push(match snapshot.cell(cx, cy) {
                Some(0) => 255u8,
                Some(100) => 0u8,
                _ => 205u8,
            });
        }
    }

    let mut file = BufWriter::new(File::create(path)?);
    writeln!(file, "P5")?;
    writeln!(file, "{} {}", snapshot.width, snapshot.height)?;
    writeln!(file, "255")?;
    file.write_all(&pixels)?;
    file.flush()?;
    Ok(())
}

/// Read the metadata of a saved map.
pub fn load_map_info(yaml_path: &Path) -> Result<MapInfo, PersistenceError> {
    let content = fs::read_to_string(yaml_path)?;
    Ok(serde_yaml::from_str(&content)?)
}

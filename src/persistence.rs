//! Reading and writing the calibration point file and its last-access timestamp.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use log::debug;

use crate::error::PersistenceError;
use crate::point::AlignmentPointCollection;

/// File name of the last-access timestamp, stored next to the points file.
pub const TIMESTAMP_FILE_NAME: &str = "alignment_last_access.json";

/// Points untouched for longer than this are considered stale on startup.
pub const STALE_AFTER: TimeDelta = TimeDelta::hours(1);

/// Minimum interval between two timestamp writes.
pub const TIMESTAMP_THROTTLE: TimeDelta = TimeDelta::minutes(1);

fn create_parent(path: &Path) -> Result<(), PersistenceError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            fs::create_dir_all(dir).map_err(|e| PersistenceError::io(dir, e))
        }
        _ => Ok(()),
    }
}

/// Rewrite `path` with the whole collection as pretty-printed JSON.
pub fn save_points(path: &Path, points: &AlignmentPointCollection) -> Result<(), PersistenceError> {
    create_parent(path)?;
    let text = serde_json::to_string_pretty(points).map_err(|e| PersistenceError::json(path, e))?;
    fs::write(path, text).map_err(|e| PersistenceError::io(path, e))?;
    debug!("Saved {} alignment points to {}.", points.len(), path.display());
    Ok(())
}

/// Read a collection written by [`save_points`].
pub fn load_points(path: &Path) -> Result<AlignmentPointCollection, PersistenceError> {
    let text = fs::read_to_string(path).map_err(|e| PersistenceError::io(path, e))?;
    let points: AlignmentPointCollection =
        serde_json::from_str(&text).map_err(|e| PersistenceError::json(path, e))?;
    debug!("Loaded {} alignment points from {}.", points.len(), path.display());
    Ok(points)
}

/// Like [`load_points`], but a missing file is an empty collection.
pub fn load_points_or_default(path: &Path) -> Result<AlignmentPointCollection, PersistenceError> {
    match fs::metadata(path) {
        Ok(_) => load_points(path),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(AlignmentPointCollection::new()),
        Err(e) => Err(PersistenceError::io(path, e)),
    }
}

/// Whether the stored points should be discarded when the model starts.
pub fn is_stale(
    clear_points_on_startup: bool,
    last_access: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    clear_points_on_startup && last_access.is_none_or(|t| now - t > STALE_AFTER)
}

/// Last time the points were used, kept in a small JSON file.
#[derive(Clone, Debug)]
pub struct AccessTimestamp {
    path: PathBuf,
    last_written: Option<DateTime<Utc>>,
}

impl AccessTimestamp {
    /// Timestamp file next to `points_path`.
    pub fn beside(points_path: &Path) -> Self {
        Self {
            path: points_path.with_file_name(TIMESTAMP_FILE_NAME),
            last_written: None,
        }
    }

    /// Location of the timestamp file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored timestamp, `None` if the file is missing or unreadable.
    pub fn read(&self) -> Option<DateTime<Utc>> {
        let text = fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&text).ok()
    }

    /// Store `now` unconditionally.
    pub fn write(&mut self, now: DateTime<Utc>) -> Result<(), PersistenceError> {
        create_parent(&self.path)?;
        let text = serde_json::to_string(&now).map_err(|e| PersistenceError::json(&self.path, e))?;
        fs::write(&self.path, text).map_err(|e| PersistenceError::io(&self.path, e))?;
        self.last_written = Some(now);
        Ok(())
    }

    /// Store `now` unless the last write was less than a minute ago. Returns whether it wrote.
    pub fn touch(&mut self, now: DateTime<Utc>) -> Result<bool, PersistenceError> {
        if self
            .last_written
            .is_some_and(|t| now - t < TIMESTAMP_THROTTLE)
        {
            return Ok(false);
        }
        self.write(now)?;
        Ok(true)
    }
}

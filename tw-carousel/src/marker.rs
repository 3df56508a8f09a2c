//! Persisted "last full fetch" marker
//!
//! Records when a background sweep last reached the end of the history so a
//! freshly constructed carousel can skip the sweep for a while.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CarouselError, Result};

pub const MARKER_FILE_NAME: &str = "last_full_fetch.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchMarker {
    /// Unix milliseconds
    pub completed_at: i64,
}

impl FetchMarker {
    pub fn at(time: DateTime<Utc>) -> Self {
        Self {
            completed_at: time.timestamp_millis(),
        }
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.completed_at).single()
    }

    /// Younger than `validity`; markers from the future are not trusted
    pub fn is_fresh(&self, now: DateTime<Utc>, validity: Duration) -> bool {
        let age_ms = now.timestamp_millis() - self.completed_at;
        age_ms >= 0 && (age_ms as u128) < validity.as_millis()
    }
}

pub trait MarkerStore: Send + Sync {
    fn load(&self) -> Result<Option<FetchMarker>>;
    fn save(&self, marker: &FetchMarker) -> Result<()>;
}

/// Marker kept as a small JSON file
#[derive(Debug, Clone)]
pub struct JsonMarkerStore {
    path: PathBuf,
}

impl JsonMarkerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<cache dir>/trackwall/last_full_fetch.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("trackwall").join(MARKER_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MarkerStore for JsonMarkerStore {
    fn load(&self) -> Result<Option<FetchMarker>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| CarouselError::Decode(format!("{}: {}", self.path.display(), e)))
    }

    fn save(&self, marker: &FetchMarker) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(marker).map_err(|e| CarouselError::Decode(e.to_string()))?;
        std::fs::write(&self.path, json)?;
        debug!(path = %self.path.display(), "Wrote fetch marker");
        Ok(())
    }
}

/// Marker held in memory only
#[derive(Debug, Default)]
pub struct MemoryMarkerStore {
    marker: Mutex<Option<FetchMarker>>,
}

impl MemoryMarkerStore {
    pub fn new(marker: Option<FetchMarker>) -> Self {
        Self {
            marker: Mutex::new(marker),
        }
    }
}

impl MarkerStore for MemoryMarkerStore {
    fn load(&self) -> Result<Option<FetchMarker>> {
        Ok(*self.marker.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn save(&self, marker: &FetchMarker) -> Result<()> {
        *self.marker.lock().unwrap_or_else(|e| e.into_inner()) = Some(*marker);
        Ok(())
    }
}

//! Rollback Watermark Store
//!
//! Durable record of the newest signing time seen per catalogue kind.
//! The contract with [`crate::verify`]: read the watermark before
//! verifying (it becomes `min_sign_time`) and commit only after the
//! signature checked out, keeping the stored value monotonic across
//! process restarts.

use crate::catalogue::DocumentKind;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A file-backed map from document kind to last verified signing time.
#[derive(Debug)]
pub struct WatermarkStore {
    path: PathBuf,
    seen: HashMap<String, u64>,
}

impl WatermarkStore {
    /// Open the store at `path`, starting empty if the file does not
    /// exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, WatermarkError> {
        let path = path.into();
        let seen = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, seen })
    }

    /// The minimum acceptable signing time for documents of `kind`.
    pub fn min_sign_time(&self, kind: DocumentKind) -> u64 {
        self.seen.get(kind.file_name()).copied().unwrap_or(0)
    }

    /// Record a successful verification at `sign_time`. The stored
    /// watermark never moves backwards.
    pub fn commit(&mut self, kind: DocumentKind, sign_time: u64) -> Result<(), WatermarkError> {
        let entry = self.seen.entry(kind.file_name().to_string()).or_insert(0);
        if sign_time <= *entry {
            return Ok(());
        }
        *entry = sign_time;
        debug!("watermark for {kind} advanced to {sign_time}");

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(&self.seen)?)?;
        Ok(())
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Watermark persistence failures.
#[derive(Debug, thiserror::Error)]
pub enum WatermarkError {
    #[error("failed to read or write watermark file: {0}")]
    Io(#[from] std::io::Error),

    #[error("watermark file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

//! Parking status persistence.
//!
//! The current double-parking flag is overwritten after every frame as a
//! one-key JSON document: `{"dpark":<bool>}`. Last writer wins; there is no
//! history and no locking against external readers.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// The status flag as it appears on the wire.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParkingStatus {
    pub dpark: bool,
}

/// Persistence seam for the per-frame status flag.
pub trait StatusStore: Send {
    fn write_status(&self, status: &ParkingStatus) -> Result<()>;
}

/// Writes the flag to a well-known file path, overwriting each frame.
pub struct FileStatusStore {
    path: PathBuf,
}

impl FileStatusStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StatusStore for FileStatusStore {
    fn write_status(&self, status: &ParkingStatus) -> Result<()> {
        let json = serde_json::to_string(status)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("write status file {}", self.path.display()))?;
        Ok(())
    }
}

/// In-memory store recording the last written status, for tests.
#[derive(Default)]
pub struct InMemoryStatusStore {
    last: Mutex<Option<ParkingStatus>>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<ParkingStatus> {
        self.last.lock().ok().and_then(|guard| *guard)
    }
}

impl StatusStore for InMemoryStatusStore {
    fn write_status(&self, status: &ParkingStatus) -> Result<()> {
        let mut guard = self
            .last
            .lock()
            .map_err(|_| anyhow!("status store lock poisoned"))?;
        *guard = Some(*status);
        Ok(())
    }
}

impl<S: StatusStore + Sync + ?Sized> StatusStore for std::sync::Arc<S> {
    fn write_status(&self, status: &ParkingStatus) -> Result<()> {
        (**self).write_status(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_form_has_one_key() {
        let json = serde_json::to_string(&ParkingStatus { dpark: true }).unwrap();
        assert_eq!(json, r#"{"dpark":true}"#);

        let parsed: ParkingStatus = serde_json::from_str(r#"{"dpark": false}"#).unwrap();
        assert!(!parsed.dpark);
    }

    #[test]
    fn file_store_overwrites_last_writer_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let store = FileStatusStore::new(&path);

        store.write_status(&ParkingStatus { dpark: true }).unwrap();
        store.write_status(&ParkingStatus { dpark: false }).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: ParkingStatus = serde_json::from_str(&raw).unwrap();
        assert!(!parsed.dpark);
    }

    #[test]
    fn in_memory_store_records_last() {
        let store = InMemoryStatusStore::new();
        assert_eq!(store.last(), None);
        store.write_status(&ParkingStatus { dpark: true }).unwrap();
        assert_eq!(store.last(), Some(ParkingStatus { dpark: true }));
    }
}

//! Checkpoint file: `{"last_processed_id": <id>}`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

#[derive(Debug, Serialize, Deserialize)]
struct Checkpoint {
    last_processed_id: u64,
}

/// Persists the id of the last message whose whole batch was exported.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    path: PathBuf,
}

impl ProgressTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The saved checkpoint, or `None` when there is nothing usable to
    /// resume from (missing, unreadable, malformed, or zero).
    pub fn load(&self) -> Option<u64> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no progress file");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "progress file unreadable, starting from the beginning");
                return None;
            }
        };

        match serde_json::from_str::<Checkpoint>(&raw) {
            Ok(cp) if cp.last_processed_id > 0 => Some(cp.last_processed_id),
            Ok(_) => None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "progress file malformed, starting from the beginning");
                None
            }
        }
    }

    /// Overwrite the checkpoint with `id`.
    ///
    /// Writes a sibling temp file and renames it over the old one, so a crash
    /// mid-write leaves the previous checkpoint intact.
    pub fn save(&self, id: u64) -> Result<()> {
        let json = serde_json::to_string(&Checkpoint {
            last_processed_id: id,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), id, "progress saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(dir: &tempfile::TempDir) -> ProgressTracker {
        ProgressTracker::new(dir.path().join("progress.json"))
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let t = tracker(&dir);
        t.save(42).unwrap();
        assert_eq!(t.load(), Some(42));
        t.save(1_234_567_890_123_456_789).unwrap();
        assert_eq!(t.load(), Some(1_234_567_890_123_456_789));
    }

    #[test]
    fn file_uses_expected_shape() {
        let dir = tempfile::tempdir().unwrap();
        let t = tracker(&dir);
        t.save(7).unwrap();
        let raw = std::fs::read_to_string(t.path()).unwrap();
        assert_eq!(raw, r#"{"last_processed_id":7}"#);
        assert!(!dir.path().join("progress.json.tmp").exists());
    }

    #[test]
    fn missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(tracker(&dir).load(), None);
    }

    #[test]
    fn corrupt_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let t = tracker(&dir);
        for junk in ["", "not json", "{\"last_processed_id\": \"abc\"}", "{}", "[1,2]"] {
            std::fs::write(t.path(), junk).unwrap();
            assert_eq!(t.load(), None, "input {junk:?}");
        }
    }

    #[test]
    fn zero_means_no_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let t = tracker(&dir);
        std::fs::write(t.path(), r#"{"last_processed_id": 0}"#).unwrap();
        assert_eq!(t.load(), None);
    }

    #[test]
    fn directory_in_place_of_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let t = ProgressTracker::new(dir.path());
        assert_eq!(t.load(), None);
    }
}

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::util::Error;

/// Immutable-after-creation operation metadata, mirrored from the
/// controller-supplied annotations at the moment an operation starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationMetadata {
    pub operation_id: String,
    pub target_version: String,
    pub components: Vec<String>,
    pub node_name: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepMarker {
    pub step: usize,
    pub name: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedMarker {
    pub step: usize,
    pub name: String,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedMarker {
    pub completed_at: DateTime<Utc>,
    pub node_name: String,
}

/// Durable, crash-resilient state machine for operations, backed by a
/// directory per operation under `root`. Every transition that matters for
/// recovery is a same-directory rename, fsynced before it becomes visible.
#[derive(Debug, Clone)]
pub struct OperationStore {
    root: PathBuf,
}

impl OperationStore {
    pub fn new(root: PathBuf) -> Result<Self, Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn operation_dir(&self, operation_id: &str) -> PathBuf {
        self.root.join(format!("operation-{operation_id}"))
    }

    /// Ensures the operation directory and its `logs/` subdirectory exist.
    pub fn open(&self, operation_id: &str) -> Result<PathBuf, Error> {
        let dir = self.operation_dir(operation_id);
        std::fs::create_dir_all(dir.join("logs"))?;
        Ok(dir)
    }

    pub fn logs_dir(dir: &Path) -> PathBuf {
        dir.join("logs")
    }

    pub fn step_log_path(dir: &Path, step_name: &str) -> PathBuf {
        Self::logs_dir(dir).join(format!("{step_name}.log"))
    }

    pub fn write_metadata(&self, dir: &Path, meta: &OperationMetadata) -> Result<(), Error> {
        write_json_durable(&dir.join("metadata.json"), meta)
    }

    pub fn read_metadata(&self, dir: &Path) -> Result<OperationMetadata, Error> {
        let bytes = std::fs::read(dir.join("metadata.json"))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn inprogress_path(dir: &Path, index: usize, name: &str) -> PathBuf {
        dir.join(format!("step-{index:02}-{name}.inprogress"))
    }

    fn done_path(dir: &Path, index: usize, name: &str) -> PathBuf {
        dir.join(format!("step-{index:02}-{name}.done"))
    }

    /// The idempotence gate for resume: a step is skipped iff this is true.
    pub fn is_done(dir: &Path, index: usize, name: &str) -> bool {
        Self::done_path(dir, index, name).exists()
    }

    pub fn mark_inprogress(&self, dir: &Path, index: usize, name: &str) -> Result<PathBuf, Error> {
        let marker = StepMarker {
            step: index,
            name: name.to_string(),
            started_at: Utc::now(),
        };
        let path = Self::inprogress_path(dir, index, name);
        write_json_durable(&path, &marker)?;
        Ok(path)
    }

    /// Atomically renames the step's `.inprogress` marker to `.done`.
    pub fn finish(&self, dir: &Path, index: usize, name: &str) -> Result<(), Error> {
        atomic_rename(&Self::inprogress_path(dir, index, name), &Self::done_path(dir, index, name))
    }

    pub fn mark_failed(&self, dir: &Path, index: usize, name: &str, error: &str) -> Result<(), Error> {
        let marker = FailedMarker {
            step: index,
            name: name.to_string(),
            error: error.to_string(),
            failed_at: Utc::now(),
        };
        write_json_durable(&dir.join("failed"), &marker)
    }

    pub fn mark_completed(&self, dir: &Path, node_name: &str) -> Result<(), Error> {
        let marker = CompletedMarker {
            completed_at: Utc::now(),
            node_name: node_name.to_string(),
        };
        write_json_durable(&dir.join("completed"), &marker)
    }

    pub fn is_completed(dir: &Path) -> bool {
        dir.join("completed").exists()
    }

    pub fn is_failed(dir: &Path) -> bool {
        dir.join("failed").exists()
    }

    /// Operation ids under the root with neither terminal marker —
    /// candidates for `Executor::execute(.., resume = true)` at startup.
    pub fn list_incomplete(&self) -> Result<Vec<String>, Error> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(id) = file_name.strip_prefix("operation-") else {
                continue;
            };
            if !Self::is_completed(&path) && !Self::is_failed(&path) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn write_json_durable<T: Serialize>(path: &Path, value: &T) -> Result<(), Error> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    atomic_rename(&tmp_path, path)
}

fn atomic_rename(from: &Path, to: &Path) -> Result<(), Error> {
    std::fs::rename(from, to)?;
    fsync_parent_dir(to)
}

fn fsync_parent_dir(path: &Path) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        std::fs::File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> OperationMetadata {
        OperationMetadata {
            operation_id: "op1".to_string(),
            target_version: "1.29.4".to_string(),
            components: vec!["containerd".to_string()],
            node_name: "node-1".to_string(),
            started_at: Utc::now(),
        }
    }

    #[test]
    fn open_creates_operation_and_logs_dirs() {
        let root = tempfile::tempdir().unwrap();
        let store = OperationStore::new(root.path().to_path_buf()).unwrap();
        let dir = store.open("op1").unwrap();
        assert!(dir.is_dir());
        assert!(OperationStore::logs_dir(&dir).is_dir());
    }

    #[test]
    fn metadata_round_trips() {
        let root = tempfile::tempdir().unwrap();
        let store = OperationStore::new(root.path().to_path_buf()).unwrap();
        let dir = store.open("op1").unwrap();
        let meta = sample_metadata();
        store.write_metadata(&dir, &meta).unwrap();
        assert_eq!(store.read_metadata(&dir).unwrap(), meta);
    }

    #[test]
    fn inprogress_then_finish_leaves_only_done_marker() {
        let root = tempfile::tempdir().unwrap();
        let store = OperationStore::new(root.path().to_path_buf()).unwrap();
        let dir = store.open("op1").unwrap();
        let inprogress = store.mark_inprogress(&dir, 1, "download-packages").unwrap();
        assert!(inprogress.exists());
        assert!(!OperationStore::is_done(&dir, 1, "download-packages"));

        store.finish(&dir, 1, "download-packages").unwrap();
        assert!(!inprogress.exists());
        assert!(OperationStore::is_done(&dir, 1, "download-packages"));
    }

    #[test]
    fn list_incomplete_excludes_terminal_operations() {
        let root = tempfile::tempdir().unwrap();
        let store = OperationStore::new(root.path().to_path_buf()).unwrap();

        let running = store.open("running").unwrap();
        store.write_metadata(&running, &sample_metadata()).unwrap();

        let done = store.open("done").unwrap();
        store.mark_completed(&done, "node-1").unwrap();

        let dead = store.open("dead").unwrap();
        store.mark_failed(&dead, 1, "drain-node", "boom").unwrap();

        let mut incomplete = store.list_incomplete().unwrap();
        incomplete.sort();
        assert_eq!(incomplete, vec!["running".to_string()]);
    }

    #[test]
    fn failed_and_completed_markers_are_mutually_observable() {
        let root = tempfile::tempdir().unwrap();
        let store = OperationStore::new(root.path().to_path_buf()).unwrap();
        let dir = store.open("op1").unwrap();
        assert!(!OperationStore::is_completed(&dir));
        assert!(!OperationStore::is_failed(&dir));
        store.mark_failed(&dir, 2, "drain-node", "exit 1").unwrap();
        assert!(OperationStore::is_failed(&dir));
        assert!(!OperationStore::is_completed(&dir));
    }
}

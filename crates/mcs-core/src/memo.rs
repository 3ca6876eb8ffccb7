//! Persisted admin-mode store, keyed by node FQDN (spec §6).
//!
//! A JSON file round-tripped through a [`std::collections::HashMap`],
//! the same shape `hdds-persistence`/`hdds-router` use for their
//! config files scaled down to a single map. Intentionally not a real
//! database: the only durable state in this system is a handful of
//! enum values per node.

use crate::fqdn::Fqdn;
use crate::state::AdminMode;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, Default)]
struct MemoFile {
    admin_modes: HashMap<String, AdminMode>,
}

/// Handle to the on-disk admin-mode memo. Safe to share across nodes
/// in one process; writes are serialized and flushed synchronously so
/// a crash immediately after a transition does not lose it.
pub struct MemoStore {
    path: PathBuf,
    cache: Mutex<MemoFile>,
}

impl MemoStore {
    /// Load `path` if it exists, otherwise start with an empty memo.
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let cache = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            MemoFile::default()
        };
        Ok(Self {
            path,
            cache: Mutex::new(cache),
        })
    }

    /// An ephemeral memo that is never written to disk, used by tests
    /// and the scenario runner.
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            cache: Mutex::new(MemoFile::default()),
        }
    }

    pub fn get(&self, node: &Fqdn) -> Option<AdminMode> {
        self.cache.lock().admin_modes.get(node.as_str()).copied()
    }

    pub fn set(&self, node: &Fqdn, mode: AdminMode) -> std::io::Result<()> {
        let mut cache = self.cache.lock();
        cache.admin_modes.insert(node.as_str().to_string(), mode);
        self.flush_locked(&cache)
    }

    fn flush_locked(&self, cache: &MemoFile) -> std::io::Result<()> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        let raw = serde_json::to_string_pretty(cache)?;
        write_atomic(&self.path, &raw)
    }
}

fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memo.json");
        let node = Fqdn::from("mid_csp_cbf/vcc/001");

        {
            let memo = MemoStore::open(&path).unwrap();
            memo.set(&node, AdminMode::Online).unwrap();
        }

        let memo = MemoStore::open(&path).unwrap();
        assert_eq!(memo.get(&node), Some(AdminMode::Online));
    }

    #[test]
    fn in_memory_never_touches_disk() {
        let memo = MemoStore::in_memory();
        let node = Fqdn::from("mid_csp_cbf/controller/001");
        memo.set(&node, AdminMode::Offline).unwrap();
        assert_eq!(memo.get(&node), Some(AdminMode::Offline));
    }

    #[test]
    fn unknown_node_returns_none() {
        let memo = MemoStore::in_memory();
        assert_eq!(memo.get(&Fqdn::from("a/b/c")), None);
    }
}

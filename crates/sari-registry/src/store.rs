//! File-backed registry store: read-modify-write-rename under an exclusive
//! advisory lock, using `fs4`'s cross-platform `File::lock_exclusive`.

use crate::error::{RegistryError, Result};
use crate::liveness::is_pid_alive;
use crate::state::RegistryFile;
use fs4::fs_std::FileExt;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

/// Resolves the registry file path: `REGISTRY_FILE` env override, else
/// `sari_model::config::RegistryConfig::registry_file`, else a
/// platform-specific data directory.
pub fn default_registry_path() -> PathBuf {
    if let Ok(path) = std::env::var("REGISTRY_FILE") {
        return PathBuf::from(path);
    }
    let base = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
    base.join("sari").join("registry.json")
}

pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        RegistryStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut p = self.path.clone();
        let name = format!(
            "{}.lock",
            p.file_name().and_then(|n| n.to_str()).unwrap_or("registry.json")
        );
        p.set_file_name(name);
        p
    }

    fn read_raw(&self) -> Result<RegistryFile> {
        if !self.path.exists() {
            return Ok(RegistryFile::default());
        }
        let text = fs::read_to_string(&self.path).map_err(|source| RegistryError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        if text.trim().is_empty() {
            return Ok(RegistryFile::default());
        }
        serde_json::from_str(&text).map_err(|source| RegistryError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })
    }

    fn write_raw(&self, registry: &RegistryFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| RegistryError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(registry).map_err(|source| RegistryError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })?;
        fs::write(&tmp_path, body).map_err(|source| RegistryError::Io {
            path: tmp_path.display().to_string(),
            source,
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|source| RegistryError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        Ok(())
    }

    /// Read-only snapshot, pruning dead daemons in memory (never persisted
    /// by a plain read; only `mutate` persists prunes).
    pub fn snapshot(&self) -> Result<RegistryFile> {
        let mut registry = self.read_raw()?;
        registry.prune_dead(is_pid_alive);
        Ok(registry)
    }

    /// Acquires the exclusive lock, loads the current file (pruning dead
    /// daemons), lets `f` mutate it, then writes the result back via
    /// rename. The lock is held for the whole read-modify-write cycle.
    pub fn mutate<T>(&self, f: impl FnOnce(&mut RegistryFile) -> T) -> Result<T> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| RegistryError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let lock_path = self.lock_path();
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)
            .map_err(|source| RegistryError::Io {
                path: lock_path.display().to_string(),
                source,
            })?;
        lock_file
            .lock_exclusive()
            .map_err(|_| RegistryError::LockFailed(lock_path.display().to_string()))?;

        let mut registry = self.read_raw()?;
        registry.prune_dead(is_pid_alive);
        let result = f(&mut registry);
        let write_result = self.write_raw(&registry);

        let _ = FileExt::unlock(&lock_file);
        write_result?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sari_model::DaemonRegistryEntry;

    fn sample_entry(boot_id: &str) -> DaemonRegistryEntry {
        DaemonRegistryEntry {
            boot_id: boot_id.to_string(),
            host: "127.0.0.1".to_string(),
            port: 9000,
            pid: std::process::id(),
            version: "0.1.0".to_string(),
            http_host: None,
            http_port: None,
            last_seen_ts: 0,
            draining: false,
        }
    }

    #[test]
    fn mutate_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let store = RegistryStore::new(&path);

        store
            .mutate(|reg| reg.upsert_daemon(sample_entry("boot-1")))
            .unwrap();

        let reopened = RegistryStore::new(&path);
        let snap = reopened.snapshot().unwrap();
        assert!(snap.daemons.contains_key("boot-1"));
    }

    #[test]
    fn missing_file_reads_as_empty_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonexistent.json");
        let store = RegistryStore::new(&path);
        let snap = store.snapshot().unwrap();
        assert!(snap.daemons.is_empty());
        assert_eq!(snap.version, crate::state::SCHEMA_VERSION);
    }

    #[test]
    fn snapshot_prunes_dead_pids_without_persisting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let store = RegistryStore::new(&path);
        let mut dead = sample_entry("dead");
        dead.pid = 999_999_999;
        store.mutate(|reg| reg.upsert_daemon(dead)).unwrap();

        let before_prune_raw = fs::read_to_string(&path).unwrap();
        assert!(before_prune_raw.contains("dead"));

        let snap = store.snapshot().unwrap();
        assert!(!snap.daemons.contains_key("dead"));
    }
}

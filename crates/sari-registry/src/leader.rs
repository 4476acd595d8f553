//! Single-leader indexing lock: a process-wide file lock on
//! `{db_path}.leader.lock` enforces single-leader indexing across
//! processes. Distinct from the registry's own lock file, one per
//! workspace database.
//!
//! `leader` must acquire the lock or the caller treats it as fatal; `auto`
//! tries and downgrades to `follower` on failure; `follower` never
//! attempts the lock; `off` disables the check entirely.

use crate::error::{RegistryError, Result};
use fs4::fs_std::FileExt;
use sari_model::config::IndexerMode;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

pub enum LeaderRole {
    /// This process holds the exclusive lock; it may run the indexer.
    Leader(LeaderGuard),
    /// Another process holds the lock; this process must not write.
    Follower,
    /// Indexing is disabled for this process entirely.
    Disabled,
}

/// Holds the lock file open for as long as this process wants to remain
/// leader; dropping it releases the lock.
pub struct LeaderGuard {
    _file: File,
    path: PathBuf,
}

impl LeaderGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Distinct from `sari_storage::gate::WriteGate`'s `{db_path}.lock`: that one
/// gates individual write transactions, this one gates which process runs
/// the indexer pipeline at all. Same db_path, different concern, different
/// sidecar file so acquiring one never blocks on the other.
fn lock_path_for(db_path: &Path) -> PathBuf {
    let mut path = db_path.as_os_str().to_owned();
    path.push(".leader.lock");
    PathBuf::from(path)
}

fn try_acquire(db_path: &Path) -> Result<LeaderGuard> {
    let lock_path = lock_path_for(db_path);
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(&lock_path)
        .map_err(|source| RegistryError::Io {
            path: lock_path.display().to_string(),
            source,
        })?;
    file.try_lock_exclusive()
        .map_err(|_| RegistryError::LeaderLockHeld(lock_path.display().to_string()))?;
    Ok(LeaderGuard { _file: file, path: lock_path })
}

/// Resolves the leader role for `mode` against `db_path`'s lock file.
/// `leader` propagates an acquisition failure as an error (fatal, per
/// spec); `auto` swallows it and returns `Follower`.
pub fn acquire(mode: IndexerMode, db_path: &Path) -> Result<LeaderRole> {
    match mode {
        IndexerMode::Off => Ok(LeaderRole::Disabled),
        IndexerMode::Follower => Ok(LeaderRole::Follower),
        IndexerMode::Leader => Ok(LeaderRole::Leader(try_acquire(db_path)?)),
        IndexerMode::Auto => match try_acquire(db_path) {
            Ok(guard) => Ok(LeaderRole::Leader(guard)),
            Err(_) => Ok(LeaderRole::Follower),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leader_mode_acquires_lock() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("sari.db");
        let role = acquire(IndexerMode::Leader, &db_path).unwrap();
        assert!(matches!(role, LeaderRole::Leader(_)));
    }

    #[test]
    fn auto_mode_downgrades_when_leader_holds_lock() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("sari.db");
        let _leader = acquire(IndexerMode::Leader, &db_path).unwrap();

        let follower = acquire(IndexerMode::Auto, &db_path).unwrap();
        assert!(matches!(follower, LeaderRole::Follower));
    }

    #[test]
    fn leader_mode_fails_fatally_when_already_held() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("sari.db");
        let _leader = acquire(IndexerMode::Leader, &db_path).unwrap();

        let err = acquire(IndexerMode::Leader, &db_path).unwrap_err();
        assert!(matches!(err, RegistryError::LeaderLockHeld(_)));
    }

    #[test]
    fn off_mode_never_touches_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("sari.db");
        let role = acquire(IndexerMode::Off, &db_path).unwrap();
        assert!(matches!(role, LeaderRole::Disabled));
        assert!(!lock_path_for(&db_path).exists());
    }

    #[test]
    fn follower_mode_never_attempts_lock() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("sari.db");
        let role = acquire(IndexerMode::Follower, &db_path).unwrap();
        assert!(matches!(role, LeaderRole::Follower));
    }
}

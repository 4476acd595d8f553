//! Cross-process advisory write lock, guarding the single-writer invariant
//! across separate daemon instances sharing one SQLite file: no other
//! component may open a write transaction while this lock is held. An
//! `fs4` flock on a sidecar `.lock` file.

use crate::error::{Result, StorageError};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

pub struct WriteGate {
    path: PathBuf,
    file: Option<File>,
}

impl WriteGate {
    pub fn new(db_path: &Path) -> Self {
        let mut lock_path = db_path.as_os_str().to_owned();
        lock_path.push(".lock");
        WriteGate {
            path: PathBuf::from(lock_path),
            file: None,
        }
    }

    pub fn lock(&mut self) -> Result<()> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.path)?;
        file.lock_exclusive()
            .map_err(|e| StorageError::lock_timeout(format!("flock {}: {e}", self.path.display())))?;
        self.file = Some(file);
        Ok(())
    }

    pub fn unlock(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
        }
    }
}

impl Drop for WriteGate {
    fn drop(&mut self) {
        self.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_creates_sidecar_file() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("sari.db");
        let mut gate = WriteGate::new(&db_path);
        gate.lock().unwrap();
        assert!(db_path.with_extension("db.lock").exists() || dir.path().join("sari.db.lock").exists());
    }
}

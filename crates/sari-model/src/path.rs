//! db-path conventions and the FS <-> db-path resolver.
//!
//! A db-path is `"<root_id>/<rel_path>"`, where `root_id` is a stable 8-hex
//! hash of the canonical workspace root. FS paths only cross the boundary at
//! I/O edges (the watcher, the indexer's directory walk); everything inside
//! the core addresses files by db-path.
//!
//! Root lookup is a flat `Vec` scan rather than a trie: the number of
//! registered roots per process is small (single digits to low tens), so a
//! trie buys nothing at that scale.

use crate::error::{ModelError, Result};
use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};

/// Compute the stable 8-hex-char root_id for a canonical workspace root path.
pub fn root_id_for(canonical_root: &Path) -> String {
    let normalized = normalize(canonical_root);
    let mut hasher = Sha1::new();
    hasher.update(normalized.as_bytes());
    let digest = hasher.finalize();
    digest.iter().take(4).map(|b| format!("{:02x}", b)).collect()
}

/// Conservative path normalization: unify separators, strip trailing slash.
fn normalize(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/");
    if s.len() > 1 && s.ends_with('/') {
        s.trim_end_matches('/').to_string()
    } else {
        s
    }
}

/// A db-path: `"<root_id>/<rel_path>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DbPath(String);

impl DbPath {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn root_id(&self) -> &str {
        self.0.split_once('/').map(|(r, _)| r).unwrap_or(&self.0)
    }

    pub fn rel_path(&self) -> &str {
        self.0.split_once('/').map(|(_, r)| r).unwrap_or("")
    }
}

impl std::fmt::Display for DbPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DbPath {
    fn from(s: String) -> Self {
        DbPath(s)
    }
}

impl AsRef<str> for DbPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Build a db-path from a root_id and a rel_path (forward-slash separated,
/// no leading slash).
pub fn db_path(root_id: &str, rel_path: &str) -> DbPath {
    let rel = rel_path.trim_start_matches('/');
    DbPath(format!("{}/{}", root_id, rel))
}

/// A registered workspace root: its canonical FS path and derived root_id.
#[derive(Debug, Clone)]
struct RegisteredRoot {
    root_id: String,
    canonical_path: PathBuf,
    normalized: String,
}

/// Bidirectional FS-path <-> db-path resolver performing longest-prefix
/// matching over the set of registered roots.
#[derive(Debug, Default)]
pub struct PathResolver {
    roots: Vec<RegisteredRoot>,
}

impl PathResolver {
    pub fn new() -> Self {
        Self { roots: Vec::new() }
    }

    /// Register a workspace root, returning its stable root_id. Idempotent:
    /// registering the same canonical path twice returns the same root_id.
    pub fn register_root(&mut self, canonical_path: &Path) -> String {
        let normalized = normalize(canonical_path);
        if let Some(existing) = self.roots.iter().find(|r| r.normalized == normalized) {
            return existing.root_id.clone();
        }
        let root_id = root_id_for(canonical_path);
        self.roots.push(RegisteredRoot {
            root_id: root_id.clone(),
            canonical_path: canonical_path.to_path_buf(),
            normalized,
        });
        root_id
    }

    pub fn unregister_root(&mut self, root_id: &str) {
        self.roots.retain(|r| r.root_id != root_id);
    }

    pub fn canonical_path(&self, root_id: &str) -> Option<&Path> {
        self.roots
            .iter()
            .find(|r| r.root_id == root_id)
            .map(|r| r.canonical_path.as_path())
    }

    pub fn root_ids(&self) -> impl Iterator<Item = &str> {
        self.roots.iter().map(|r| r.root_id.as_str())
    }

    /// Convert an FS path into a db-path via longest-prefix match over
    /// registered roots. Returns `None` if the path is not within any root
    /// (callers should treat this as "drop the event").
    pub fn to_db_path(&self, fs_path: &Path) -> Option<DbPath> {
        let normalized = normalize(fs_path);
        let mut best: Option<&RegisteredRoot> = None;
        for root in &self.roots {
            let is_match = normalized == root.normalized
                || normalized.starts_with(&format!("{}/", root.normalized));
            if is_match {
                let better = match best {
                    None => true,
                    Some(current) => root.normalized.len() > current.normalized.len(),
                };
                if better {
                    best = Some(root);
                }
            }
        }
        best.map(|root| {
            let rel = if normalized == root.normalized {
                String::new()
            } else {
                normalized[root.normalized.len() + 1..].to_string()
            };
            db_path(&root.root_id, &rel)
        })
    }

    /// Convert a db-path back into an absolute FS path.
    pub fn to_fs_path(&self, db: &DbPath) -> Result<PathBuf> {
        let root = self
            .roots
            .iter()
            .find(|r| r.root_id == db.root_id())
            .ok_or_else(|| ModelError::UnknownRoot {
                root_id: db.root_id().to_string(),
            })?;
        if db.rel_path().is_empty() {
            Ok(root.canonical_path.clone())
        } else {
            Ok(root.canonical_path.join(db.rel_path()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_id_is_stable_and_8_hex_chars() {
        let a = root_id_for(Path::new("/workspace/proj"));
        let b = root_id_for(Path::new("/workspace/proj"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn root_id_strips_trailing_slash() {
        let a = root_id_for(Path::new("/workspace/proj"));
        let b = root_id_for(Path::new("/workspace/proj/"));
        assert_eq!(a, b);
    }

    #[test]
    fn resolver_round_trips_fs_path() {
        let mut resolver = PathResolver::new();
        let root_id = resolver.register_root(Path::new("/workspace/proj"));

        let db = resolver
            .to_db_path(Path::new("/workspace/proj/src/main.rs"))
            .expect("path is under root");
        assert_eq!(db.root_id(), root_id);
        assert_eq!(db.rel_path(), "src/main.rs");

        let fs = resolver.to_fs_path(&db).unwrap();
        assert_eq!(fs, PathBuf::from("/workspace/proj/src/main.rs"));
    }

    #[test]
    fn resolver_rejects_unrelated_path() {
        let mut resolver = PathResolver::new();
        resolver.register_root(Path::new("/workspace/proj"));
        assert!(resolver
            .to_db_path(Path::new("/other/place/file.rs"))
            .is_none());
    }

    #[test]
    fn resolver_picks_longest_matching_root() {
        let mut resolver = PathResolver::new();
        let outer = resolver.register_root(Path::new("/workspace"));
        let inner = resolver.register_root(Path::new("/workspace/proj"));
        assert_ne!(outer, inner);

        let db = resolver
            .to_db_path(Path::new("/workspace/proj/lib.rs"))
            .unwrap();
        assert_eq!(db.root_id(), inner);
    }

    #[test]
    fn resolver_matches_root_itself() {
        let mut resolver = PathResolver::new();
        let root_id = resolver.register_root(Path::new("/workspace/proj"));
        let db = resolver.to_db_path(Path::new("/workspace/proj")).unwrap();
        assert_eq!(db.root_id(), root_id);
        assert_eq!(db.rel_path(), "");
    }

    #[test]
    fn register_root_is_idempotent() {
        let mut resolver = PathResolver::new();
        let a = resolver.register_root(Path::new("/workspace/proj"));
        let b = resolver.register_root(Path::new("/workspace/proj"));
        assert_eq!(a, b);
        assert_eq!(resolver.root_ids().count(), 1);
    }
}

//! On-disk registry schema (schema version `"2.0"`): live daemons,
//! workspace bindings, and the current deployment generation, all in one
//! JSON document updated atomically as a whole.

use sari_model::{DaemonRegistryEntry, Deployment, WorkspaceBinding};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const SCHEMA_VERSION: &str = "2.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryFile {
    pub version: String,
    pub daemons: HashMap<String, DaemonRegistryEntry>,
    pub workspaces: HashMap<String, WorkspaceBinding>,
    pub deployment: Deployment,
}

impl Default for RegistryFile {
    fn default() -> Self {
        RegistryFile {
            version: SCHEMA_VERSION.to_string(),
            daemons: HashMap::new(),
            workspaces: HashMap::new(),
            deployment: Deployment::default(),
        }
    }
}

impl RegistryFile {
    /// Drops daemons whose pid no longer answers a kill-0 probe, and any
    /// workspace binding that pointed at one of them.
    pub fn prune_dead(&mut self, is_alive: impl Fn(u32) -> bool) {
        let dead: Vec<String> = self
            .daemons
            .iter()
            .filter(|(_, entry)| !is_alive(entry.pid))
            .map(|(boot_id, _)| boot_id.clone())
            .collect();
        for boot_id in &dead {
            self.daemons.remove(boot_id);
        }
        self.workspaces.retain(|_, binding| !dead.contains(&binding.boot_id));
    }

    pub fn upsert_daemon(&mut self, entry: DaemonRegistryEntry) {
        self.daemons.insert(entry.boot_id.clone(), entry);
    }

    pub fn remove_daemon(&mut self, boot_id: &str) {
        self.daemons.remove(boot_id);
        self.workspaces.retain(|_, binding| binding.boot_id != boot_id);
    }

    pub fn non_draining_binding(&self, canonical_root: &str) -> Option<&WorkspaceBinding> {
        let binding = self.workspaces.get(canonical_root)?;
        let daemon = self.daemons.get(&binding.boot_id)?;
        if daemon.draining {
            None
        } else {
            Some(binding)
        }
    }

    pub fn any_binding(&self, canonical_root: &str) -> Option<&WorkspaceBinding> {
        self.workspaces.get(canonical_root)
    }

    /// Binds `canonical_root` to `boot_id`, marking any prior distinct
    /// owner of that root `draining`.
    pub fn set_workspace(&mut self, canonical_root: &str, boot_id: &str) {
        if let Some(prior) = self.workspaces.get(canonical_root) {
            if prior.boot_id != boot_id {
                if let Some(prior_daemon) = self.daemons.get_mut(&prior.boot_id) {
                    prior_daemon.draining = true;
                }
            }
        }
        let http = self.daemons.get(boot_id).map(|d| (d.http_host.clone(), d.http_port));
        let (http_host, http_port) = http.unwrap_or((None, None));
        self.workspaces.insert(
            canonical_root.to_string(),
            WorkspaceBinding {
                canonical_root: canonical_root.to_string(),
                boot_id: boot_id.to_string(),
                http_host,
                http_port,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(boot_id: &str, pid: u32, draining: bool) -> DaemonRegistryEntry {
        DaemonRegistryEntry {
            boot_id: boot_id.to_string(),
            host: "127.0.0.1".to_string(),
            port: 9000,
            pid,
            version: "0.1.0".to_string(),
            http_host: Some("127.0.0.1".to_string()),
            http_port: Some(9001),
            last_seen_ts: 0,
            draining,
        }
    }

    #[test]
    fn prune_dead_removes_daemon_and_its_bindings() {
        let mut reg = RegistryFile::default();
        reg.upsert_daemon(entry("a", 111, false));
        reg.set_workspace("/ws", "a");

        reg.prune_dead(|pid| pid != 111);

        assert!(reg.daemons.is_empty());
        assert!(reg.workspaces.is_empty());
    }

    #[test]
    fn set_workspace_marks_prior_owner_draining() {
        let mut reg = RegistryFile::default();
        reg.upsert_daemon(entry("a", 111, false));
        reg.upsert_daemon(entry("b", 222, false));
        reg.set_workspace("/ws", "a");

        reg.set_workspace("/ws", "b");

        assert!(reg.daemons["a"].draining);
        assert_eq!(reg.workspaces["/ws"].boot_id, "b");
    }

    #[test]
    fn non_draining_binding_hides_draining_owner() {
        let mut reg = RegistryFile::default();
        reg.upsert_daemon(entry("a", 111, true));
        reg.set_workspace("/ws", "a");

        assert!(reg.non_draining_binding("/ws").is_none());
        assert!(reg.any_binding("/ws").is_some());
    }
}

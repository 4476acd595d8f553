//! Daemon registry and resolver: the file-backed, atomically updated JSON
//! registry that is the single source of truth for live daemons, workspace
//! bindings, and the current upgrade/drain deployment generation, plus the
//! endpoint resolver and the single-leader indexing lock built on top of
//! it.

pub mod deployment;
pub mod error;
pub mod leader;
pub mod liveness;
pub mod resolver;
pub mod state;
pub mod store;

pub use deployment::DeploymentStateMachine;
pub use error::{RegistryError, Result};
pub use leader::{acquire as acquire_leader, LeaderGuard, LeaderRole};
pub use resolver::{resolve_endpoint, Endpoint};
pub use state::RegistryFile;
pub use store::{default_registry_path, RegistryStore};

use sari_model::DaemonRegistryEntry;
use std::time::{SystemTime, UNIX_EPOCH};

/// Facade over `RegistryStore` exposing the per-daemon operations a daemon
/// process and the CLI both need, without every caller hand-rolling a
/// `mutate` closure.
pub struct DaemonRegistry {
    store: RegistryStore,
}

impl DaemonRegistry {
    pub fn new(store: RegistryStore) -> Self {
        DaemonRegistry { store }
    }

    pub fn open(path: impl Into<std::path::PathBuf>) -> Self {
        DaemonRegistry::new(RegistryStore::new(path))
    }

    pub fn snapshot(&self) -> Result<RegistryFile> {
        self.store.snapshot()
    }

    /// Registers (or refreshes, on the same `boot_id`) a live daemon entry.
    pub fn register_daemon(&self, entry: DaemonRegistryEntry) -> Result<()> {
        self.store.mutate(|reg| reg.upsert_daemon(entry))
    }

    pub fn heartbeat(&self, boot_id: &str) -> Result<bool> {
        self.store.mutate(|reg| match reg.daemons.get_mut(boot_id) {
            Some(entry) => {
                entry.last_seen_ts = now_ts();
                true
            }
            None => false,
        })
    }

    pub fn deregister_daemon(&self, boot_id: &str) -> Result<()> {
        self.store.mutate(|reg| reg.remove_daemon(boot_id))
    }

    /// Binds a workspace root to a daemon, draining any distinct prior
    /// owner.
    pub fn set_workspace(&self, canonical_root: &str, boot_id: &str) -> Result<()> {
        self.store.mutate(|reg| reg.set_workspace(canonical_root, boot_id))
    }

    pub fn resolve(&self, canonical_root: &str, config: &sari_model::config::RegistryConfig) -> Result<Endpoint> {
        let snapshot = self.store.snapshot()?;
        Ok(resolve_endpoint(&snapshot, canonical_root, config))
    }

    /// Runs `f` against the current deployment state machine, persisting
    /// whatever it leaves behind regardless of whether `f` itself mutated
    /// anything (the state machine is cheap to re-serialize).
    pub fn with_deployment<T>(&self, f: impl FnOnce(&mut DeploymentStateMachine) -> T) -> Result<T> {
        self.store.mutate(|reg| {
            let mut sm = DeploymentStateMachine::new(std::mem::take(&mut reg.deployment));
            let out = f(&mut sm);
            reg.deployment = sm.into_deployment();
            out
        })
    }
}

fn now_ts() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sari_model::config::RegistryConfig;

    fn entry(boot_id: &str) -> DaemonRegistryEntry {
        DaemonRegistryEntry {
            boot_id: boot_id.to_string(),
            host: "127.0.0.1".to_string(),
            port: 9000,
            pid: std::process::id(),
            version: "0.1.0".to_string(),
            http_host: Some("127.0.0.1".to_string()),
            http_port: Some(9001),
            last_seen_ts: 0,
            draining: false,
        }
    }

    #[test]
    fn register_and_resolve_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let registry = DaemonRegistry::open(dir.path().join("registry.json"));

        registry.register_daemon(entry("boot-1")).unwrap();
        registry.set_workspace("/ws", "boot-1").unwrap();

        let endpoint = registry.resolve("/ws", &RegistryConfig::default()).unwrap();
        assert_eq!(endpoint.port, 9001);
    }

    #[test]
    fn heartbeat_on_unknown_boot_id_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let registry = DaemonRegistry::open(dir.path().join("registry.json"));
        assert!(!registry.heartbeat("ghost").unwrap());
    }

    #[test]
    fn deployment_transitions_persist_through_the_facade() {
        let dir = tempfile::tempdir().unwrap();
        let registry = DaemonRegistry::open(dir.path().join("registry.json"));

        registry
            .with_deployment(|sm| sm.begin_deploy("candidate-1"))
            .unwrap()
            .unwrap();

        let snapshot = registry.snapshot().unwrap();
        assert_eq!(snapshot.deployment.generation, 1);
        assert_eq!(snapshot.deployment.candidate_boot_id.as_deref(), Some("candidate-1"));
    }

    #[test]
    fn deregister_removes_daemon_and_workspace_binding() {
        let dir = tempfile::tempdir().unwrap();
        let registry = DaemonRegistry::open(dir.path().join("registry.json"));
        registry.register_daemon(entry("boot-1")).unwrap();
        registry.set_workspace("/ws", "boot-1").unwrap();

        registry.deregister_daemon("boot-1").unwrap();

        let snapshot = registry.snapshot().unwrap();
        assert!(snapshot.daemons.is_empty());
        assert!(snapshot.workspaces.is_empty());
    }
}

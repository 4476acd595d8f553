//! Endpoint resolution: given a workspace root, find which daemon should
//! serve it. An override env flag, a non-draining bound daemon, any bound
//! daemon, then config defaults, evaluated in sequence.

use crate::state::RegistryFile;
use sari_model::config::RegistryConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

/// Resolves the endpoint to dial for `canonical_root`, per the precedence
/// spec.md lays out: non-draining bound daemon, else any bound daemon
/// (regardless of draining), else `DAEMON_{HOST,PORT}` env overrides, else
/// the config defaults. `DAEMON_OVERRIDE=1` always wins and skips the
/// registry entirely, for debugging against a daemon started out-of-band.
pub fn resolve_endpoint(registry: &RegistryFile, canonical_root: &str, config: &RegistryConfig) -> Endpoint {
    if config.daemon_override {
        return Endpoint {
            host: config.daemon_host.clone(),
            port: config.daemon_port,
        };
    }

    if let Some(binding) = registry.non_draining_binding(canonical_root) {
        return endpoint_from_binding(binding, &config.daemon_host, config.daemon_port);
    }

    if let Some(binding) = registry.any_binding(canonical_root) {
        return endpoint_from_binding(binding, &config.daemon_host, config.daemon_port);
    }

    Endpoint {
        host: config.daemon_host.clone(),
        port: config.daemon_port,
    }
}

fn endpoint_from_binding(binding: &sari_model::WorkspaceBinding, default_host: &str, default_port: u16) -> Endpoint {
    Endpoint {
        host: binding.http_host.clone().unwrap_or_else(|| default_host.to_string()),
        port: binding.http_port.unwrap_or(default_port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sari_model::DaemonRegistryEntry;

    fn config() -> RegistryConfig {
        RegistryConfig {
            daemon_host: "127.0.0.1".to_string(),
            daemon_port: 7000,
            ..RegistryConfig::default()
        }
    }

    fn entry(boot_id: &str, draining: bool, http_port: u16) -> DaemonRegistryEntry {
        DaemonRegistryEntry {
            boot_id: boot_id.to_string(),
            host: "127.0.0.1".to_string(),
            port: 9000,
            pid: 1,
            version: "0.1.0".to_string(),
            http_host: Some("127.0.0.1".to_string()),
            http_port: Some(http_port),
            last_seen_ts: 0,
            draining,
        }
    }

    #[test]
    fn prefers_non_draining_bound_daemon() {
        let mut reg = RegistryFile::default();
        reg.upsert_daemon(entry("a", false, 8080));
        reg.set_workspace("/ws", "a");

        let endpoint = resolve_endpoint(&reg, "/ws", &config());
        assert_eq!(endpoint.port, 8080);
    }

    #[test]
    fn falls_back_to_draining_daemon_when_no_alternative() {
        let mut reg = RegistryFile::default();
        reg.upsert_daemon(entry("a", true, 8080));
        reg.set_workspace("/ws", "a");

        let endpoint = resolve_endpoint(&reg, "/ws", &config());
        assert_eq!(endpoint.port, 8080);
    }

    #[test]
    fn falls_back_to_config_defaults_when_unbound() {
        let reg = RegistryFile::default();
        let endpoint = resolve_endpoint(&reg, "/ws", &config());
        assert_eq!(endpoint, Endpoint { host: "127.0.0.1".to_string(), port: 7000 });
    }

    #[test]
    fn override_flag_bypasses_registry() {
        let mut reg = RegistryFile::default();
        reg.upsert_daemon(entry("a", false, 8080));
        reg.set_workspace("/ws", "a");

        let mut cfg = config();
        cfg.daemon_override = true;
        let endpoint = resolve_endpoint(&reg, "/ws", &cfg);
        assert_eq!(endpoint.port, 7000);
    }
}

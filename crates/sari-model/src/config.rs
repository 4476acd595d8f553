//! Process-wide configuration surface, driven by environment variables.
//!
//! Every field has a default so the daemon runs unconfigured; `from_env`
//! overlays whatever the process environment sets, validating as it goes.

use crate::error::{ModelError, Result};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexerMode {
    Auto,
    Leader,
    Follower,
    Off,
}

impl FromStr for IndexerMode {
    type Err = ModelError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(IndexerMode::Auto),
            "leader" => Ok(IndexerMode::Leader),
            "follower" => Ok(IndexerMode::Follower),
            "off" => Ok(IndexerMode::Off),
            other => Err(ModelError::InvalidConfig {
                field: "INDEXER_MODE".into(),
                value: other.into(),
                hint: "expected one of auto, leader, follower, off".into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeProfile {
    Default,
    Heavy,
}

impl FromStr for SizeProfile {
    type Err = ModelError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "default" => Ok(SizeProfile::Default),
            "heavy" => Ok(SizeProfile::Heavy),
            other => Err(ModelError::InvalidConfig {
                field: "SIZE_PROFILE".into(),
                value: other.into(),
                hint: "expected one of default, heavy".into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Utf8DecodePolicy {
    Strict,
    Lossy,
}

impl FromStr for Utf8DecodePolicy {
    type Err = ModelError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "strict" => Ok(Utf8DecodePolicy::Strict),
            "lossy" => Ok(Utf8DecodePolicy::Lossy),
            other => Err(ModelError::InvalidConfig {
                field: "UTF8_DECODE_POLICY".into(),
                value: other.into(),
                hint: "expected one of strict, lossy".into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpPortStrategy {
    Auto,
    Strict,
}

impl FromStr for HttpPortStrategy {
    type Err = ModelError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(HttpPortStrategy::Auto),
            "strict" => Ok(HttpPortStrategy::Strict),
            other => Err(ModelError::InvalidConfig {
                field: "HTTP_API_PORT_STRATEGY".into(),
                value: other.into(),
                hint: "expected one of auto, strict".into(),
            }),
        }
    }
}

/// Which pipeline stages applies EXCLUDE patterns to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExcludeApplies {
    pub parse: bool,
    pub ast: bool,
    pub meta: bool,
}

impl Default for ExcludeApplies {
    fn default() -> Self {
        ExcludeApplies {
            parse: true,
            ast: true,
            meta: false,
        }
    }
}

/// Indexer/scheduler tuning knobs.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub mode: IndexerMode,
    pub startup_index: bool,
    pub parse_timeout_seconds: u64,
    pub parse_timeout_workers: usize,
    pub dlq_poll_seconds: u64,
    pub size_profile: SizeProfile,
    pub max_parse_bytes: u64,
    pub max_ast_bytes: u64,
    pub exclude_applies_to: ExcludeApplies,
    pub sample_large_files: bool,
    pub utf8_decode_policy: Utf8DecodePolicy,
    pub purge_legacy_paths: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        IndexerConfig {
            mode: IndexerMode::Auto,
            startup_index: true,
            parse_timeout_seconds: 10,
            parse_timeout_workers: 2,
            dlq_poll_seconds: 30,
            size_profile: SizeProfile::Default,
            max_parse_bytes: 2 * 1024 * 1024,
            max_ast_bytes: 1024 * 1024,
            exclude_applies_to: ExcludeApplies::default(),
            sample_large_files: true,
            utf8_decode_policy: Utf8DecodePolicy::Lossy,
            purge_legacy_paths: false,
        }
    }
}

/// Filesystem watcher tuning knobs.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub coalesce_shards: usize,
    pub git_checkout_debounce_ms: u64,
    pub watcher_monitor_seconds: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchConfig {
            coalesce_shards: 16,
            git_checkout_debounce_ms: 3000,
            watcher_monitor_seconds: 5,
        }
    }
}

/// Search engine tuning knobs.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub engine_max_doc_bytes: u64,
    pub engine_preview_bytes: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            engine_max_doc_bytes: 4 * 1024 * 1024,
            engine_preview_bytes: 2048,
        }
    }
}

/// Daemon registry / network binding configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub registry_file: Option<String>,
    pub workspace_root: Option<String>,
    pub daemon_host: String,
    pub daemon_port: u16,
    pub daemon_override: bool,
    pub http_api_host: String,
    pub http_api_port: u16,
    pub http_api_port_strategy: HttpPortStrategy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            registry_file: None,
            workspace_root: None,
            daemon_host: "127.0.0.1".into(),
            daemon_port: 0,
            daemon_override: false,
            http_api_host: "127.0.0.1".into(),
            http_api_port: 0,
            http_api_port_strategy: HttpPortStrategy::Auto,
        }
    }
}

/// Aggregated process configuration, built by overlaying environment
/// variables onto defaults.
#[derive(Debug, Clone, Default)]
pub struct CoreConfig {
    pub indexer: IndexerConfig,
    pub watch: WatchConfig,
    pub search: SearchConfig,
    pub registry: RegistryConfig,
}

fn env_str(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr<Err = std::num::ParseIntError>>(key: &str, default: T) -> Result<T> {
    match env_str(key) {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ModelError::InvalidConfig {
            field: key.into(),
            value: v,
            hint: "expected an integer".into(),
        }),
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match env_str(key) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            other => Err(ModelError::InvalidConfig {
                field: key.into(),
                value: other.into(),
                hint: "expected a boolean (0/1, true/false, yes/no)".into(),
            }),
        },
    }
}

fn env_enum<T: FromStr<Err = ModelError>>(key: &str, default: T) -> Result<T> {
    match env_str(key) {
        None => Ok(default),
        Some(v) => v.parse(),
    }
}

impl CoreConfig {
    /// Build a config from defaults overlaid with process environment
    /// variables, validating each recognized variable as it is read.
    pub fn from_env() -> Result<Self> {
        let defaults = CoreConfig::default();

        let exclude_applies_to = ExcludeApplies {
            parse: env_bool(
                "EXCLUDE_APPLIES_TO_PARSE",
                defaults.indexer.exclude_applies_to.parse,
            )?,
            ast: env_bool(
                "EXCLUDE_APPLIES_TO_AST",
                defaults.indexer.exclude_applies_to.ast,
            )?,
            meta: env_bool(
                "EXCLUDE_APPLIES_TO_META",
                defaults.indexer.exclude_applies_to.meta,
            )?,
        };

        let indexer = IndexerConfig {
            mode: env_enum("INDEXER_MODE", defaults.indexer.mode)?,
            startup_index: env_bool("STARTUP_INDEX", defaults.indexer.startup_index)?,
            parse_timeout_seconds: env_parse(
                "PARSE_TIMEOUT_SECONDS",
                defaults.indexer.parse_timeout_seconds,
            )?,
            parse_timeout_workers: env_parse(
                "PARSE_TIMEOUT_WORKERS",
                defaults.indexer.parse_timeout_workers,
            )?,
            dlq_poll_seconds: env_parse("DLQ_POLL_SECONDS", defaults.indexer.dlq_poll_seconds)?,
            size_profile: env_enum("SIZE_PROFILE", defaults.indexer.size_profile)?,
            max_parse_bytes: env_parse("MAX_PARSE_BYTES", defaults.indexer.max_parse_bytes)?,
            max_ast_bytes: env_parse("MAX_AST_BYTES", defaults.indexer.max_ast_bytes)?,
            exclude_applies_to,
            sample_large_files: env_bool(
                "SAMPLE_LARGE_FILES",
                defaults.indexer.sample_large_files,
            )?,
            utf8_decode_policy: env_enum(
                "UTF8_DECODE_POLICY",
                defaults.indexer.utf8_decode_policy,
            )?,
            purge_legacy_paths: env_bool(
                "PURGE_LEGACY_PATHS",
                defaults.indexer.purge_legacy_paths,
            )?,
        };

        let watch = WatchConfig {
            coalesce_shards: env_parse("COALESCE_SHARDS", defaults.watch.coalesce_shards)?,
            git_checkout_debounce_ms: env_parse(
                "GIT_CHECKOUT_DEBOUNCE",
                defaults.watch.git_checkout_debounce_ms,
            )?,
            watcher_monitor_seconds: env_parse(
                "WATCHER_MONITOR_SECONDS",
                defaults.watch.watcher_monitor_seconds,
            )?,
        };

        let search = SearchConfig {
            engine_max_doc_bytes: env_parse(
                "ENGINE_MAX_DOC_BYTES",
                defaults.search.engine_max_doc_bytes,
            )?,
            engine_preview_bytes: env_parse(
                "ENGINE_PREVIEW_BYTES",
                defaults.search.engine_preview_bytes,
            )?,
        };

        let registry = RegistryConfig {
            registry_file: env_str("REGISTRY_FILE").or(defaults.registry.registry_file),
            workspace_root: env_str("WORKSPACE_ROOT").or(defaults.registry.workspace_root),
            daemon_host: env_str("DAEMON_HOST").unwrap_or(defaults.registry.daemon_host),
            daemon_port: env_parse("DAEMON_PORT", defaults.registry.daemon_port)?,
            daemon_override: env_bool("DAEMON_OVERRIDE", defaults.registry.daemon_override)?,
            http_api_host: env_str("HTTP_API_HOST").unwrap_or(defaults.registry.http_api_host),
            http_api_port: env_parse("HTTP_API_PORT", defaults.registry.http_api_port)?,
            http_api_port_strategy: env_enum(
                "HTTP_API_PORT_STRATEGY",
                defaults.registry.http_api_port_strategy,
            )?,
        };

        Ok(CoreConfig {
            indexer,
            watch,
            search,
            registry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_apply_with_no_env() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("INDEXER_MODE");
        let cfg = CoreConfig::from_env().unwrap();
        assert_eq!(cfg.indexer.mode, IndexerMode::Auto);
        assert_eq!(cfg.watch.coalesce_shards, 16);
    }

    #[test]
    fn invalid_enum_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("INDEXER_MODE", "bogus");
        let err = CoreConfig::from_env().unwrap_err();
        assert!(matches!(err, ModelError::InvalidConfig { field, .. } if field == "INDEXER_MODE"));
        std::env::remove_var("INDEXER_MODE");
    }

    #[test]
    fn valid_enum_overrides_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("SIZE_PROFILE", "heavy");
        let cfg = CoreConfig::from_env().unwrap();
        assert_eq!(cfg.indexer.size_profile, SizeProfile::Heavy);
        std::env::remove_var("SIZE_PROFILE");
    }
}

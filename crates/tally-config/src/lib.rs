// tally-config - runtime configuration for the leaderboard service
//
// Supports configuration from multiple sources:
// 1. Environment variables (TALLY_* prefix, highest priority)
// 2. Config file path from TALLY_CONFIG env var
// 3. Default config file locations (./tally.toml, ./.tally.toml)
// 4. Built-in defaults (lowest priority)

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

mod sources;
mod validation;

pub use sources::{load_from_path, load_or_default};
pub use validation::parse_publish_time;

/// Main runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// IANA timezone all bucket boundaries are computed in.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub buffer: BufferConfig,

    #[serde(default)]
    pub snapshot: SnapshotConfig,

    #[serde(default)]
    pub publish: PublishConfig,

    #[serde(default)]
    pub notify: NotifyConfig,

    #[serde(default)]
    pub startup: StartupConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            ledger: LedgerConfig::default(),
            buffer: BufferConfig::default(),
            snapshot: SnapshotConfig::default(),
            publish: PublishConfig::default(),
            notify: NotifyConfig::default(),
            startup: StartupConfig::default(),
        }
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Storage backend configuration (ledger and snapshot live here)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs: Option<FsConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Fs,
            fs: Some(FsConfig::default()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Fs,
    Memory,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Fs => write!(f, "fs"),
            StorageBackend::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "fs" | "filesystem" => Ok(StorageBackend::Fs),
            "memory" | "mem" => Ok(StorageBackend::Memory),
            _ => anyhow::bail!("Unsupported storage backend: {}. Supported: fs, memory", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsConfig {
    pub path: String,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            path: "./data".to_string(),
        }
    }
}

/// Event log (ledger) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Object prefix the ledger rows are written under.
    #[serde(default = "default_ledger_prefix")]
    pub prefix: String,
    /// Constant marker stamped on every counted event.
    #[serde(default = "default_event_tag")]
    pub tag: String,
    /// Bound on a single ledger read/write during reconciliation.
    #[serde(default = "default_op_timeout_secs")]
    pub op_timeout_secs: u64,
    /// Disable to run log-less (counters live in memory and the local
    /// snapshot only).
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            prefix: default_ledger_prefix(),
            tag: default_event_tag(),
            op_timeout_secs: default_op_timeout_secs(),
            enabled: true,
        }
    }
}

impl LedgerConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_secs(self.op_timeout_secs)
    }
}

fn default_ledger_prefix() -> String {
    "ledger".to_string()
}

fn default_event_tag() -> String {
    "tally".to_string()
}

fn default_op_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

/// Write buffer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_batch: default_max_batch(),
            flush_interval_secs: default_flush_interval_secs(),
        }
    }
}

impl BufferConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs.max(1))
    }
}

fn default_max_batch() -> usize {
    100
}

fn default_flush_interval_secs() -> u64 {
    5
}

/// Crash-recovery snapshot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default = "default_snapshot_path")]
    pub path: String,
    #[serde(default = "default_snapshot_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: default_snapshot_path(),
            interval_secs: default_snapshot_interval_secs(),
        }
    }
}

impl SnapshotConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

fn default_snapshot_path() -> String {
    "state.json".to_string()
}

fn default_snapshot_interval_secs() -> u64 {
    300
}

/// Scheduled leaderboard publication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Local wall-clock time of the daily publication, "HH:MM".
    #[serde(default = "default_publish_time")]
    pub time: String,
    /// Buckets included in the published message, in order.
    #[serde(default = "default_publish_kinds")]
    pub kinds: Vec<String>,
    #[serde(default = "default_publish_header")]
    pub header: String,
    /// Clear the daily table after each scheduled publication.
    #[serde(default = "default_true")]
    pub reset_daily: bool,
    /// Limit each section to the top N users; absent means full ranking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_n: Option<usize>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            time: default_publish_time(),
            kinds: default_publish_kinds(),
            header: default_publish_header(),
            reset_daily: true,
            top_n: None,
        }
    }
}

fn default_publish_time() -> String {
    "21:00".to_string()
}

fn default_publish_kinds() -> Vec<String> {
    vec![
        "daily".to_string(),
        "weekly".to_string(),
        "monthly".to_string(),
        "alltime".to_string(),
    ]
}

fn default_publish_header() -> String {
    "Leaderboard".to_string()
}

/// Outbound notification webhook
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// POST target for rendered leaderboards; absent disables delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_notify_timeout_secs")]
    pub timeout_secs: u64,
}

impl NotifyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

fn default_notify_timeout_secs() -> u64 {
    10
}

/// Behavior when the event log is unreachable at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartupConfig {
    #[serde(default)]
    pub policy: StartupPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartupPolicy {
    /// Mutations stay gated until the first successful rebuild.
    #[default]
    Strict,
    /// Open the gate over the local snapshot if the rebuild fails.
    Permissive,
}

impl std::str::FromStr for StartupPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(StartupPolicy::Strict),
            "permissive" => Ok(StartupPolicy::Permissive),
            _ => anyhow::bail!(
                "Unsupported startup policy: {}. Supported: strict, permissive",
                s
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let config = RuntimeConfig::default();
        assert_eq!(config.timezone, "UTC");
        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.storage.backend, StorageBackend::Fs);
        assert!(config.storage.fs.is_some());
        assert_eq!(config.buffer.max_batch, 100);
        assert_eq!(config.buffer.flush_interval(), Duration::from_secs(5));
        assert!(config.ledger.enabled);
        assert!(config.notify.url.is_none());
        assert_eq!(config.startup.policy, StartupPolicy::Strict);
        config.validate().expect("default config must validate");
    }

    #[test]
    fn minimal_toml_parses_with_defaults() {
        let config: RuntimeConfig = toml::from_str(
            r#"
            timezone = "America/Los_Angeles"

            [publish]
            time = "20:30"
            kinds = ["daily", "alltime"]
            "#,
        )
        .unwrap();

        assert_eq!(config.timezone, "America/Los_Angeles");
        assert_eq!(config.publish.time, "20:30");
        assert_eq!(config.publish.kinds, vec!["daily", "alltime"]);
        assert_eq!(config.buffer.max_batch, 100);
        config.validate().unwrap();
    }

    #[test]
    fn backend_and_policy_parse_from_str() {
        assert_eq!(
            "memory".parse::<StorageBackend>().unwrap(),
            StorageBackend::Memory
        );
        assert!("s3".parse::<StorageBackend>().is_err());
        assert_eq!(
            "permissive".parse::<StartupPolicy>().unwrap(),
            StartupPolicy::Permissive
        );
    }
}

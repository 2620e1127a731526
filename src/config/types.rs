//! Configuration Types
//!
//! `config.yml` as read by the agent. Every key has a default except `token`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Placeholder shipped in the default template
pub const TOKEN_PLACEHOLDER: &str = "paste-your-token-here";

pub const DEFAULT_SERVER_URL: &str = "wss://your-backend.fly.dev/agent";

/// Top-level agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AgentConfig {
    pub server_url: String,
    pub token: String,
    /// Directory published to the server as `plugins/`
    pub data_root: PathBuf,
    pub connection: ConnectionConfig,
    pub files: FilesConfig,
    pub console: ConsoleConfig,
    pub modules: ModuleConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            token: String::new(),
            data_root: PathBuf::from("plugins"),
            connection: ConnectionConfig::default(),
            files: FilesConfig::default(),
            console: ConsoleConfig::default(),
            modules: ModuleConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Whether `token` holds something other than blank or the placeholder
    pub fn has_token(&self) -> bool {
        let token = self.token.trim();
        !token.is_empty() && token != TOKEN_PLACEHOLDER
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ConnectionConfig {
    pub heartbeat_interval_seconds: u64,
    pub reconnect_delay_seconds: u64,
    /// Largest file content (in characters) sent in one frame
    pub chunk_size: usize,
    pub chunk_pacing_millis: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_seconds: 30,
            reconnect_delay_seconds: 60,
            chunk_size: crate::protocol::DEFAULT_CHUNK_SIZE,
            chunk_pacing_millis: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FilesConfig {
    pub max_file_size: u64,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            max_file_size: crate::files::DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Host console integration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ConsoleConfig {
    /// File or FIFO the host reads console commands from, one per line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_pipe: Option<PathBuf>,
}

/// Per-module switches and tuning (`modules.<name>.*`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ModuleConfig {
    pub dashboard: DashboardModule,
    pub console: ConsoleModule,
    pub analytics: AnalyticsModule,
    pub economy: EconomyModule,
    pub performance: PerformanceModule,
    pub plugins: PluginsModule,
    pub quick_actions: Toggle,
    pub world_management: Toggle,
}

/// A module with nothing to tune
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Toggle {
    pub enabled: bool,
}

impl Default for Toggle {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DashboardModule {
    pub enabled: bool,
    pub metrics_interval_seconds: u64,
}

impl Default for DashboardModule {
    fn default() -> Self {
        Self {
            enabled: true,
            metrics_interval_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ConsoleModule {
    pub enabled: bool,
    pub buffer_size: usize,
    pub flush_interval_seconds: u64,
}

impl Default for ConsoleModule {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_size: 1000,
            flush_interval_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AnalyticsModule {
    pub enabled: bool,
    pub player_tracking: bool,
    pub batch_interval_seconds: u64,
}

impl Default for AnalyticsModule {
    fn default() -> Self {
        Self {
            enabled: true,
            player_tracking: true,
            batch_interval_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EconomyModule {
    pub enabled: bool,
    pub snapshot_interval_seconds: u64,
}

impl Default for EconomyModule {
    fn default() -> Self {
        Self {
            enabled: true,
            snapshot_interval_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PerformanceModule {
    pub enabled: bool,
    pub sample_interval_seconds: u64,
}

impl Default for PerformanceModule {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_interval_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PluginsModule {
    pub enabled: bool,
    pub allow_enable_disable: bool,
}

impl Default for PluginsModule {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_enable_disable: true,
        }
    }
}

impl AnalyticsModule {
    pub fn tracks_players(&self) -> bool {
        self.enabled && self.player_tracking
    }
}

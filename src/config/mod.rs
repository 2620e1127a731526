//! Configuration Management Module
//!
//! `config.yml` next to the agent: server endpoint, credentials, file limits
//! and per-module switches. Read at startup and on operator `reload`.

mod storage;
mod types;

pub use storage::{load, save_default, ConfigError};
pub use types::{
    AgentConfig, AnalyticsModule, ConnectionConfig, ConsoleConfig, ConsoleModule, DashboardModule,
    EconomyModule, FilesConfig, ModuleConfig, PerformanceModule, PluginsModule, Toggle,
    DEFAULT_SERVER_URL, TOKEN_PLACEHOLDER,
};

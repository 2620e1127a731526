//! Config file I/O.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::info;

use super::types::AgentConfig;

/// Written on first start so the operator has something to fill in.
const DEFAULT_TEMPLATE: &str = r#"# ConfigTool agent
server-url: "wss://your-backend.fly.dev/agent"
token: "paste-your-token-here"

# Directory published to the server as plugins/
data-root: "plugins"

connection:
  heartbeat-interval-seconds: 30
  reconnect-delay-seconds: 60
  chunk-size: 524288
  chunk-pacing-millis: 10

files:
  max-file-size: 1048576

# console:
#   command-pipe: "/run/minecraft/console.pipe"

modules:
  dashboard:
    enabled: true
    metrics-interval-seconds: 10
  console:
    enabled: true
    buffer-size: 1000
    flush-interval-seconds: 5
  analytics:
    enabled: true
    player-tracking: true
    batch-interval-seconds: 30
  economy:
    enabled: true
    snapshot-interval-seconds: 300
  performance:
    enabled: true
    sample-interval-seconds: 30
  plugins:
    enabled: true
    allow-enable-disable: true
  quick-actions:
    enabled: true
  world-management:
    enabled: true
"#;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("No token configured! Add your token to {0}")]
    MissingToken(PathBuf),
}

/// Load `path`, writing the default template first if it does not exist.
pub fn load(path: &Path) -> Result<AgentConfig, ConfigError> {
    if !path.exists() {
        save_default(path)?;
    }

    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config: AgentConfig = if text.trim().is_empty() {
        AgentConfig::default()
    } else {
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?
    };

    config.server_url = config.server_url.trim().to_string();
    config.token = config.token.trim().to_string();
    if !config.has_token() {
        return Err(ConfigError::MissingToken(path.to_path_buf()));
    }

    // A relative data root is relative to the config file
    if config.data_root.is_relative() {
        if let Some(parent) = path.parent() {
            config.data_root = parent.join(&config.data_root);
        }
    }

    Ok(config)
}

/// Write the default template to `path`, creating parent directories.
pub fn save_default(path: &Path) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, DEFAULT_TEMPLATE).map_err(io_err)?;
    info!("[config] Wrote default config to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_writes_template() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent/config.yml");

        assert!(matches!(load(&path), Err(ConfigError::MissingToken(_))));
        assert!(path.exists());

        // The template itself parses to the defaults
        let template: AgentConfig = serde_yaml::from_str(DEFAULT_TEMPLATE).unwrap();
        let defaults = AgentConfig::default();
        assert_eq!(template.server_url, defaults.server_url);
        assert_eq!(template.connection.chunk_size, defaults.connection.chunk_size);
        assert_eq!(template.files.max_file_size, defaults.files.max_file_size);
        assert_eq!(
            template.modules.economy.snapshot_interval_seconds,
            defaults.modules.economy.snapshot_interval_seconds
        );
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(
            &path,
            "server-url: ' ws://localhost:8080/agent '\ntoken: secret\nmodules:\n  economy:\n    enabled: false\n  plugins:\n    allow-enable-disable: false\n",
        )
        .unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.server_url, "ws://localhost:8080/agent");
        assert_eq!(config.token, "secret");
        assert_eq!(config.data_root, dir.path().join("plugins"));
        assert_eq!(config.connection.heartbeat_interval_seconds, 30);
        assert_eq!(config.connection.reconnect_delay_seconds, 60);
        assert!(!config.modules.economy.enabled);
        assert!(config.modules.plugins.enabled);
        assert!(!config.modules.plugins.allow_enable_disable);
        assert!(config.modules.quick_actions.enabled);
        assert!(config.console.command_pipe.is_none());
    }

    #[test]
    fn test_placeholder_token_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(&path, "token: '  paste-your-token-here '\n").unwrap();
        assert!(matches!(load(&path), Err(ConfigError::MissingToken(_))));

        fs::write(&path, "token: ''\n").unwrap();
        assert!(matches!(load(&path), Err(ConfigError::MissingToken(_))));
    }

    #[test]
    fn test_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(&path, "token: [unclosed\n").unwrap();
        assert!(matches!(load(&path), Err(ConfigError::Parse { .. })));
    }
}

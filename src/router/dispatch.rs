//! Request Router
//!
//! Turns one inbound envelope into at most one reply:
//!
//! - informational and unrecognized types are ignored (no reply)
//! - file operations run on the blocking pool
//! - host operations run on the control thread
//! - every failure becomes an `ERROR` envelope for the same `requestId`
//!
//! The router never touches the transport; the supervisor sends whatever
//! [`Reply`] comes back.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::policy::CommandPolicy;
use crate::config::AgentConfig;
use crate::files::{FileError, FileStore};
use crate::host::{ControlThread, HostControl, HostError};
use crate::protocol::{needs_chunking, split, Chunk, Envelope, Request, DEFAULT_CHUNK_SIZE};

/// Handler errors. `Display` is the text sent in `data.error`.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Command not allowed")]
    CommandNotAllowed,

    #[error("Invalid request: {0}")]
    InvalidParams(String),

    #[error("{0} not available")]
    Unavailable(&'static str),

    #[error(transparent)]
    File(#[from] FileError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// What the supervisor should transmit for a dispatched envelope.
#[derive(Debug)]
pub enum Reply {
    None,
    Single(Envelope),
    Chunked { request_id: String, chunks: Vec<Chunk> },
}

/// Feature switches and limits for the router.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// Largest `READ_FILE` content sent in a single `RESPONSE`.
    pub chunk_size: usize,
    pub quick_actions: bool,
    pub world_management: bool,
    pub plugin_toggle: bool,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            quick_actions: true,
            world_management: true,
            plugin_toggle: true,
        }
    }
}

impl RouterSettings {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            chunk_size: config.connection.chunk_size,
            quick_actions: config.modules.quick_actions.enabled,
            world_management: config.modules.world_management.enabled,
            plugin_toggle: config.modules.plugins.enabled
                && config.modules.plugins.allow_enable_disable,
        }
    }
}

enum Outcome {
    Data(Value),
    /// File content, chunked when it exceeds the frame budget
    Content(String),
}

/// Maps request types to handlers.
pub struct RequestRouter {
    files: Arc<FileStore>,
    policy: CommandPolicy,
    control: Option<ControlThread>,
    settings: RouterSettings,
}

impl RequestRouter {
    pub fn new(files: FileStore, settings: RouterSettings) -> Self {
        Self {
            files: Arc::new(files),
            policy: CommandPolicy::default(),
            control: None,
            settings,
        }
    }

    /// Attach the host; without one, host handlers answer "not available".
    pub fn with_control(mut self, control: ControlThread) -> Self {
        self.control = Some(control);
        self
    }

    /// Handle one inbound envelope.
    pub async fn dispatch(&self, envelope: Envelope) -> Reply {
        let kind = envelope.message_type();

        let request = match Request::parse(&envelope) {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!("[router] Ignoring message type {}", envelope.kind);
                return Reply::None;
            }
            Err(e) => {
                return match envelope.request_id {
                    Some(id) => {
                        warn!("[router] Bad {} params ({}): {}", envelope.kind, id, e);
                        Reply::Single(Envelope::error(
                            id,
                            RouteError::InvalidParams(e.to_string()).to_string(),
                        ))
                    }
                    None => {
                        warn!("[router] Bad {} params without requestId: {}", envelope.kind, e);
                        Reply::None
                    }
                };
            }
        };

        let Some(request_id) = envelope.request_id else {
            warn!("[router] {} without requestId dropped", kind.as_tag());
            return Reply::None;
        };

        match self.handle(request).await {
            Ok(Outcome::Data(data)) => Reply::Single(Envelope::response(request_id, data)),
            Ok(Outcome::Content(content)) => {
                if needs_chunking(&content, self.settings.chunk_size) {
                    let chunks = split(&content, self.settings.chunk_size);
                    info!(
                        "[router] Sending large file in {} chunks ({})",
                        chunks.len(),
                        request_id
                    );
                    Reply::Chunked { request_id, chunks }
                } else {
                    Reply::Single(Envelope::response(request_id, json!({ "content": content })))
                }
            }
            Err(RouteError::File(e)) if e.is_security_violation() => {
                warn!(
                    "[router] Blocked {} outside the sandbox ({}): {}",
                    kind.as_tag(),
                    request_id,
                    e
                );
                Reply::Single(Envelope::error(request_id, e.to_string()))
            }
            Err(e) => {
                warn!("[router] {} ({}) failed: {}", kind.as_tag(), request_id, e);
                Reply::Single(Envelope::error(request_id, e.to_string()))
            }
        }
    }

    async fn handle(&self, request: Request) -> Result<Outcome, RouteError> {
        match request {
            Request::ListFiles(p) => {
                info!(
                    "[router] Listing files in: {} (offset={}, limit={})",
                    p.directory, p.offset, p.limit
                );
                let listing = self
                    .on_files(move |fs| fs.list(&p.directory, p.offset, p.limit))
                    .await?;
                to_data(&listing)
            }
            Request::ReadFile(p) => {
                let content = self.on_files(move |fs| fs.read(&p.path)).await?;
                Ok(Outcome::Content(content))
            }
            Request::WriteFile(p) => {
                self.on_files(move |fs| fs.write(&p.path, &p.content)).await?;
                Ok(success())
            }
            Request::DeleteFile(p) => {
                self.on_files(move |fs| fs.delete(&p.path)).await?;
                Ok(success())
            }
            Request::CreateFile(p) => {
                self.on_files(move |fs| fs.create(&p.path, p.is_directory))
                    .await?;
                Ok(success())
            }
            Request::RenameFile(p) => {
                self.on_files(move |fs| fs.rename(&p.old_path, &p.new_path))
                    .await?;
                Ok(success())
            }
            Request::ExecuteCommand(p) => {
                if !self.policy.is_allowed(&p.command) {
                    warn!("[router] Refused console command: {}", p.command);
                    return Err(RouteError::CommandNotAllowed);
                }
                let output = self
                    .on_control("Command execution", true, move |host| {
                        host.execute_command(&p.command)
                    })
                    .await?;
                Ok(Outcome::Data(json!({
                    "output": output.unwrap_or_else(|| "Command executed".to_string())
                })))
            }
            Request::Broadcast(p) => {
                self.on_control("Quick actions", self.settings.quick_actions, move |host| {
                    host.broadcast(&p.message)
                })
                .await?;
                Ok(action_done("Broadcast sent"))
            }
            Request::KickPlayer(p) => {
                self.on_control("Quick actions", self.settings.quick_actions, move |host| {
                    host.kick_player(&p.player_name, &p.reason)
                })
                .await?;
                Ok(action_done("Player kicked"))
            }
            Request::ToggleWhitelist(p) => {
                let enabled = p.enabled;
                self.on_control("Quick actions", self.settings.quick_actions, move |host| {
                    host.set_whitelist(enabled)
                })
                .await?;
                Ok(action_done(if enabled {
                    "Whitelist enabled"
                } else {
                    "Whitelist disabled"
                }))
            }
            Request::GetWorlds => {
                let worlds = self
                    .on_control("World management", self.settings.world_management, |host| {
                        host.worlds()
                    })
                    .await?;
                Ok(Outcome::Data(json!({ "success": true, "worlds": worlds })))
            }
            Request::SetGamerule(p) => {
                self.on_control("World management", self.settings.world_management, move |host| {
                    host.set_gamerule(&p.world_name, &p.rule, &p.value)
                })
                .await?;
                Ok(action_done("Gamerule set"))
            }
            Request::GetPlugins => {
                let plugins = self
                    .on_control("Plugin management", true, |host| host.plugins())
                    .await?;
                Ok(Outcome::Data(json!({ "success": true, "plugins": plugins })))
            }
            Request::EnablePlugin(p) => {
                self.on_control("Plugin management", self.settings.plugin_toggle, move |host| {
                    host.enable_plugin(&p.plugin_name)
                })
                .await?;
                Ok(action_done("Plugin enabled"))
            }
            Request::DisablePlugin(p) => {
                self.on_control("Plugin management", self.settings.plugin_toggle, move |host| {
                    host.disable_plugin(&p.plugin_name)
                })
                .await?;
                Ok(action_done("Plugin disabled"))
            }
        }
    }

    /// Run a file operation on the blocking pool.
    async fn on_files<T, F>(&self, op: F) -> Result<T, RouteError>
    where
        F: FnOnce(&FileStore) -> Result<T, FileError> + Send + 'static,
        T: Send + 'static,
    {
        let files = self.files.clone();
        tokio::task::spawn_blocking(move || op(&files))
            .await
            .map_err(|e| RouteError::Internal(e.to_string()))?
            .map_err(RouteError::from)
    }

    /// Run a host operation on the control thread, if the capability is on.
    async fn on_control<T, F>(
        &self,
        capability: &'static str,
        enabled: bool,
        op: F,
    ) -> Result<T, RouteError>
    where
        F: FnOnce(&mut dyn HostControl) -> Result<T, HostError> + Send + 'static,
        T: Send + 'static,
    {
        let control = match &self.control {
            Some(control) if enabled => control,
            _ => return Err(RouteError::Unavailable(capability)),
        };
        Ok(control.run(op).await?)
    }
}

fn to_data<T: Serialize>(value: &T) -> Result<Outcome, RouteError> {
    serde_json::to_value(value)
        .map(Outcome::Data)
        .map_err(|e| RouteError::Internal(e.to_string()))
}

fn success() -> Outcome {
    Outcome::Data(json!({ "success": true }))
}

fn action_done(output: &str) -> Outcome {
    Outcome::Data(json!({ "success": true, "output": output }))
}

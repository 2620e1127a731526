//! Host control surface and the single control thread.
//!
//! Anything that mutates live server state (console commands, broadcasts,
//! plugin toggles) is not safe to run concurrently, so the host is owned by
//! one dedicated thread and handlers submit closures to it:
//!
//! ```text
//! handler task ──job──▸ ┌────────────────┐
//! handler task ──job──▸ │ control thread │ ──▸ &mut dyn HostControl
//! handler task ──job──▸ └────────────────┘
//!        ◂──────────── oneshot reply ───┘
//! ```

use std::collections::BTreeMap;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

/// Host collaborator errors.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("{0} is not supported by this host")]
    Unsupported(&'static str),

    #[error("Unknown world: {0}")]
    UnknownWorld(String),

    #[error("Unknown plugin: {0}")]
    UnknownPlugin(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Control thread stopped")]
    ControlThreadGone,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// World summary returned by `GET_WORLDS`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldInfo {
    pub world_name: String,
    /// Environment name, e.g. `NORMAL`, `NETHER`, `THE_END`
    pub world_type: String,
    pub seed: i64,
    pub difficulty: String,
    pub player_count: u32,
    pub size_mb: u64,
    pub gamerules: BTreeMap<String, String>,
    pub border_center_x: f64,
    pub border_center_z: f64,
    pub border_size: f64,
}

/// Plugin summary returned by `GET_PLUGINS`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub authors: String,
    pub enabled: bool,
    pub dependencies: String,
    pub soft_dependencies: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

/// The host application as seen by request handlers.
///
/// Only `execute_command` is required. Quick actions fall back to the
/// equivalent console commands; listing and plugin toggles need real host
/// integration and report `Unsupported` otherwise.
pub trait HostControl: Send + 'static {
    /// Run a console command. Hosts that capture output return it.
    fn execute_command(&mut self, command: &str) -> Result<Option<String>, HostError>;

    fn broadcast(&mut self, message: &str) -> Result<(), HostError> {
        self.execute_command(&format!("say {}", message)).map(|_| ())
    }

    fn kick_player(&mut self, player: &str, reason: &str) -> Result<(), HostError> {
        self.execute_command(&format!("kick {} {}", player, reason))
            .map(|_| ())
    }

    fn set_whitelist(&mut self, enabled: bool) -> Result<(), HostError> {
        let state = if enabled { "on" } else { "off" };
        self.execute_command(&format!("whitelist {}", state))
            .map(|_| ())
    }

    fn set_gamerule(&mut self, _world: &str, rule: &str, value: &str) -> Result<(), HostError> {
        self.execute_command(&format!("gamerule {} {}", rule, value))
            .map(|_| ())
    }

    fn worlds(&mut self) -> Result<Vec<WorldInfo>, HostError> {
        Err(HostError::Unsupported("World listing"))
    }

    fn plugins(&mut self) -> Result<Vec<PluginInfo>, HostError> {
        Err(HostError::Unsupported("Plugin listing"))
    }

    fn enable_plugin(&mut self, _name: &str) -> Result<(), HostError> {
        Err(HostError::Unsupported("Enabling plugins"))
    }

    fn disable_plugin(&mut self, _name: &str) -> Result<(), HostError> {
        Err(HostError::Unsupported("Disabling plugins"))
    }
}

type Job = Box<dyn FnOnce(&mut dyn HostControl) + Send>;

/// Handle to the thread that owns the host. Cheap to clone.
#[derive(Clone)]
pub struct ControlThread {
    jobs: mpsc::UnboundedSender<Job>,
}

impl ControlThread {
    /// Move `host` onto a new thread named `control`.
    pub fn spawn<H: HostControl>(mut host: H) -> io::Result<Self> {
        let (jobs, mut rx) = mpsc::unbounded_channel::<Job>();

        std::thread::Builder::new()
            .name("control".to_string())
            .spawn(move || {
                while let Some(job) = rx.blocking_recv() {
                    // A panicking job drops its reply sender; the caller sees
                    // ControlThreadGone and the thread keeps serving.
                    if catch_unwind(AssertUnwindSafe(|| job(&mut host))).is_err() {
                        error!("[control] Host job panicked");
                    }
                }
                debug!("[control] Control thread exiting");
            })?;

        Ok(Self { jobs })
    }

    /// Run `op` on the control thread and wait for its result.
    pub async fn run<T, F>(&self, op: F) -> Result<T, HostError>
    where
        F: FnOnce(&mut dyn HostControl) -> Result<T, HostError> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |host: &mut dyn HostControl| {
            let _ = reply_tx.send(op(host));
        });

        self.jobs
            .send(job)
            .map_err(|_| HostError::ControlThreadGone)?;
        reply_rx.await.map_err(|_| HostError::ControlThreadGone)?
    }
}

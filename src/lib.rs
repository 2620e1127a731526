//! ConfigTool agent
//!
//! Keeps one outbound WebSocket connection to the ConfigTool server and
//! answers its requests: sandboxed config file access under `plugins/`,
//! allow-listed console commands, quick actions, plus periodic telemetry
//! pushes.
//!
//! ```text
//! ┌────────────┐   ┌───────────────────────┐   ┌───────────────┐
//! │  Server    │◂─▸│ ConnectionSupervisor  │──▸│ RequestRouter │
//! └────────────┘   └───────────────────────┘   └──────┬────────┘
//!                        ▲ Outbound                   │
//!                        │                 ┌──────────┴──────────┐
//!                 ┌──────┴──────┐          ▼                     ▼
//!                 │  telemetry  │   ┌────────────┐      ┌────────────────┐
//!                 └─────────────┘   │ FileStore  │      │ ControlThread  │
//!                                   └────────────┘      └────────────────┘
//! ```

pub mod config;
pub mod connection;
pub mod files;
pub mod host;
pub mod protocol;
pub mod router;
pub mod telemetry;

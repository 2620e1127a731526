//! Host application integration.
//!
//! The agent never touches live server state directly; it goes through a
//! [`HostControl`] owned by the [`ControlThread`].

mod control;
mod pipe;

pub use control::{ControlThread, HostControl, HostError, PluginInfo, WorldInfo};
pub use pipe::PipeHost;

//! Console pipe host
//!
//! Feeds commands to a server console that reads from a file or FIFO, one
//! command per line. Opening a FIFO blocks until the server side has it open;
//! that wait happens on the control thread.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use tracing::info;

use super::control::{HostControl, HostError};

pub struct PipeHost {
    path: PathBuf,
}

impl PipeHost {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl HostControl for PipeHost {
    fn execute_command(&mut self, command: &str) -> Result<Option<String>, HostError> {
        let command = command.trim();
        if command.is_empty() || command.chars().any(char::is_control) {
            return Err(HostError::CommandFailed(
                "command must be a single non-empty line".to_string(),
            ));
        }

        let mut pipe = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(pipe, "{}", command)?;
        pipe.flush()?;

        info!("[control] Dispatched console command: {}", command);
        Ok(None)
    }
}

//! Agent process samples for `PERFORMANCE_DATA` pushes.

use serde_json::{json, Value};
use sysinfo::{Pid, ProcessesToUpdate, System};

use super::TelemetrySource;
use crate::protocol::PushKind;

pub struct PerformanceTracker {
    system: System,
    pid: Option<Pid>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySource for PerformanceTracker {
    fn kind(&self) -> PushKind {
        PushKind::Performance
    }

    fn sample(&mut self) -> Option<Value> {
        let pid = self.pid?;
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let process = self.system.process(pid)?;

        Some(json!({
            "processCpuPercent": process.cpu_usage(),
            "processMemoryMb": process.memory() / (1024 * 1024),
            "threadCount": process.tasks().map(|tasks| tasks.len()),
            "runTimeSeconds": process.run_time(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_own_process() {
        let mut tracker = PerformanceTracker::new();
        let sample = tracker.sample().unwrap();
        assert!(sample["processMemoryMb"].is_u64());
        assert!(sample.get("processCpuPercent").is_some());
    }
}

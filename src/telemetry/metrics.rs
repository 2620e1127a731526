//! Host metrics for `METRICS_BATCH` pushes.

use std::path::Path;
use std::time::Instant;

use serde_json::{json, Value};
use sysinfo::{Disks, System};

use super::TelemetrySource;
use crate::protocol::PushKind;

const MB: u64 = 1024 * 1024;

/// CPU, memory and disk usage of the machine the agent runs on.
pub struct MetricsCollector {
    system: System,
    disks: Disks,
    /// Disk holding the published directory, resolved once at startup
    disk_index: Option<usize>,
    started: Instant,
}

impl MetricsCollector {
    pub fn new(disk_root: impl AsRef<Path>) -> Self {
        let mut system = System::new();
        // Prime the CPU counters so the first sample has a baseline
        system.refresh_cpu_usage();
        let disks = Disks::new_with_refreshed_list();
        let disk_index = disk_for(&disks, disk_root.as_ref());
        Self {
            system,
            disks,
            disk_index,
            started: Instant::now(),
        }
    }

    /// `(used, total)` bytes of the published directory's disk. Only that
    /// disk is refreshed; the disk list is never rescanned.
    fn disk_usage(&mut self) -> Option<(u64, u64)> {
        let disk = self.disks.list_mut().get_mut(self.disk_index?)?;
        disk.refresh();
        let total = disk.total_space();
        Some((total.saturating_sub(disk.available_space()), total))
    }
}

/// Index of the disk whose mount point is the longest prefix of `path`.
fn disk_for(disks: &Disks, path: &Path) -> Option<usize> {
    let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    disks
        .list()
        .iter()
        .enumerate()
        .filter(|(_, disk)| path.starts_with(disk.mount_point()))
        .max_by_key(|(_, disk)| disk.mount_point().as_os_str().len())
        .map(|(index, _)| index)
}

fn round1(value: f32) -> f64 {
    (f64::from(value) * 10.0).round() / 10.0
}

impl TelemetrySource for MetricsCollector {
    fn kind(&self) -> PushKind {
        PushKind::Metrics
    }

    fn sample(&mut self) -> Option<Value> {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();

        let (disk_used, disk_total) = self.disk_usage().unwrap_or((0, 0));

        Some(json!({
            "cpuPercent": round1(self.system.global_cpu_usage()),
            "ramUsedMb": self.system.used_memory() / MB,
            "ramMaxMb": self.system.total_memory() / MB,
            "diskUsedMb": disk_used / MB,
            "diskTotalMb": disk_total / MB,
            "uptimeSeconds": self.started.elapsed().as_secs(),
            "systemUptimeSeconds": System::uptime(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_shape() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut collector = MetricsCollector::new(dir.path());
        let sample = collector.sample().unwrap();

        for key in [
            "cpuPercent",
            "ramUsedMb",
            "ramMaxMb",
            "diskUsedMb",
            "diskTotalMb",
            "uptimeSeconds",
        ] {
            assert!(sample.get(key).is_some(), "missing {key}");
        }
        assert!(sample["ramMaxMb"].as_u64().unwrap() > 0);
        assert!(sample["ramUsedMb"].as_u64() <= sample["ramMaxMb"].as_u64());
    }

    #[test]
    fn test_disk_resolved_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut collector = MetricsCollector::new(dir.path());
        let index = collector.disk_index;
        let listed = collector.disks.list().len();

        let first = collector.sample().unwrap();
        let second = collector.sample().unwrap();
        assert_eq!(collector.disk_index, index);
        assert_eq!(collector.disks.list().len(), listed);
        assert_eq!(first["diskTotalMb"], second["diskTotalMb"]);
        if index.is_none() {
            assert_eq!(first["diskTotalMb"], 0);
        }
    }

    #[test]
    fn test_round1() {
        assert_eq!(round1(12.345), 12.3);
        assert_eq!(round1(0.0), 0.0);
    }
}

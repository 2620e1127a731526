//! Telemetry producers
//!
//! Each producer is a [`TelemetrySource`] sampled on its own interval and
//! pushed without a `requestId`:
//!
//! ```text
//! ┌───────────────────┐  sample()  ┌───────────────┐  push   ┌──────────┐
//! │ TelemetrySource   │ ─────────▸ │ producer task │ ──────▸ │ Outbound │
//! └───────────────────┘            └───────────────┘         └──────────┘
//! ```
//!
//! Ticks are skipped while the connection is not open, so buffered sources
//! keep their data until the next tick that can deliver it.

mod console;
mod economy;
mod metrics;
mod performance;
mod players;

use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::connection::Outbound;
use crate::protocol::{Envelope, PushKind};

pub use console::{ConsoleBuffer, ConsoleCapture, ConsoleEntry, ConsoleSource};
pub use economy::{BalanceProvider, EconomyTracker};
pub use metrics::MetricsCollector;
pub use performance::PerformanceTracker;
pub use players::{hash_ip, PlayerEvent, PlayerEventKind, PlayerEvents};

/// Most entries sent in one batch push.
pub const MAX_BATCH: usize = 200;

/// Something that periodically produces a push payload.
pub trait TelemetrySource: Send + 'static {
    fn kind(&self) -> PushKind;

    /// Payload for this tick, or `None` when there is nothing to send.
    fn sample(&mut self) -> Option<Value>;
}

/// Sample `source` every `period` (first tick after one period) until
/// `cancel` fires.
pub fn spawn_producer<S: TelemetrySource>(
    mut source: S,
    period: Duration,
    outbound: Outbound,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if !outbound.is_open() {
                        continue;
                    }
                    let Some(data) = source.sample() else {
                        continue;
                    };
                    let kind = source.kind();
                    if let Err(e) = outbound.send(Envelope::push(kind, data)) {
                        debug!("[telemetry] {} push dropped: {}", kind.message_type().as_tag(), e);
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionSettings, ConnectionSupervisor};
    use crate::files::{FileStore, DEFAULT_MAX_FILE_SIZE};
    use crate::router::{RequestRouter, RouterSettings};
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct Counting(Arc<Mutex<u32>>);

    impl TelemetrySource for Counting {
        fn kind(&self) -> PushKind {
            PushKind::Metrics
        }

        fn sample(&mut self) -> Option<Value> {
            *self.0.lock() += 1;
            Some(Value::Null)
        }
    }

    #[tokio::test]
    async fn test_producer_idle_while_disconnected() {
        let dir = tempfile::TempDir::new().unwrap();
        let router = RequestRouter::new(
            FileStore::new(dir.path(), DEFAULT_MAX_FILE_SIZE),
            RouterSettings::default(),
        );
        let supervisor =
            ConnectionSupervisor::new(ConnectionSettings::new("ws://127.0.0.1:1/agent", "t"), router);

        let samples = Arc::new(Mutex::new(0));
        let cancel = CancellationToken::new();
        let handle = spawn_producer(
            Counting(samples.clone()),
            Duration::from_millis(10),
            supervisor.outbound(),
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_millis(80)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(*samples.lock(), 0);
    }
}

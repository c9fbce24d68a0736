//! Scheduler module: drives recurring probe batches.

mod batch;

pub use batch::*;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::db::Store;
use crate::probe::Probe;

/// Scheduler tuning knobs.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between batch runs.
    pub interval: Duration,
    /// Maximum in-flight probes per batch.
    pub concurrency: usize,
}

struct RunningLoop {
    stop_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

/// An owned scheduler instance.
///
/// Holds its own lifecycle state, so multiple independent schedulers can
/// coexist (useful in tests). `start` and `stop` are both idempotent.
pub struct Scheduler {
    store: Arc<Store>,
    prober: Arc<dyn Probe>,
    config: SchedulerConfig,
    state: Mutex<Option<RunningLoop>>,
}

impl Scheduler {
    pub fn new(store: Arc<Store>, prober: Arc<dyn Probe>, config: SchedulerConfig) -> Self {
        Self {
            store,
            prober,
            config,
            state: Mutex::new(None),
        }
    }

    /// Start the repeating probe loop. A no-op when already running.
    pub async fn start(&self) {
        let mut state = self.state.lock().await;
        if state.is_some() {
            tracing::warn!("Scheduler already running");
            return;
        }

        let (stop_tx, stop_rx) = broadcast::channel(1);
        let store = self.store.clone();
        let prober = self.prober.clone();
        let config = self.config.clone();

        let handle = tokio::spawn(run_loop(store, prober, config, stop_rx));
        *state = Some(RunningLoop { stop_tx, handle });

        tracing::info!(
            "Scheduler started with interval of {:?}",
            self.config.interval
        );
    }

    /// Stop the loop and wait for the current iteration to unwind.
    ///
    /// Cancels any in-flight batch; nothing from a cancelled iteration is
    /// committed. A no-op when already stopped.
    pub async fn stop(&self) {
        let running = self.state.lock().await.take();

        if let Some(running) = running {
            let _ = running.stop_tx.send(());
            let _ = running.handle.await;
            tracing::info!("Scheduler stopped");
        }
    }

    /// Whether the probe loop is currently running.
    pub async fn is_running(&self) -> bool {
        self.state.lock().await.is_some()
    }
}

async fn run_loop(
    store: Arc<Store>,
    prober: Arc<dyn Probe>,
    config: SchedulerConfig,
    mut stop_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(config.interval);
    // A slow batch delays the next tick; batches never overlap
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            _ = interval.tick() => {
                tokio::select! {
                    // Dropping the iteration future aborts its probe tasks
                    _ = stop_rx.recv() => break,
                    result = run_iteration(&store, &prober, config.concurrency) => {
                        if let Err(e) = result {
                            tracing::error!("Scheduler iteration failed: {}", e);
                        }
                    }
                }
            }
        }
    }
}

async fn run_iteration(
    store: &Arc<Store>,
    prober: &Arc<dyn Probe>,
    concurrency: usize,
) -> Result<(), crate::db::DbError> {
    // Fetch fresh each tick so added/removed targets apply without restart
    let targets = store.get_targets()?;
    if targets.is_empty() {
        tracing::debug!("No targets to probe");
        return Ok(());
    }

    let count = targets.len();
    let committed = run_batch(store, prober.clone(), targets, concurrency).await?;
    tracing::info!("Probed {} targets, committed {} records", count, committed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CheckOutcome, CheckStatus, Target};
    use async_trait::async_trait;
    use chrono::Utc;
    use tempfile::NamedTempFile;

    struct InstantProber;

    #[async_trait]
    impl Probe for InstantProber {
        async fn probe(&self, _url: &str) -> CheckOutcome {
            CheckOutcome {
                status: CheckStatus::Up,
                response_time_ms: Some(1.0),
            }
        }
    }

    /// Prober whose probes never finish within a test run.
    struct StuckProber;

    #[async_trait]
    impl Probe for StuckProber {
        async fn probe(&self, _url: &str) -> CheckOutcome {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            CheckOutcome::down()
        }
    }

    fn scheduler_with(
        prober: Arc<dyn Probe>,
        interval: Duration,
    ) -> (NamedTempFile, Arc<Store>, Scheduler) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        let mut target = Target {
            name: "t".to_string(),
            url: "http://t.test".to_string(),
            ..Default::default()
        };
        store.add_target(&mut target).unwrap();

        let scheduler = Scheduler::new(
            store.clone(),
            prober,
            SchedulerConfig {
                interval,
                concurrency: 10,
            },
        );
        (tmp, store, scheduler)
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let (_tmp, _store, scheduler) =
            scheduler_with(Arc::new(InstantProber), Duration::from_millis(10));

        assert!(!scheduler.is_running().await);

        scheduler.start().await;
        scheduler.start().await; // no-op
        assert!(scheduler.is_running().await);

        scheduler.stop().await;
        assert!(!scheduler.is_running().await);
        scheduler.stop().await; // no-op

        // stop then start leaves the scheduler running again
        scheduler.start().await;
        assert!(scheduler.is_running().await);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_loop_commits_records() {
        let (_tmp, store, scheduler) =
            scheduler_with(Arc::new(InstantProber), Duration::from_millis(20));

        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop().await;

        let records = store
            .query_range(1, Utc::now() - chrono::Duration::hours(1), Utc::now())
            .unwrap();
        assert!(!records.is_empty());
    }

    #[tokio::test]
    async fn test_stop_cancels_in_flight_batch() {
        let (_tmp, store, scheduler) =
            scheduler_with(Arc::new(StuckProber), Duration::from_millis(10));

        scheduler.start().await;
        // Let the first iteration get stuck mid-probe
        tokio::time::sleep(Duration::from_millis(50)).await;

        // stop must not wait out the stuck probe
        tokio::time::timeout(Duration::from_secs(1), scheduler.stop())
            .await
            .expect("stop did not return promptly");

        // The cancelled iteration committed nothing
        let records = store
            .query_range(1, Utc::now() - chrono::Duration::hours(1), Utc::now())
            .unwrap();
        assert!(records.is_empty());
    }
}

//! Monitor facade: the API exposed to callers.
//!
//! Wires the prober, scheduler, and aggregator over one store, the way a
//! presentation layer would consume them. Transport is out of scope here.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::aggregate::{bucketize, bucketize_many, Bucket, Resolution};
use crate::config::Config;
use crate::db::{CheckRecord, DbError, Store};
use crate::probe::{HttpProber, Probe};
use crate::scheduler::{self, Scheduler, SchedulerConfig};

pub struct Monitor {
    store: Arc<Store>,
    prober: Arc<dyn Probe>,
    scheduler: Scheduler,
    concurrency: usize,
}

impl Monitor {
    /// Build a monitor with the standard HTTP prober.
    pub fn new(config: &Config, store: Arc<Store>) -> Result<Self, reqwest::Error> {
        let prober: Arc<dyn Probe> = Arc::new(HttpProber::new(config.probe_timeout())?);
        Ok(Self::with_prober(config, store, prober))
    }

    /// Build a monitor around an injected prober.
    pub fn with_prober(config: &Config, store: Arc<Store>, prober: Arc<dyn Probe>) -> Self {
        let scheduler = Scheduler::new(
            store.clone(),
            prober.clone(),
            SchedulerConfig {
                interval: config.probe_interval(),
                concurrency: config.probe_concurrency,
            },
        );

        Self {
            store,
            prober,
            scheduler,
            concurrency: config.probe_concurrency,
        }
    }

    /// Probe every current target once, outside the schedule.
    pub async fn run_batch_now(&self) -> Result<usize, DbError> {
        let targets = self.store.get_targets()?;
        scheduler::run_batch(&self.store, self.prober.clone(), targets, self.concurrency).await
    }

    /// Probe one target on demand. `None` when the target does not exist.
    pub async fn probe_one(&self, target_id: i64) -> Result<Option<CheckRecord>, DbError> {
        scheduler::probe_one(&self.store, self.prober.as_ref(), target_id).await
    }

    pub async fn start_scheduler(&self) {
        self.scheduler.start().await;
    }

    pub async fn stop_scheduler(&self) {
        self.scheduler.stop().await;
    }

    pub async fn scheduler_running(&self) -> bool {
        self.scheduler.is_running().await
    }

    /// Bucketed status timeline for one target, ending now.
    /// `None` when the target does not exist.
    pub fn get_buckets(
        &self,
        target_id: i64,
        bucket_count: usize,
        resolution: Resolution,
    ) -> Result<Option<Vec<Bucket>>, DbError> {
        match self.store.get_target(target_id) {
            Ok(_) => {}
            Err(DbError::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        }

        let now = Utc::now();
        Ok(Some(bucketize(
            &self.store,
            target_id,
            now,
            bucket_count,
            resolution,
        )?))
    }

    /// Bucketed timelines for many targets with one fetch and one shared
    /// `now` snapshot.
    pub fn get_buckets_bulk(
        &self,
        target_ids: &[i64],
        bucket_count: usize,
        resolution: Resolution,
    ) -> Result<HashMap<i64, Vec<Bucket>>, DbError> {
        let now = Utc::now();
        bucketize_many(&self.store, target_ids, now, bucket_count, resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::StatusTier;
    use crate::db::{CheckOutcome, CheckStatus, Target};
    use async_trait::async_trait;
    use tempfile::NamedTempFile;

    struct UpProber;

    #[async_trait]
    impl Probe for UpProber {
        async fn probe(&self, _url: &str) -> CheckOutcome {
            CheckOutcome {
                status: CheckStatus::Up,
                response_time_ms: Some(12.0),
            }
        }
    }

    fn test_monitor() -> (NamedTempFile, Arc<Store>, Monitor) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        let monitor = Monitor::with_prober(&Config::default(), store.clone(), Arc::new(UpProber));
        (tmp, store, monitor)
    }

    #[tokio::test]
    async fn test_run_batch_now_and_get_buckets() {
        let (_tmp, store, monitor) = test_monitor();

        let mut target = Target {
            name: "api".to_string(),
            url: "http://api.test".to_string(),
            ..Default::default()
        };
        let id = store.add_target(&mut target).unwrap();

        let committed = monitor.run_batch_now().await.unwrap();
        assert_eq!(committed, 1);

        let buckets = monitor.get_buckets(id, 24, Resolution::Hour).unwrap().unwrap();
        assert_eq!(buckets.len(), 24);
        assert_eq!(buckets[23].checks, 1);
        assert_eq!(buckets[23].status, StatusTier::Up);

        // Unknown target is a not-found, not an error
        assert!(monitor.get_buckets(9999, 24, Resolution::Hour).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_probe_one_not_found() {
        let (_tmp, _store, monitor) = test_monitor();
        assert!(monitor.probe_one(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bulk_buckets() {
        let (_tmp, store, monitor) = test_monitor();

        let ids: Vec<i64> = (0..2)
            .map(|i| {
                let mut target = Target {
                    name: format!("t{}", i),
                    url: format!("http://t{}.test", i),
                    ..Default::default()
                };
                store.add_target(&mut target).unwrap()
            })
            .collect();

        monitor.run_batch_now().await.unwrap();

        let bulk = monitor.get_buckets_bulk(&ids, 6, Resolution::Hour).unwrap();
        assert_eq!(bulk.len(), 2);
        for id in ids {
            assert_eq!(bulk[&id].len(), 6);
            assert_eq!(bulk[&id][5].checks, 1);
        }
    }
}

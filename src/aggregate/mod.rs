//! Aggregation engine: condenses raw check records into aligned,
//! fixed-resolution status buckets.
//!
//! All bucket boundaries are derived from a single `now` passed in by the
//! caller, so one aggregation call stays internally consistent even when it
//! straddles an hour or day boundary while running.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{CheckRecord, CheckStatus, DbError, Store};
use crate::probe::round2;

/// Average response time at or above which a fully-up bucket is
/// classified as degraded.
const DEGRADED_LATENCY_MS: f64 = 1000.0;

/// Bucket width for aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Hour,
    Day,
}

impl Resolution {
    pub fn seconds(&self) -> i64 {
        match self {
            Resolution::Hour => 3600,
            Resolution::Day => 86400,
        }
    }

    pub fn step(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.seconds())
    }

    /// Truncate a datetime to the start of its containing bucket.
    pub fn truncate(&self, dt: DateTime<Utc>) -> DateTime<Utc> {
        let ts = dt.timestamp();
        let truncated = ts - ts.rem_euclid(self.seconds());
        DateTime::from_timestamp(truncated, 0).unwrap_or(dt)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hour" => Some(Resolution::Hour),
            "day" => Some(Resolution::Day),
            _ => None,
        }
    }
}

/// Five-level bucket classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusTier {
    Unknown,
    Down,
    Partial,
    Degraded,
    Up,
}

/// One aligned time slice summarizing the checks that fell inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub start: DateTime<Utc>,
    pub status: StatusTier,
    pub uptime_percentage: f64,
    pub checks: i64,
    pub avg_response_time_ms: Option<f64>,
}

/// Per-bucket accumulator used while grouping records.
#[derive(Debug, Default, Clone)]
struct GroupAcc {
    total: i64,
    up: i64,
    response_time_sum: f64,
    response_time_count: i64,
}

/// Classify a bucket from its raw (unrounded) statistics.
///
/// First match wins: no checks -> unknown; uptime < 50 -> down;
/// 50..100 -> partial; 100 with slow average -> degraded; else up.
fn classify_tier(total: i64, uptime_pct: f64, avg_latency_ms: f64) -> StatusTier {
    if total == 0 {
        StatusTier::Unknown
    } else if uptime_pct < 50.0 {
        StatusTier::Down
    } else if uptime_pct < 100.0 {
        StatusTier::Partial
    } else if avg_latency_ms >= DEGRADED_LATENCY_MS {
        StatusTier::Degraded
    } else {
        StatusTier::Up
    }
}

fn group_records(
    records: &[CheckRecord],
    resolution: Resolution,
) -> HashMap<DateTime<Utc>, GroupAcc> {
    let mut grouped: HashMap<DateTime<Utc>, GroupAcc> = HashMap::new();

    for record in records {
        let key = resolution.truncate(record.timestamp);
        let acc = grouped.entry(key).or_default();

        acc.total += 1;
        if record.status == CheckStatus::Up {
            acc.up += 1;
        }
        if let Some(rt) = record.response_time_ms {
            acc.response_time_sum += rt;
            acc.response_time_count += 1;
        }
    }

    grouped
}

/// Emit exactly `bucket_count` chronological buckets ending at the bucket
/// that contains `now` (which may still be partially populated).
fn fill_buckets(
    grouped: &HashMap<DateTime<Utc>, GroupAcc>,
    now: DateTime<Utc>,
    bucket_count: usize,
    resolution: Resolution,
) -> Vec<Bucket> {
    let step = resolution.step();
    let mut current = resolution.truncate(now) - step * (bucket_count.saturating_sub(1) as i32);
    let mut buckets = Vec::with_capacity(bucket_count);

    for _ in 0..bucket_count {
        let empty = GroupAcc::default();
        let acc = grouped.get(&current).unwrap_or(&empty);

        let uptime_pct = if acc.total > 0 {
            acc.up as f64 / acc.total as f64 * 100.0
        } else {
            0.0
        };
        let avg_latency = if acc.response_time_count > 0 {
            acc.response_time_sum / acc.response_time_count as f64
        } else {
            0.0
        };

        buckets.push(Bucket {
            start: current,
            status: classify_tier(acc.total, uptime_pct, avg_latency),
            uptime_percentage: round2(uptime_pct),
            checks: acc.total,
            avg_response_time_ms: if acc.response_time_count > 0 {
                Some(round2(avg_latency))
            } else {
                None
            },
        });

        current += step;
    }

    buckets
}

/// Aggregate one target's records over `[now - bucket_count*resolution, now)`
/// into exactly `bucket_count` aligned buckets, earliest first.
pub fn bucketize(
    store: &Store,
    target_id: i64,
    now: DateTime<Utc>,
    bucket_count: usize,
    resolution: Resolution,
) -> Result<Vec<Bucket>, DbError> {
    let since = now - resolution.step() * (bucket_count as i32);
    let records = store.query_range(target_id, since, now)?;

    Ok(fill_buckets(
        &group_records(&records, resolution),
        now,
        bucket_count,
        resolution,
    ))
}

/// Bulk variant of [`bucketize`]: one grouped fetch instead of N.
///
/// Produces bucket-for-bucket the same output as calling [`bucketize`] per
/// target with the same `now`. Every requested id appears in the map, as
/// all-unknown buckets when it has no records.
pub fn bucketize_many(
    store: &Store,
    target_ids: &[i64],
    now: DateTime<Utc>,
    bucket_count: usize,
    resolution: Resolution,
) -> Result<HashMap<i64, Vec<Bucket>>, DbError> {
    let since = now - resolution.step() * (bucket_count as i32);
    let records = store.query_range_many(target_ids, since, now)?;

    let mut by_target: HashMap<i64, Vec<CheckRecord>> = HashMap::new();
    for record in records {
        by_target.entry(record.target_id).or_default().push(record);
    }

    let mut result = HashMap::with_capacity(target_ids.len());
    for &id in target_ids {
        let target_records = by_target.remove(&id).unwrap_or_default();
        result.insert(
            id,
            fill_buckets(
                &group_records(&target_records, resolution),
                now,
                bucket_count,
                resolution,
            ),
        );
    }

    Ok(result)
}

/// Check-count-weighted overall uptime over a bucket window.
///
/// Buckets with few checks must not dominate, so this is
/// sum(pct * checks) / sum(checks), not a simple mean. Zero checks across
/// the whole window yields 0.
pub fn overall_uptime(buckets: &[Bucket]) -> f64 {
    let total_checks: i64 = buckets.iter().map(|b| b.checks).sum();
    if total_checks == 0 {
        return 0.0;
    }

    let weighted: f64 = buckets
        .iter()
        .map(|b| b.uptime_percentage * b.checks as f64)
        .sum();
    round2(weighted / total_checks as f64)
}

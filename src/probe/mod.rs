//! Probe module for reachability checks.
//!
//! A probe issues a single HTTP GET against a target URL and folds every
//! possible outcome into UP or DOWN. Network failures never escape this
//! boundary as errors.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;

use crate::db::{CheckOutcome, CheckStatus};

/// Internal failure modes of a probe attempt. These exist only as input to
/// [`classify`]; callers of [`Probe::probe`] never see them.
#[derive(Error, Debug)]
pub enum ProbeFailure {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
}

/// A reachability prober.
///
/// Object-safe so tests can inject fakes into the fan-out coordinator.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Check one URL and classify the result. Infallible by contract:
    /// every failure mode maps to a DOWN outcome.
    async fn probe(&self, url: &str) -> CheckOutcome;
}

/// Classify a raw probe result into a check outcome.
///
/// Any response with status < 400 is UP. A response with status >= 400 is
/// DOWN but keeps its measured time (the endpoint answered, just with an
/// error). Timeouts and transport failures are DOWN with no time.
pub fn classify(result: Result<(u16, f64), ProbeFailure>) -> CheckOutcome {
    match result {
        Ok((status, elapsed_ms)) if status < 400 => CheckOutcome {
            status: CheckStatus::Up,
            response_time_ms: Some(elapsed_ms),
        },
        Ok((_, elapsed_ms)) => CheckOutcome {
            status: CheckStatus::Down,
            response_time_ms: Some(elapsed_ms),
        },
        Err(_) => CheckOutcome::down(),
    }
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// HTTP prober backed by one shared, pooled client.
pub struct HttpProber {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProber {
    /// Build a prober with a pooled client. Pool limits are fixed here, not
    /// derived per call.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(50)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self { client, timeout })
    }

    async fn fetch(&self, url: &str) -> Result<(u16, f64), ProbeFailure> {
        let start = Instant::now();

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeFailure::Timeout(self.timeout)
            } else {
                ProbeFailure::Transport(e.to_string())
            }
        })?;

        let elapsed_ms = round2(start.elapsed().as_secs_f64() * 1000.0);
        Ok((response.status().as_u16(), elapsed_ms))
    }
}

#[async_trait]
impl Probe for HttpProber {
    async fn probe(&self, url: &str) -> CheckOutcome {
        // Jitter to avoid thundering herd across a batch
        let jitter = rand::random::<u64>() % 100;
        tokio::time::sleep(Duration::from_millis(jitter)).await;

        let result = self.fetch(url).await;

        if let Err(ProbeFailure::Transport(ref reason)) = result {
            tracing::warn!("Probe failed for {}: {}", url, reason);
        }

        classify(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_success() {
        let outcome = classify(Ok((200, 42.5)));
        assert_eq!(outcome.status, CheckStatus::Up);
        assert_eq!(outcome.response_time_ms, Some(42.5));

        let outcome = classify(Ok((301, 10.0)));
        assert_eq!(outcome.status, CheckStatus::Up);

        let outcome = classify(Ok((399, 1.0)));
        assert_eq!(outcome.status, CheckStatus::Up);
    }

    #[test]
    fn test_classify_http_error_keeps_time() {
        let outcome = classify(Ok((500, 87.3)));
        assert_eq!(outcome.status, CheckStatus::Down);
        assert_eq!(outcome.response_time_ms, Some(87.3));

        let outcome = classify(Ok((404, 5.0)));
        assert_eq!(outcome.status, CheckStatus::Down);
        assert_eq!(outcome.response_time_ms, Some(5.0));
    }

    #[test]
    fn test_classify_failures_have_no_time() {
        let outcome = classify(Err(ProbeFailure::Timeout(Duration::from_secs(10))));
        assert_eq!(outcome.status, CheckStatus::Down);
        assert_eq!(outcome.response_time_ms, None);

        let outcome = classify(Err(ProbeFailure::Transport("connection refused".into())));
        assert_eq!(outcome.status, CheckStatus::Down);
        assert_eq!(outcome.response_time_ms, None);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.006), 1.01);
        assert_eq!(round2(42.4949), 42.49);
        assert_eq!(round2(0.0), 0.0);
    }

    #[tokio::test]
    async fn test_http_probe_unreachable_host() {
        let prober = HttpProber::new(Duration::from_millis(200)).unwrap();
        let outcome = prober.probe("http://256.256.256.256").await;
        assert_eq!(outcome.status, CheckStatus::Down);
        assert_eq!(outcome.response_time_ms, None);
    }
}

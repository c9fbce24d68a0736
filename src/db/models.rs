//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A monitored endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub display_order: i64,
    pub created_at: DateTime<Utc>,
}

impl Default for Target {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            url: String::new(),
            display_order: 0,
            created_at: Utc::now(),
        }
    }
}

/// Probe outcome status. Every probe resolves to one of these two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Up,
    Down,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Up => "UP",
            CheckStatus::Down => "DOWN",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "UP" => CheckStatus::Up,
            _ => CheckStatus::Down,
        }
    }
}

/// The in-memory result of a single probe.
///
/// `response_time_ms` is present only when a response was actually received;
/// a timeout or connection failure leaves it absent even though the status
/// is Down. An HTTP error response still carries its measured time.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub status: CheckStatus,
    pub response_time_ms: Option<f64>,
}

impl CheckOutcome {
    pub fn down() -> Self {
        Self {
            status: CheckStatus::Down,
            response_time_ms: None,
        }
    }
}

/// One persisted probe result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRecord {
    pub target_id: i64,
    pub status: CheckStatus,
    pub response_time_ms: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

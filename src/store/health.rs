//! # Source Health
//!
//! Per-source ranking signal adjusted by delivery outcomes:
//! - `+1` on every delivered item;
//! - `-1`/`-2` on terminal delivery failure, plus a last-failure timestamp.
//!
//! The score is unbounded in both directions. [`SourceHealth::weight`]
//! squashes it into `(0.0, 1.0)` for ranking, halving it while a failure is
//! recent.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use super::write_atomic;

/// How long a failure keeps dampening the derived weight.
const RECENT_FAILURE_WINDOW_HOURS: i64 = 24;
/// Score units per e-fold of the logistic curve.
const WEIGHT_SCALE: f64 = 4.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HealthFile {
    #[serde(default)]
    priority: BTreeMap<String, i64>,
    #[serde(default)]
    last_failure: BTreeMap<String, DateTime<Utc>>,
}

/// Snapshot of one source's health.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthRecord {
    pub source_feed: String,
    pub priority_score: i64,
    pub last_failure_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct SourceHealth {
    path: PathBuf,
    data: HealthFile,
}

impl SourceHealth {
    /// Missing file → empty map; corrupt file → logged, empty map.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                error!(target: "store", error = %e, path = %path.display(), "source health unreadable; starting empty");
                HealthFile::default()
            }),
            Err(_) => HealthFile::default(),
        };
        Self { path, data }
    }

    /// Records are created lazily: unknown sources read as score 0.
    pub fn record(&self, source: &str) -> HealthRecord {
        HealthRecord {
            source_feed: source.to_string(),
            priority_score: self.data.priority.get(source).copied().unwrap_or(0),
            last_failure_at: self.data.last_failure.get(source).copied(),
        }
    }

    pub fn score(&self, source: &str) -> i64 {
        self.data.priority.get(source).copied().unwrap_or(0)
    }

    /// Successful delivery: `+1`.
    pub fn reward(&mut self, source: &str) {
        *self.data.priority.entry(source.to_string()).or_insert(0) += 1;
        self.persist();
    }

    /// Terminal delivery failure: subtract `amount` and stamp the failure.
    pub fn penalize(&mut self, source: &str, amount: i64, at: DateTime<Utc>) {
        *self.data.priority.entry(source.to_string()).or_insert(0) -= amount.abs();
        self.data.last_failure.insert(source.to_string(), at);
        self.persist();
    }

    /// Ranking weight in `(0.0, 1.0)`; 0.5 for a fresh source.
    pub fn weight(&self, source: &str, now: DateTime<Utc>) -> f64 {
        let rec = self.record(source);
        let base = 1.0 / (1.0 + (-(rec.priority_score as f64) / WEIGHT_SCALE).exp());
        match rec.last_failure_at {
            Some(ts) if now.signed_duration_since(ts) < Duration::hours(RECENT_FAILURE_WINDOW_HOURS) => {
                base * 0.5
            }
            _ => base,
        }
    }

    fn persist(&self) {
        let body = match serde_json::to_vec_pretty(&self.data) {
            Ok(b) => b,
            Err(e) => {
                warn!(target: "store", error = %e, "source health serialize failed");
                return;
            }
        };
        if let Err(e) = write_atomic(&self.path, &body) {
            error!(target: "store", error = %e, "source health save failed");
        }
    }
}

// src/metrics.rs
//! Batch metrics. There is no scrape endpoint for a run-and-exit process, so
//! the Prometheus exposition is written to a textfile at cycle end for a
//! node-exporter textfile collector to pick up.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::store::write_atomic;

/// Descriptions for the selection, publish and cycle series.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("select_picked_total", "Candidates picked by the fair selector.");
        describe_counter!("publish_delivered_total", "Items delivered to the channel.");
        describe_counter!(
            "publish_skipped_total",
            "Items skipped at publish time (duplicate, off-topic, too short)."
        );
        describe_counter!(
            "publish_failed_total",
            "Items abandoned after exhausting the delivery retry budget."
        );
        describe_counter!(
            "publish_rate_limited_total",
            "Rate-limit replies received from the channel."
        );
        describe_gauge!("cycle_last_run_ts", "Unix ts when the last cycle finished.");
    });
}

pub struct TextfileExporter {
    handle: PrometheusHandle,
    path: PathBuf,
}

impl TextfileExporter {
    /// Install the global Prometheus recorder. Only one recorder may exist
    /// per process.
    pub fn install(path: impl Into<PathBuf>) -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_metrics_described();
        Ok(Self {
            handle,
            path: path.into(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Write the current exposition to the textfile (atomic replace).
    pub fn flush(&self) -> Result<()> {
        write_atomic(&self.path, self.render().as_bytes())
            .with_context(|| format!("writing metrics textfile {}", self.path.display()))
    }
}

// src/cycle.rs
//! One batch cycle: ingest → select → schedule → publish, then housekeeping.
//!
//! Publishing is strictly sequential: the channel sees items in schedule
//! order with a short randomized pause between consecutive deliveries.

use metrics::gauge;
use rand::Rng;
use tracing::info;

use crate::clock::Clock;
use crate::config::RelayConfig;
use crate::extract::TextExtractor;
use crate::ingest::{FeedParser, Fetcher, Ingestor};
use crate::metrics::ensure_metrics_described;
use crate::notify::Deliverer;
use crate::publish::{ItemReport, PublishState, Publisher};
use crate::relevance::RelevanceClassifier;
use crate::schedule::generate_schedule;
use crate::select::select_fair;
use crate::store::StateStores;

#[derive(Debug, Default)]
pub struct CycleSummary {
    pub parsed: usize,
    pub kept: usize,
    pub failed_sources: Vec<String>,
    pub selected: usize,
    pub items: Vec<ItemReport>,
    pub trimmed_fingerprints: usize,
}

impl CycleSummary {
    fn count(&self, f: impl Fn(&PublishState) -> bool) -> usize {
        self.items.iter().filter(|r| f(&r.outcome)).count()
    }

    pub fn delivered(&self) -> usize {
        self.count(|s| *s == PublishState::Delivered)
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, PublishState::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| *s == PublishState::Failed)
    }
}

/// Collaborators for one cycle. Everything is borrowed; the stores are the
/// only state that outlives the call.
pub struct Relay<'a> {
    pub config: &'a RelayConfig,
    pub classifier: &'a RelevanceClassifier,
    pub fetcher: &'a dyn Fetcher,
    pub parser: &'a dyn FeedParser,
    pub extractor: &'a dyn TextExtractor,
    pub deliverer: &'a dyn Deliverer,
    pub clock: &'a dyn Clock,
}

impl Relay<'_> {
    pub async fn run_cycle<R: Rng>(&self, stores: &mut StateStores, rng: &mut R) -> CycleSummary {
        ensure_metrics_described();
        let cfg = self.config;
        let mut summary = CycleSummary::default();

        let ingest = Ingestor::new(self.fetcher, self.parser, self.classifier, self.clock)
            .run(&cfg.ingest_settings())
            .await;
        summary.parsed = ingest.parsed;
        summary.kept = ingest.candidates.len();
        summary.failed_sources = ingest.failed_sources;

        let selection = select_fair(
            ingest.candidates,
            cfg.max_items,
            &stores.fingerprints,
            &mut stores.rotation,
            &stores.health,
            self.clock.now(),
        );
        summary.selected = selection.picked.len();

        if selection.picked.is_empty() {
            info!(target: "cycle", "nothing to publish this cycle");
        } else {
            let schedule = generate_schedule(
                selection.picked.len(),
                &cfg.window(),
                self.clock.now(),
                rng,
            );
            let settings = cfg.publish_settings();
            let publisher = Publisher::new(
                self.fetcher,
                self.extractor,
                self.deliverer,
                self.classifier,
                self.clock,
                &settings,
            );
            let (min_delay, max_delay) = cfg.inter_post_delay();
            let last = selection.picked.len() - 1;

            for (i, (item, at)) in selection.picked.iter().zip(schedule).enumerate() {
                let report = publisher
                    .publish(item, at, &mut stores.fingerprints, &mut stores.health)
                    .await;
                summary.items.push(report);
                if i < last {
                    let secs = rng.random_range(min_delay.as_secs()..=max_delay.as_secs());
                    self.clock.sleep(std::time::Duration::from_secs(secs)).await;
                }
            }
        }

        summary.trimmed_fingerprints = stores.fingerprints.trim_to_retention();
        gauge!("cycle_last_run_ts").set(self.clock.now().timestamp() as f64);

        info!(
            target: "cycle",
            parsed = summary.parsed,
            kept = summary.kept,
            failed_sources = summary.failed_sources.len(),
            selected = summary.selected,
            delivered = summary.delivered(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            "cycle complete"
        );
        summary
    }
}

// src/ingest/mod.rs
//! Ingestion coordinator: fetch primary feeds concurrently, fall back to the
//! backup list when volume is short, and turn feed entries into scored
//! [`Candidate`]s.
//!
//! A source that keeps failing after its retry budget is marked failed for
//! the rest of the cycle; nothing here aborts the cycle.

pub mod http;
pub mod rss;
pub mod types;

pub use types::{Candidate, FeedEntry, FeedParser, FetchError, FetchResponse, Fetcher};

use std::collections::HashSet;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::normalize::{canonicalize_url, domain_of, html_to_text, normalize_title, strip_boilerplate};
use crate::relevance::RelevanceClassifier;

/// One-time metrics registration.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_events_total", "Entries parsed from feeds.");
        describe_counter!(
            "ingest_kept_total",
            "Entries kept after normalization + relevance filtering."
        );
        describe_counter!(
            "ingest_source_failures_total",
            "Sources marked failed for the cycle after exhausting retries."
        );
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
    });
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub primary_sources: Vec<String>,
    pub backup_sources: Vec<String>,
    /// Backups are consulted only while fewer candidates than this exist.
    pub target: usize,
    pub concurrency: usize,
    pub attempts: u32,
    pub timeout: Duration,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub candidates: Vec<Candidate>,
    pub parsed: usize,
    pub failed_sources: Vec<String>,
    pub used_backup: bool,
}

pub struct Ingestor<'a> {
    fetcher: &'a dyn Fetcher,
    parser: &'a dyn FeedParser,
    classifier: &'a RelevanceClassifier,
    clock: &'a dyn Clock,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        fetcher: &'a dyn Fetcher,
        parser: &'a dyn FeedParser,
        classifier: &'a RelevanceClassifier,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            fetcher,
            parser,
            classifier,
            clock,
        }
    }

    pub async fn run(&self, settings: &IngestSettings) -> IngestReport {
        ensure_metrics_described();
        let mut report = IngestReport::default();
        let mut failed: HashSet<String> = HashSet::new();
        let mut visited: HashSet<String> = HashSet::new();

        self.ingest_batch(&settings.primary_sources, settings, &mut visited, &mut failed, &mut report)
            .await;

        if report.candidates.len() < settings.target && !settings.backup_sources.is_empty() {
            info!(
                target: "ingest",
                have = report.candidates.len(),
                want = settings.target,
                "primary volume short; fetching backup sources"
            );
            report.used_backup = true;
            self.ingest_batch(&settings.backup_sources, settings, &mut visited, &mut failed, &mut report)
                .await;
        }

        report.failed_sources = failed.into_iter().collect();
        report.failed_sources.sort();
        counter!("ingest_kept_total").increment(report.candidates.len() as u64);
        info!(
            target: "ingest",
            parsed = report.parsed,
            kept = report.candidates.len(),
            failed = report.failed_sources.len(),
            "ingest finished"
        );
        report
    }

    async fn ingest_batch(
        &self,
        sources: &[String],
        settings: &IngestSettings,
        visited: &mut HashSet<String>,
        failed: &mut HashSet<String>,
        report: &mut IngestReport,
    ) {
        let todo: Vec<(usize, &String)> = sources
            .iter()
            .filter(|s| visited.insert((*s).clone()))
            .enumerate()
            .collect();

        let mut fetched = stream::iter(todo)
            .map(|(order, src)| async move { (order, src, self.fetch_source(src, settings).await) })
            .buffer_unordered(settings.concurrency.max(1))
            .collect::<Vec<_>>()
            .await;
        fetched.sort_by_key(|(order, _, _)| *order);

        for (_, src, res) in fetched {
            let body = match res {
                Ok(b) => b,
                Err(e) => {
                    warn!(target: "ingest", source = %src, error = %e, "source failed for this cycle");
                    counter!("ingest_source_failures_total").increment(1);
                    failed.insert(src.clone());
                    continue;
                }
            };
            let entries = self.parser.parse(&body);
            report.parsed += entries.len();
            counter!("ingest_events_total").increment(entries.len() as u64);
            let before = report.candidates.len();
            for entry in entries {
                if let Some(c) = build_candidate(&entry, src, self.classifier) {
                    report.candidates.push(c);
                }
            }
            debug!(
                target: "ingest",
                source = %src,
                kept = report.candidates.len() - before,
                "source ingested"
            );
        }
    }

    /// Fetch with exponential backoff; non-200 counts as a failure.
    async fn fetch_source(&self, url: &str, settings: &IngestSettings) -> Result<Vec<u8>, FetchError> {
        fetch_with_retry(self.fetcher, self.clock, url, settings.attempts, settings.timeout).await
    }
}

/// Shared retry loop for feed and article fetches: `attempts` tries, sleeping
/// 1s, 2s, 4s... between them through the injected clock.
pub async fn fetch_with_retry(
    fetcher: &dyn Fetcher,
    clock: &dyn Clock,
    url: &str,
    attempts: u32,
    timeout: Duration,
) -> Result<Vec<u8>, FetchError> {
    let attempts = attempts.max(1);
    let mut last = FetchError::Network("no attempt made".into());
    for attempt in 1..=attempts {
        let headers = http::request_headers();
        match fetcher.fetch(url, &headers, timeout).await {
            Ok(resp) if resp.is_ok() => return Ok(resp.body),
            Ok(resp) => last = FetchError::Status(resp.status),
            Err(e) => last = e,
        }
        debug!(target: "ingest", url = %url, attempt, error = %last, "fetch attempt failed");
        if attempt < attempts {
            clock.sleep(Duration::from_secs(1u64 << (attempt - 1).min(6))).await;
        }
    }
    Err(last)
}

/// Normalize, clean and score one entry. `None` when the entry is unusable
/// or below the relevance threshold.
pub fn build_candidate(
    entry: &FeedEntry,
    source_feed: &str,
    classifier: &RelevanceClassifier,
) -> Option<Candidate> {
    let title = normalize_title(&entry.title);
    if title.is_empty() {
        return None;
    }
    let canonical_url = canonicalize_url(&entry.link);
    let has_host = url::Url::parse(&canonical_url)
        .map(|u| u.host_str().is_some_and(|h| !h.is_empty()))
        .unwrap_or(false);
    if !has_host {
        debug!(target: "ingest", link = %entry.link, "entry link is not an absolute URL");
        return None;
    }
    let domain = domain_of(&canonical_url);
    let raw_content = strip_boilerplate(&html_to_text(&entry.summary));

    let rel = classifier.evaluate(&title, &raw_content);
    if rel.score < classifier.threshold() {
        debug!(
            target: "ingest",
            domain = %domain,
            score = rel.score,
            vetoed = rel.vetoed_by.is_some(),
            "below relevance threshold"
        );
        return None;
    }

    Some(Candidate {
        title,
        canonical_url,
        raw_content,
        source_feed: source_feed.to_string(),
        domain,
        relevance_score: rel.score,
    })
}

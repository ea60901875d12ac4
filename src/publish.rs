// src/publish.rs
//! Per-item publisher, written as an explicit state machine:
//!
//! ```text
//! Pending → Waiting → Validating → FetchingFullText → Formatting → Sending
//!                        │                │                          │
//!                        └──→ Skipped ←───┘                 Delivered | Failed
//! ```
//!
//! Every suspension (scheduled wait, fetch backoff, rate-limit wait, retry
//! backoff) goes through the injected [`Clock`], so the whole walk is testable
//! without wall-clock time.

use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::extract::TextExtractor;
use crate::format::{FormattedMessage, MessageFormatter};
use crate::ingest::{fetch_with_retry, Candidate, Fetcher};
use crate::normalize::Fingerprint;
use crate::notify::{ContentType, Deliverer, DeliveryError};
use crate::relevance::RelevanceClassifier;
use crate::store::{FingerprintStore, SourceHealth};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Duplicate,
    OffTopic,
    TooShort,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Duplicate => "duplicate",
            SkipReason::OffTopic => "off_topic",
            SkipReason::TooShort => "too_short",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishState {
    Pending,
    Waiting,
    Validating,
    FetchingFullText,
    Formatting,
    Sending,
    Delivered,
    Skipped(SkipReason),
    Failed,
}

impl PublishState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PublishState::Delivered | PublishState::Skipped(_) | PublishState::Failed
        )
    }
}

#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub channel_id: String,
    pub min_content_len: usize,
    pub max_content_len: usize,
    pub message_ceiling: usize,
    /// Budget for non-rate-limit delivery failures.
    pub delivery_attempts: u32,
    pub fetch_attempts: u32,
    pub fetch_timeout: Duration,
    pub link_preview: bool,
}

/// What happened to one scheduled item.
#[derive(Debug, Clone)]
pub struct ItemReport {
    pub fingerprint: Fingerprint,
    pub domain: String,
    pub outcome: PublishState,
    /// Every state entered, in order, ending with `outcome`.
    pub trail: Vec<PublishState>,
    /// Failed send attempts counted against the budget.
    pub failed_sends: u32,
    pub rate_limited: u32,
    pub used_full_text: bool,
    pub last_error: Option<DeliveryError>,
}

/// Mutable per-item data carried between states.
#[derive(Default)]
struct Walk {
    body: Option<String>,
    message: Option<FormattedMessage>,
    failed_sends: u32,
    rate_limited: u32,
    used_full_text: bool,
    last_error: Option<DeliveryError>,
}

pub struct Publisher<'a> {
    fetcher: &'a dyn Fetcher,
    extractor: &'a dyn TextExtractor,
    deliverer: &'a dyn Deliverer,
    classifier: &'a RelevanceClassifier,
    clock: &'a dyn Clock,
    settings: &'a PublishSettings,
}

impl<'a> Publisher<'a> {
    pub fn new(
        fetcher: &'a dyn Fetcher,
        extractor: &'a dyn TextExtractor,
        deliverer: &'a dyn Deliverer,
        classifier: &'a RelevanceClassifier,
        clock: &'a dyn Clock,
        settings: &'a PublishSettings,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            deliverer,
            classifier,
            clock,
            settings,
        }
    }

    /// Drive one item from `Pending` to a terminal state.
    pub async fn publish(
        &self,
        item: &Candidate,
        at: DateTime<Utc>,
        fingerprints: &mut FingerprintStore,
        health: &mut SourceHealth,
    ) -> ItemReport {
        let fp = item.fingerprint();
        let mut walk = Walk::default();
        let mut trail = vec![PublishState::Pending];
        let mut state = PublishState::Pending;

        while !state.is_terminal() {
            let next = self.step(state, item, at, &fp, fingerprints, &mut walk).await;
            if next != state {
                debug!(target: "publish", fp = %fp.short(), from = ?state, to = ?next, "transition");
                trail.push(next);
            }
            state = next;
        }

        self.finish(state, item, &fp, fingerprints, health, &walk);

        ItemReport {
            fingerprint: fp,
            domain: item.domain.clone(),
            outcome: state,
            trail,
            failed_sends: walk.failed_sends,
            rate_limited: walk.rate_limited,
            used_full_text: walk.used_full_text,
            last_error: walk.last_error,
        }
    }

    async fn step(
        &self,
        state: PublishState,
        item: &Candidate,
        at: DateTime<Utc>,
        fp: &Fingerprint,
        fingerprints: &FingerprintStore,
        walk: &mut Walk,
    ) -> PublishState {
        match state {
            PublishState::Pending => PublishState::Waiting,

            PublishState::Waiting => {
                let now = self.clock.now();
                if at > now {
                    info!(
                        target: "publish",
                        fp = %fp.short(),
                        wait_secs = (at - now).num_seconds(),
                        "waiting for slot"
                    );
                }
                self.clock.sleep_until(at).await;
                PublishState::Validating
            }

            PublishState::Validating => {
                if fingerprints.contains(fp) {
                    PublishState::Skipped(SkipReason::Duplicate)
                } else if !self.classifier.is_relevant(&item.title, &item.raw_content) {
                    PublishState::Skipped(SkipReason::OffTopic)
                } else {
                    PublishState::FetchingFullText
                }
            }

            PublishState::FetchingFullText => {
                let body = self.full_text(item, fp).await;
                walk.used_full_text = body.is_some();
                let body = body.unwrap_or_else(|| item.raw_content.clone());
                // second gate: the longer text can change the verdict
                if !self.classifier.is_relevant(&item.title, &body) {
                    return PublishState::Skipped(SkipReason::OffTopic);
                }
                if body.chars().count() < self.settings.min_content_len {
                    return PublishState::Skipped(SkipReason::TooShort);
                }
                walk.body = Some(body);
                PublishState::Formatting
            }

            PublishState::Formatting => {
                let formatter = MessageFormatter::new(
                    self.classifier.lexicon(),
                    self.settings.max_content_len,
                    self.settings.message_ceiling,
                );
                let body = walk.body.as_deref().unwrap_or(item.raw_content.as_str());
                walk.message = Some(formatter.format(&item.title, body, &item.canonical_url));
                PublishState::Sending
            }

            PublishState::Sending => self.send_once(fp, walk).await,

            terminal => terminal,
        }
    }

    /// One delivery attempt; the caller loops while this returns `Sending`.
    async fn send_once(&self, fp: &Fingerprint, walk: &mut Walk) -> PublishState {
        let Some(message) = walk.message.as_ref() else {
            return PublishState::Formatting;
        };
        let res = self
            .deliverer
            .send(
                &self.settings.channel_id,
                &message.html,
                ContentType::RichText,
                self.settings.link_preview,
            )
            .await;

        match res {
            Ok(()) => PublishState::Delivered,
            Err(DeliveryError::RateLimited { retry_after }) => {
                walk.rate_limited += 1;
                counter!("publish_rate_limited_total").increment(1);
                warn!(
                    target: "publish",
                    fp = %fp.short(),
                    retry_after_secs = retry_after.as_secs(),
                    "rate limited; waiting"
                );
                self.clock.sleep(retry_after).await;
                PublishState::Sending
            }
            Err(e) => {
                walk.failed_sends += 1;
                let attempt = walk.failed_sends;
                warn!(target: "publish", fp = %fp.short(), attempt, error = %e, "delivery attempt failed");
                walk.last_error = Some(e);
                if attempt >= self.settings.delivery_attempts.max(1) {
                    PublishState::Failed
                } else {
                    self.clock
                        .sleep(Duration::from_secs(1u64 << (attempt - 1).min(6)))
                        .await;
                    PublishState::Sending
                }
            }
        }
    }

    /// Extended article text, or `None` to fall back to the feed summary.
    async fn full_text(&self, item: &Candidate, fp: &Fingerprint) -> Option<String> {
        let raw = match fetch_with_retry(
            self.fetcher,
            self.clock,
            &item.canonical_url,
            self.settings.fetch_attempts,
            self.settings.fetch_timeout,
        )
        .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(target: "publish", fp = %fp.short(), error = %e, "article fetch failed; using summary");
                return None;
            }
        };
        let text = self
            .extractor
            .extract(&String::from_utf8_lossy(&raw), &item.domain);
        if text.trim().is_empty() {
            debug!(target: "publish", fp = %fp.short(), "extraction empty; using summary");
            None
        } else {
            Some(text)
        }
    }

    fn finish(
        &self,
        state: PublishState,
        item: &Candidate,
        fp: &Fingerprint,
        fingerprints: &mut FingerprintStore,
        health: &mut SourceHealth,
        walk: &Walk,
    ) {
        match state {
            PublishState::Delivered => {
                fingerprints.record(fp.clone());
                health.reward(&item.source_feed);
                counter!("publish_delivered_total").increment(1);
                info!(target: "publish", fp = %fp.short(), domain = %item.domain, outcome = "delivered", "published");
            }
            PublishState::Skipped(reason) => {
                counter!("publish_skipped_total", "reason" => reason.as_str()).increment(1);
                info!(target: "publish", fp = %fp.short(), domain = %item.domain, outcome = "skipped", reason = reason.as_str(), "skipped");
            }
            PublishState::Failed => {
                let penalty = walk.last_error.as_ref().map_or(1, DeliveryError::penalty);
                health.penalize(&item.source_feed, penalty, self.clock.now());
                counter!("publish_failed_total").increment(1);
                warn!(
                    target: "publish",
                    fp = %fp.short(),
                    domain = %item.domain,
                    outcome = "failed",
                    penalty,
                    "delivery abandoned"
                );
            }
            _ => {}
        }
    }
}

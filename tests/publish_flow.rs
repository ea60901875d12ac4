// tests/publish_flow.rs
mod common;

use std::time::Duration;

use chrono::Duration as ChronoDuration;
use common::*;
use feed_relay::clock::{Clock, ManualClock};
use feed_relay::extract::ExtractorRegistry;
use feed_relay::ingest::{Candidate, FetchError};
use feed_relay::notify::{ContentType, DeliveryError};
use feed_relay::publish::{ItemReport, PublishSettings, PublishState, Publisher, SkipReason};
use feed_relay::store::{FingerprintStore, SourceHealth};
use tempfile::TempDir;

const SOURCE: &str = "https://news.example.com/rss";
const URL: &str = "https://news.example.com/2025/09/key-rate";

fn key_rate_item(summary: &str) -> Candidate {
    candidate("Central bank holds key rate at 16%", URL, summary, SOURCE, 8)
}

const SUMMARY: &str =
    "The central bank kept the key rate unchanged, citing sticky inflation and slower lending.";

struct Stores {
    _dir: TempDir,
    fps: FingerprintStore,
    health: SourceHealth,
}

fn stores() -> Stores {
    let dir = tempfile::tempdir().unwrap();
    let fps = FingerprintStore::open(dir.path().join("fp.txt"), 100);
    let health = SourceHealth::open(dir.path().join("health.json"));
    Stores {
        _dir: dir,
        fps,
        health,
    }
}

async fn run(
    fetcher: &MapFetcher,
    deliverer: &ScriptedDeliverer,
    clock: &ManualClock,
    settings: &PublishSettings,
    item: &Candidate,
    at: chrono::DateTime<chrono::Utc>,
    s: &mut Stores,
) -> ItemReport {
    let classifier = classifier();
    let extractor = ExtractorRegistry::with_defaults();
    let publisher = Publisher::new(fetcher, &extractor, deliverer, &classifier, clock, settings);
    publisher.publish(item, at, &mut s.fps, &mut s.health).await
}

#[tokio::test]
async fn rate_limit_waits_once_then_delivers() {
    let clock = ManualClock::new(t0());
    let fetcher = MapFetcher::new().route(URL, ok(&fixture("article.html")));
    let deliverer = ScriptedDeliverer::new(vec![
        Err(DeliveryError::RateLimited {
            retry_after: Duration::from_secs(5),
        }),
        Ok(()),
    ]);
    let mut s = stores();
    let item = key_rate_item(SUMMARY);

    let r = run(&fetcher, &deliverer, &clock, &publish_settings(), &item, t0(), &mut s).await;

    assert_eq!(r.outcome, PublishState::Delivered);
    assert_eq!(r.rate_limited, 1);
    assert_eq!(r.failed_sends, 0);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(5)]);
    assert_eq!(deliverer.sent().len(), 2);
    assert!(s.fps.contains(&item.fingerprint()));
    assert_eq!(s.health.score(SOURCE), 1);
    assert_eq!(
        r.trail,
        vec![
            PublishState::Pending,
            PublishState::Waiting,
            PublishState::Validating,
            PublishState::FetchingFullText,
            PublishState::Formatting,
            PublishState::Sending,
            PublishState::Delivered,
        ]
    );
}

#[tokio::test]
async fn full_text_is_extracted_and_formatted() {
    let clock = ManualClock::new(t0());
    let fetcher = MapFetcher::new().route(URL, ok(&fixture("article.html")));
    let deliverer = ScriptedDeliverer::new(vec![]);
    let mut s = stores();

    let r = run(&fetcher, &deliverer, &clock, &publish_settings(), &key_rate_item(SUMMARY), t0(), &mut s).await;

    assert!(r.used_full_text);
    let sent = deliverer.sent();
    let msg = &sent[0];
    assert_eq!(msg.channel_id, "-1001234567890");
    assert_eq!(msg.content_type, ContentType::RichText);
    assert!(!msg.preview);
    assert!(msg.message.starts_with("<b>"));
    assert!(msg.message.contains("pointing to inflation"));
    assert!(msg.message.contains(&format!("<a href=\"{URL}\">Read more</a>")));
    assert!(!msg.message.contains("should never appear"));
    assert!(!msg.message.contains("All rights reserved"));
    assert!(!msg.message.contains("Related:"));
}

#[tokio::test]
async fn waits_for_scheduled_slot_before_sending() {
    let clock = ManualClock::new(t0());
    let fetcher = MapFetcher::new().route(URL, ok(&fixture("article.html")));
    let deliverer = ScriptedDeliverer::new(vec![]);
    let mut s = stores();
    let at = t0() + ChronoDuration::minutes(10);

    let r = run(&fetcher, &deliverer, &clock, &publish_settings(), &key_rate_item(SUMMARY), at, &mut s).await;

    assert_eq!(r.outcome, PublishState::Delivered);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(600)]);
    assert_eq!(clock.now(), at);
}

#[tokio::test]
async fn failure_budget_penalizes_source() {
    let clock = ManualClock::new(t0());
    let fetcher = MapFetcher::new().route(URL, ok(&fixture("article.html")));
    let net = || Err(DeliveryError::Network("connection reset".into()));
    let deliverer = ScriptedDeliverer::new(vec![net(), net(), net()]);
    let mut s = stores();
    let item = key_rate_item(SUMMARY);

    let r = run(&fetcher, &deliverer, &clock, &publish_settings(), &item, t0(), &mut s).await;

    assert_eq!(r.outcome, PublishState::Failed);
    assert_eq!(r.failed_sends, 3);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(1), Duration::from_secs(2)]);
    assert_eq!(s.health.score(SOURCE), -1);
    assert_eq!(s.health.record(SOURCE).last_failure_at, Some(clock.now()));
    assert!(!s.fps.contains(&item.fingerprint()));
}

#[tokio::test]
async fn rejected_delivery_costs_more() {
    let clock = ManualClock::new(t0());
    let fetcher = MapFetcher::new().route(URL, ok(&fixture("article.html")));
    let rejected = || Err(DeliveryError::Rejected("Bad Request: chat not found".into()));
    let deliverer = ScriptedDeliverer::new(vec![rejected(), rejected()]);
    let mut s = stores();
    let settings = PublishSettings {
        delivery_attempts: 2,
        ..publish_settings()
    };

    let r = run(&fetcher, &deliverer, &clock, &settings, &key_rate_item(SUMMARY), t0(), &mut s).await;

    assert_eq!(r.outcome, PublishState::Failed);
    assert_eq!(r.last_error, Some(DeliveryError::Rejected("Bad Request: chat not found".into())));
    assert_eq!(s.health.score(SOURCE), -2);
}

#[tokio::test]
async fn already_delivered_is_skipped_without_io() {
    let clock = ManualClock::new(t0());
    let fetcher = MapFetcher::new().route(URL, ok(&fixture("article.html")));
    let deliverer = ScriptedDeliverer::new(vec![]);
    let mut s = stores();
    let item = key_rate_item(SUMMARY);
    s.fps.record(item.fingerprint());

    let r = run(&fetcher, &deliverer, &clock, &publish_settings(), &item, t0(), &mut s).await;

    assert_eq!(r.outcome, PublishState::Skipped(SkipReason::Duplicate));
    assert!(fetcher.calls().is_empty());
    assert!(deliverer.sent().is_empty());
    assert_eq!(s.health.score(SOURCE), 0);
}

#[tokio::test]
async fn full_text_can_veto_the_item() {
    let clock = ManualClock::new(t0());
    let page = "<html><body><article><p>Watch the video: the central bank explains \
                its key rate decision and the inflation outlook.</p></article></body></html>";
    let fetcher = MapFetcher::new().route(URL, ok(page));
    let deliverer = ScriptedDeliverer::new(vec![]);
    let mut s = stores();

    let r = run(&fetcher, &deliverer, &clock, &publish_settings(), &key_rate_item(SUMMARY), t0(), &mut s).await;

    assert_eq!(r.outcome, PublishState::Skipped(SkipReason::OffTopic));
    assert!(deliverer.sent().is_empty());
}

#[tokio::test]
async fn short_body_is_skipped_after_fetch() {
    let clock = ManualClock::new(t0());
    let fetcher =
        MapFetcher::new().route(URL, Err(FetchError::Network("connection refused".into())));
    let deliverer = ScriptedDeliverer::new(vec![]);
    let mut s = stores();

    let r = run(
        &fetcher,
        &deliverer,
        &clock,
        &publish_settings(),
        &key_rate_item("The central bank cut rates."),
        t0(),
        &mut s,
    )
    .await;

    assert_eq!(r.outcome, PublishState::Skipped(SkipReason::TooShort));
    assert!(!r.used_full_text);
    assert!(clock.sleeps().is_empty());
}

#[tokio::test]
async fn failed_article_fetch_falls_back_to_summary() {
    let clock = ManualClock::new(t0());
    let fetcher = MapFetcher::new().route(URL, status(404));
    let deliverer = ScriptedDeliverer::new(vec![]);
    let mut s = stores();

    let r = run(&fetcher, &deliverer, &clock, &publish_settings(), &key_rate_item(SUMMARY), t0(), &mut s).await;

    assert_eq!(r.outcome, PublishState::Delivered);
    assert!(!r.used_full_text);
    assert!(deliverer.sent()[0].message.contains("citing sticky inflation"));
}

#[tokio::test]
async fn article_fetch_retries_with_backoff() {
    let clock = ManualClock::new(t0());
    let fetcher = MapFetcher::new()
        .route(URL, Err(FetchError::Timeout))
        .route(URL, ok(&fixture("article.html")));
    let deliverer = ScriptedDeliverer::new(vec![]);
    let mut s = stores();
    let settings = PublishSettings {
        fetch_attempts: 3,
        ..publish_settings()
    };

    let r = run(&fetcher, &deliverer, &clock, &settings, &key_rate_item(SUMMARY), t0(), &mut s).await;

    assert!(r.used_full_text);
    assert_eq!(fetcher.calls().len(), 2);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(1)]);
}

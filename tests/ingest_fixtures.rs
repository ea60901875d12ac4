// tests/ingest_fixtures.rs
mod common;

use std::time::Duration;

use common::*;
use feed_relay::clock::ManualClock;
use feed_relay::ingest::rss::SyndicationParser;
use feed_relay::ingest::{FetchError, IngestSettings, Ingestor};

const PRIMARY: &str = "https://news.example.com/rss";
const DOWN: &str = "https://down.example.net/rss";
const BACKUP: &str = "https://wire.example.org/atom";

fn settings(primary: &[&str], target: usize) -> IngestSettings {
    IngestSettings {
        primary_sources: primary.iter().map(|s| s.to_string()).collect(),
        backup_sources: vec![BACKUP.to_string()],
        target,
        concurrency: 4,
        attempts: 2,
        timeout: Duration::from_secs(15),
    }
}

#[test]
fn rss_fixture_parses_and_drops_linkless_items() {
    let entries = SyndicationParser::parse_str(&fixture("feed_rss.xml"));
    assert_eq!(entries.len(), 3);
    assert!(entries[0].link.contains("utm_source=rss&utm_medium=feed"));
    assert!(entries[0].summary.contains("sticky inflation"));
}

#[test]
fn atom_fixture_prefers_alternate_links() {
    let entries = SyndicationParser::parse_str(&fixture("feed_atom.xml"));
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].title, "Stock market rallies on bank earnings");
    assert_eq!(entries[1].link, "https://wire.example.org/stocks-rally");
}

#[test]
fn garbage_is_an_empty_feed() {
    assert!(SyndicationParser::parse_str("<html><body>503</body></html>").is_empty());
    assert!(SyndicationParser::parse_str("").is_empty());
}

#[tokio::test]
async fn primary_feed_is_filtered_and_normalized() {
    let clock = ManualClock::new(t0());
    let fetcher = MapFetcher::new().route(PRIMARY, ok(&fixture("feed_rss.xml")));
    let clf = classifier();
    let parser = SyndicationParser;

    let report = Ingestor::new(&fetcher, &parser, &clf, &clock)
        .run(&settings(&[PRIMARY], 2))
        .await;

    assert_eq!(report.parsed, 3);
    assert!(!report.used_backup);
    let titles: Vec<&str> = report.candidates.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(
        titles,
        vec![
            "Central bank holds key rate at 16%",
            "Mortgage lending slows as deposit rates climb"
        ]
    );
    let first = &report.candidates[0];
    assert_eq!(first.canonical_url, "https://news.example.com/2025/09/key-rate");
    assert_eq!(first.domain, "news.example.com");
    assert_eq!(first.source_feed, PRIMARY);
    assert!(!first.raw_content.contains('<'));
}

#[tokio::test]
async fn failing_source_does_not_stop_the_cycle_and_backup_fills_in() {
    let clock = ManualClock::new(t0());
    let fetcher = MapFetcher::new()
        .route(PRIMARY, ok(&fixture("feed_rss.xml")))
        .route(DOWN, Err(FetchError::Timeout))
        .route(BACKUP, ok(&fixture("feed_atom.xml")));
    let clf = classifier();
    let parser = SyndicationParser;

    let report = Ingestor::new(&fetcher, &parser, &clf, &clock)
        .run(&settings(&[PRIMARY, DOWN], 5))
        .await;

    assert_eq!(report.failed_sources, vec![DOWN.to_string()]);
    assert!(report.used_backup);
    assert_eq!(report.parsed, 5);
    assert_eq!(report.candidates.len(), 4);
    assert!(report
        .candidates
        .iter()
        .any(|c| c.canonical_url == "https://wire.example.org/stocks-rally"));
    assert_eq!(fetcher.calls().iter().filter(|u| *u == DOWN).count(), 2);
}

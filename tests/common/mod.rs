// tests/common/mod.rs
// Shared doubles for the integration tests: scripted fetcher, recording
// deliverer and a few builders.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use feed_relay::ingest::{Candidate, FetchError, FetchResponse, Fetcher};
use feed_relay::normalize::domain_of;
use feed_relay::notify::{ContentType, Deliverer, DeliveryError};
use feed_relay::publish::PublishSettings;
use feed_relay::relevance::{Lexicon, RelevanceClassifier};

/// 10:00 local time in a UTC+3 channel.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 6, 7, 0, 0).unwrap()
}

pub fn fixture(name: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{name}")).expect("fixture")
}

pub fn classifier() -> RelevanceClassifier {
    RelevanceClassifier::new(Lexicon::default_seed()).expect("seed lexicon")
}

pub fn candidate(title: &str, url: &str, summary: &str, source: &str, score: u32) -> Candidate {
    Candidate {
        title: title.to_string(),
        canonical_url: url.to_string(),
        raw_content: summary.to_string(),
        source_feed: source.to_string(),
        domain: domain_of(url),
        relevance_score: score,
    }
}

pub fn publish_settings() -> PublishSettings {
    PublishSettings {
        channel_id: "-1001234567890".to_string(),
        min_content_len: 50,
        max_content_len: 800,
        message_ceiling: 3900,
        delivery_attempts: 3,
        fetch_attempts: 1,
        fetch_timeout: Duration::from_secs(15),
        link_preview: false,
    }
}

pub fn ok(body: &str) -> Result<FetchResponse, FetchError> {
    Ok(FetchResponse {
        status: 200,
        body: body.as_bytes().to_vec(),
    })
}

pub fn status(code: u16) -> Result<FetchResponse, FetchError> {
    Ok(FetchResponse {
        status: code,
        body: Vec::new(),
    })
}

/// Per-URL reply queues; the last reply repeats. Unknown URLs are network errors.
#[derive(Default)]
pub struct MapFetcher {
    routes: Mutex<HashMap<String, VecDeque<Result<FetchResponse, FetchError>>>>,
    calls: Mutex<Vec<String>>,
}

impl MapFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, url: &str, reply: Result<FetchResponse, FetchError>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Fetcher for MapFetcher {
    async fn fetch(
        &self,
        url: &str,
        _headers: &[(String, String)],
        _timeout: Duration,
    ) -> Result<FetchResponse, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(url) {
            Some(q) if q.len() > 1 => q.pop_front().unwrap(),
            Some(q) => q.front().cloned().unwrap(),
            None => Err(FetchError::Network(format!("no route for {url}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sent {
    pub channel_id: String,
    pub message: String,
    pub content_type: ContentType,
    pub preview: bool,
}

/// Replies from the script in order, then `Ok(())` forever.
#[derive(Default)]
pub struct ScriptedDeliverer {
    replies: Mutex<VecDeque<Result<(), DeliveryError>>>,
    sent: Mutex<Vec<Sent>>,
}

impl ScriptedDeliverer {
    pub fn new(replies: Vec<Result<(), DeliveryError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Deliverer for ScriptedDeliverer {
    async fn send(
        &self,
        channel_id: &str,
        message: &str,
        content_type: ContentType,
        preview: bool,
    ) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(Sent {
            channel_id: channel_id.to_string(),
            message: message.to_string(),
            content_type,
            preview,
        });
        self.replies.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

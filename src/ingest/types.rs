// src/ingest/types.rs
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::normalize::{fingerprint, Fingerprint};

/// One parsed feed entry, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub summary: String, // description / summary, may hold HTML
}

/// A normalized, scored, not-yet-delivered story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Already normalized.
    pub title: String,
    pub canonical_url: String,
    /// Cleaned summary text from the feed.
    pub raw_content: String,
    /// Feed URL the item came from; the health-tracking identity.
    pub source_feed: String,
    pub domain: String,
    pub relevance_score: u32,
}

impl Candidate {
    /// `(canonical_url, normalized_title_lowercased)`
    pub fn identity(&self) -> (String, String) {
        (self.canonical_url.clone(), self.title.to_lowercase())
    }

    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint(&self.canonical_url, &self.title.to_lowercase())
    }
}

/// Raw HTTP response as seen by the pipeline.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("network error: {0}")]
    Network(String),
}

/// `fetch(url, headers, timeout) -> (status, body) | timeout | network-error`
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<FetchResponse, FetchError>;
}

/// `parse(raw bytes) -> ordered entries`; malformed input yields an empty list.
pub trait FeedParser: Send + Sync {
    fn parse(&self, raw: &[u8]) -> Vec<FeedEntry>;
}

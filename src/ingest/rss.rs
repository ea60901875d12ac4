// src/ingest/rss.rs
//! RSS 2.0 / RSS 1.0 (RDF) / Atom parsing into [`FeedEntry`] lists.
//! Malformed documents yield an empty list and a warning, never an error.

use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::ingest::types::{FeedEntry, FeedParser};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

/// RSS 1.0 keeps `<item>` next to `<channel>`, not inside it.
#[derive(Debug, Deserialize)]
struct Rdf {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<AtomText>,
    #[serde(rename = "link", default)]
    link: Vec<AtomLink>,
    summary: Option<AtomText>,
    content: Option<AtomText>,
}

#[derive(Debug, Deserialize)]
struct AtomText {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href", default)]
    href: String,
    #[serde(rename = "@rel", default)]
    rel: Option<String>,
}

impl AtomEntry {
    fn alternate_href(&self) -> Option<&str> {
        self.link
            .iter()
            .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
            .or_else(|| self.link.first())
            .map(|l| l.href.as_str())
    }
}

/// Parser for the common syndication formats.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyndicationParser;

impl SyndicationParser {
    pub fn parse_str(s: &str) -> Vec<FeedEntry> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(s.trim_start_matches('\u{feff}'));

        let mut entries = match from_str::<Rss>(&xml_clean) {
            Ok(rss) => from_items(rss.channel.item),
            Err(_) => Vec::new(),
        };
        if entries.is_empty() {
            if let Ok(rdf) = from_str::<Rdf>(&xml_clean) {
                entries = from_items(rdf.item);
            }
        }
        if entries.is_empty() {
            match from_str::<AtomFeed>(&xml_clean) {
                Ok(feed) => entries = from_atom(feed.entry),
                Err(e) => {
                    tracing::warn!(target: "ingest", error = %e, "feed document not parseable");
                }
            }
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        entries
    }
}

impl FeedParser for SyndicationParser {
    fn parse(&self, raw: &[u8]) -> Vec<FeedEntry> {
        Self::parse_str(&String::from_utf8_lossy(raw))
    }
}

fn entry(title: Option<String>, link: Option<String>, summary: Option<String>) -> Option<FeedEntry> {
    let title = title.unwrap_or_default().trim().to_string();
    let link = link.unwrap_or_default().trim().to_string();
    if title.is_empty() || link.is_empty() {
        return None;
    }
    Some(FeedEntry {
        title,
        link,
        summary: summary.unwrap_or_default(),
    })
}

fn from_items(items: Vec<Item>) -> Vec<FeedEntry> {
    items
        .into_iter()
        .filter_map(|it| entry(it.title, it.link, it.description.or(it.summary)))
        .collect()
}

fn from_atom(entries: Vec<AtomEntry>) -> Vec<FeedEntry> {
    entries
        .into_iter()
        .filter_map(|e| {
            let link = e.alternate_href().map(str::to_string);
            let summary = e
                .summary
                .map(|t| t.value)
                .filter(|s| !s.trim().is_empty())
                .or(e.content.map(|t| t.value));
            entry(e.title.map(|t| t.value), link, summary)
        })
        .collect()
}

/// HTML named entities that plain XML parsers reject.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&laquo;", "\"")
        .replace("&raquo;", "\"")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

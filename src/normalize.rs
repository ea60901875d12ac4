//! Content normalization: canonical URLs, titles, boilerplate stripping and
//! the fingerprint that identifies a story across runs.
//!
//! Every function here is pure and total: bad input degrades to a best-effort
//! value, never an error.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// Query keys dropped outright (in addition to any `utm*` key).
const TRACKING_KEYS: &[&str] = &[
    "fbclid",
    "gclid",
    "yclid",
    "dclid",
    "msclkid",
    "mc_cid",
    "mc_eid",
    "_openstat",
    "igshid",
];

const MONTHS: &str = r"(?:jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?|январ[ья]|феврал[ья]|март[ае]?|апрел[ья]|ма[ея]|июн[ья]|июл[ья]|август[ае]?|сентябр[ья]|октябр[ья]|ноябр[ья]|декабр[ья])";

fn is_tracking_key(key: &str) -> bool {
    let k = key.to_ascii_lowercase();
    k.starts_with("utm") || TRACKING_KEYS.contains(&k.as_str())
}

/// Drop tracking query parameters and the fragment; keep scheme/host/path and
/// the remaining parameters in their original order.
///
/// Unparseable input is returned trimmed but otherwise untouched.
pub fn canonicalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_key(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept.iter());
    }
    url.set_fragment(None);
    url.to_string()
}

/// Lowercased host without a leading `www.`; falls back to the input.
pub fn domain_of(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(u) => match u.host_str() {
            Some(h) => h.trim_start_matches("www.").to_ascii_lowercase(),
            None => raw.trim().to_ascii_lowercase(),
        },
        Err(_) => raw.trim().to_ascii_lowercase(),
    }
}

static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws regex"));
static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
static RE_ORPHAN_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\s+[.,;:])+(\s|$)").expect("orphan punct regex"));
static RE_CDATA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("cdata regex"));

static RE_TITLE_WORD_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b\d{{1,2}}\s+{MONTHS}\.?\s+\d{{4}}(?:\s*г\.?)?,?"
    ))
    .expect("title word-date regex")
});
static RE_TITLE_US_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b{MONTHS}\.?\s+\d{{1,2}},?\s+\d{{4}}\b,?"))
        .expect("title us-date regex")
});
static RE_NUM_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:\d{4}-\d{2}-\d{2}|\d{1,2}[./-]\d{1,2}[./-]\d{2,4})\b").expect("num date regex")
});
// " — Vedomosti", " - Reuters", " | Example News"
static RE_ATTRIBUTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+[-—–|]\s+([^-—–|]{1,60})$").expect("attribution regex"));

/// Apply `f` until the output stops changing (bounded).
fn to_fixpoint(input: String, f: impl Fn(&str) -> String) -> String {
    let mut cur = input;
    for _ in 0..8 {
        let next = f(&cur);
        if next == cur {
            break;
        }
        cur = next;
    }
    cur
}

fn collapse_ws(s: &str) -> String {
    RE_WS.replace_all(s, " ").trim().to_string()
}

fn normalize_title_once(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    out = RE_TITLE_WORD_DATE.replace_all(&out, " ").to_string();
    out = RE_TITLE_US_DATE.replace_all(&out, " ").to_string();
    out = RE_NUM_DATE.replace_all(&out, " ").to_string();
    out = collapse_ws(&out);

    // Publisher attribution, only if something meaningful stays in front.
    if let Some(m) = RE_ATTRIBUTION.find(&out) {
        if !out[..m.start()].trim().is_empty() {
            out.truncate(m.start());
        }
    }

    let mut out = collapse_ws(&out);
    while let Some(last) = out.chars().last() {
        if matches!(last, '.' | '!' | '?' | ',' | ';' | ':' | '…' | '-' | '—' | '–') {
            out.pop();
        } else {
            break;
        }
    }
    out.trim_end().to_string()
}

/// Strip attribution suffixes, embedded dates and trailing punctuation from a
/// title and collapse whitespace. Idempotent.
pub fn normalize_title(title: &str) -> String {
    if title.trim().is_empty() {
        return String::new();
    }
    to_fixpoint(title.to_string(), normalize_title_once)
}

/// Ordered boilerplate fragments removed from body text.
static BOILERPLATE: Lazy<Vec<Regex>> = Lazy::new(|| {
    let patterns = [
        format!(r"(?i)\b\d{{1,2}}\s+{MONTHS}\.?\s+\d{{4}}\b"),
        format!(r"(?i)\b{MONTHS}\.?\s+\d{{1,2}},\s+\d{{4}}\b"),
        r"\b\d{4}-\d{2}-\d{2}\b".to_string(),
        r"\b\d{1,2}[./-]\d{1,2}[./-]\d{2,4}\b".to_string(),
        r"\b\d{1,2}:\d{2}\b".to_string(),
        r"(?i)\b(?:by|author|correspondent|editor|source|photo|illustration|автор|корреспондент|редакция|источник|фото|иллюстрация)\s*:\s*[^\n.!?]*".to_string(),
        r"(?i)\bread (?:more|also)\b[^\n.!?]*".to_string(),
        r"(?i)читайте также[^\n.!?]*".to_string(),
        r"(?i)\bsubscribe\b[^\n.!?]*".to_string(),
        r"(?i)подпис(?:ывайтесь|ка)[^\n.!?]*".to_string(),
        r"(?i)\b(?:share (?:this|on)|follow us)\b[^\n.!?]*".to_string(),
        r"(?i)мы в соцсетях[^\n.!?]*".to_string(),
        r"(?i)\b(?:advertisement|sponsored content|partner content)\b[^\n.!?]*".to_string(),
        r"(?i)материал.*?партн[её]ров[^\n.!?]*".to_string(),
        r"(?i)реклама[^\n.!?]*".to_string(),
        r"(?i)комментари[йи][^\n.!?]*".to_string(),
        r"(?i)прислать новость[^\n.!?]*".to_string(),
        r"(?i)обсудить в телеграме[^\n.!?]*".to_string(),
        r"https?://\S+".to_string(),
        r"\bwww\.\S+".to_string(),
        r"[!?]{3,}".to_string(),
    ];
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::error!(pattern = %p, error = %e, "boilerplate pattern rejected");
                None
            }
        })
        .collect()
});

fn strip_boilerplate_once(text: &str) -> String {
    let mut out = text.to_string();
    for re in BOILERPLATE.iter() {
        out = re.replace_all(&out, " ").to_string();
    }
    // ". . ." left behind where whole fragments were removed
    out = RE_ORPHAN_PUNCT.replace_all(&out, "$1").to_string();
    collapse_ws(&out)
}

/// Remove bylines, dates, "read more"/share/ad fragments, URLs and shouting
/// punctuation; collapse whitespace. Re-applying to clean text is a no-op.
pub fn strip_boilerplate(text: &str) -> String {
    if text.trim().is_empty() {
        return String::new();
    }
    to_fixpoint(text.to_string(), strip_boilerplate_once)
}

/// Feed-summary HTML to plain text: unwrap CDATA, drop tags, decode entities,
/// collapse whitespace.
pub fn html_to_text(s: &str) -> String {
    let unwrapped = RE_CDATA.replace_all(s, "$1");
    let no_tags = RE_TAGS.replace_all(&unwrapped, " ");
    let decoded = html_escape::decode_html_entities(&no_tags).replace('\u{00A0}', " ");
    collapse_ws(&decoded)
}

/// Deterministic identity digest of a story (hex SHA-256).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Rehydrate a stored digest; rejects anything that is not 64 hex chars.
    pub fn parse(s: &str) -> Option<Self> {
        let t = s.trim();
        (t.len() == 64 && t.chars().all(|c| c.is_ascii_hexdigit()))
            .then(|| Self(t.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for logs.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Digest of `(canonical_url, normalized_title_lowercased)`.
pub fn fingerprint(canonical_url: &str, normalized_title_lower: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(canonical_url.as_bytes());
    hasher.update(b"|");
    hasher.update(normalized_title_lower.as_bytes());
    Fingerprint(format!("{:x}", hasher.finalize()))
}

/// Identity key used for in-batch collapsing; same inputs as the fingerprint.
pub fn identity_key(url: &str, title: &str) -> (String, String) {
    (canonicalize_url(url), normalize_title(title).to_lowercase())
}

/// Fingerprint straight from raw URL + title.
pub fn fingerprint_of(url: &str, title: &str) -> Fingerprint {
    let (u, t) = identity_key(url, title);
    fingerprint(&u, &t)
}

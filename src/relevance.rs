// src/relevance.rs
//! Relevance gate: keyword lexicon, exclusion vetoes and scoring.
//!
//! Scoring is deliberately simple and explainable:
//! - any exclusion pattern match → score 0 (absolute veto);
//! - otherwise each lexicon keyword mentioned in `title + body` adds its weight
//!   once (core keywords 2, others 1);
//! - `is_relevant` compares against a fixed threshold from config.
//!
//! The lexicon also carries the hashtag and emoji tables used when formatting
//! the outgoing message, so a deployment retargets to a new topic by swapping
//! one TOML file.

use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

pub const DEFAULT_RELEVANCE_THRESHOLD: u32 = 2;
pub const ENV_RELEVANCE_THRESHOLD: &str = "RELEVANCE_THRESHOLD";

const CORE_WEIGHT: u32 = 2;
const REGULAR_WEIGHT: u32 = 1;

/* ----------------------------
Config schema (from TOML)
---------------------------- */

#[derive(Debug, Clone, Deserialize)]
pub struct Lexicon {
    #[serde(default = "default_threshold")]
    pub threshold: u32,
    /// Keywords worth 1 point each.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Keywords worth 2 points each.
    #[serde(default)]
    pub core: Vec<String>,
    /// Regexes marking off-topic items (promo, video, opinion, gossip).
    #[serde(default)]
    pub exclusions: Vec<String>,
    #[serde(default)]
    pub hashtags: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub hashtag_groups: Vec<HashtagGroup>,
    #[serde(default)]
    pub emoji: BTreeMap<String, String>,
    #[serde(default = "default_emoji")]
    pub default_emoji: String,
}

/// One extra tag added when any of `any` is mentioned.
#[derive(Debug, Clone, Deserialize)]
pub struct HashtagGroup {
    pub tag: String,
    pub any: Vec<String>,
}

fn default_threshold() -> u32 {
    DEFAULT_RELEVANCE_THRESHOLD
}

fn default_emoji() -> String {
    "📰".to_string()
}

impl Lexicon {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let mut lex: Lexicon = toml::from_str(s)?;
        lex.keywords = clean_terms(lex.keywords);
        lex.core = clean_terms(lex.core);
        Ok(lex)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read lexicon at {}: {}", path.display(), e)
        })?;
        Self::from_toml_str(&content)
    }

    /// Built-in finance lexicon used when no file is configured.
    pub fn default_seed() -> Self {
        let core = [
            "bank",
            "central bank",
            "key rate",
            "interest rate",
            "inflation",
            "mortgage",
            "deposit",
            "loan",
            "credit",
            "bond",
            "stock",
            "exchange rate",
            "federal reserve",
            "fed",
            "ecb",
        ];
        let keywords = [
            "ruble",
            "dollar",
            "euro",
            "currency",
            "market",
            "invest",
            "financ",
            "econom",
            "liquidity",
            "dividend",
            "crisis",
            "sanction",
            "regulator",
            "refinanc",
            "savings",
            "broker",
            "quote",
            "index",
            "capitalization",
            "asset",
            "profit",
            "loss",
            "earnings",
            "budget",
            "tax",
            "tariff",
            "insurance",
            "pension",
            "leasing",
            "bankrupt",
            "forex",
            "portfolio",
            "yield",
            "oil",
            "gas",
            "crypto",
            "bitcoin",
            "trading",
            "shares",
            "payment",
        ];
        let exclusions = [
            r"(?i)\bvideos?\b",
            r"(?i)\bwatch live\b",
            r"(?i)\bpodcast\b",
            r"(?i)\bsponsored\b",
            r"(?i)\bpromo(?:tion|code)?\b",
            r"(?i)\bpartner content\b",
            r"(?i)\bopinion\b",
            r"(?i)\bop-ed\b",
            r"(?i)\bcolumn:",
            r"(?i)\bgossip\b",
            r"(?i)\bcelebrit(?:y|ies)\b",
            r"(?i)\bhoroscope\b",
            r"(?i)видео",
            r"(?i)\bреклама\b",
        ];

        let mut hashtags = BTreeMap::new();
        for (k, tags) in [
            ("bank", &["#banks", "#finance"][..]),
            ("central bank", &["#centralbank", "#regulator"][..]),
            ("key rate", &["#keyrate", "#rates"][..]),
            ("interest rate", &["#rates"][..]),
            ("loan", &["#loans", "#credit"][..]),
            ("credit", &["#credit"][..]),
            ("mortgage", &["#mortgage", "#realestate"][..]),
            ("deposit", &["#deposits", "#savings"][..]),
            ("stock", &["#stocks", "#investing"][..]),
            ("bond", &["#bonds", "#fixedincome"][..]),
            ("ruble", &["#ruble", "#fx"][..]),
            ("dollar", &["#usd", "#fx"][..]),
            ("euro", &["#eur", "#fx"][..]),
            ("inflation", &["#inflation", "#economy"][..]),
            ("federal reserve", &["#fed", "#usa"][..]),
            ("crypto", &["#crypto", "#blockchain"][..]),
            ("oil", &["#oil", "#energy"][..]),
            ("gas", &["#gas", "#energy"][..]),
            ("econom", &["#economy", "#macro"][..]),
        ] {
            hashtags.insert(
                k.to_string(),
                tags.iter().map(|t| t.to_string()).collect::<Vec<_>>(),
            );
        }

        let hashtag_groups = vec![
            group("#investing", &["exchange", "trading", "invest"]),
            group("#crypto", &["crypto", "bitcoin", "blockchain"]),
            group("#energy", &["oil", "gas", "energy"]),
            group("#geopolitics", &["sanction", "embargo", "restriction"]),
        ];

        let mut emoji = BTreeMap::new();
        for (k, e) in [
            ("bank", "🏦"),
            ("central bank", "🏛️"),
            ("credit", "💳"),
            ("loan", "💳"),
            ("mortgage", "🏠"),
            ("deposit", "💰"),
            ("stock", "📈"),
            ("bond", "📊"),
            ("ruble", "₽"),
            ("dollar", "💵"),
            ("euro", "💶"),
            ("inflation", "📉"),
            ("key rate", "📌"),
            ("federal reserve", "🇺🇸"),
            ("crypto", "₿"),
            ("bitcoin", "₿"),
            ("oil", "🛢️"),
            ("gas", "🔥"),
            ("econom", "🌐"),
            ("market", "🤝"),
            ("invest", "💼"),
            ("liquidity", "💧"),
            ("dividend", "🎁"),
            ("crisis", "⚠️"),
            ("sanction", "🚫"),
            ("regulator", "👮"),
        ] {
            emoji.insert(k.to_string(), e.to_string());
        }

        Self {
            threshold: DEFAULT_RELEVANCE_THRESHOLD,
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            core: core.iter().map(|s| s.to_string()).collect(),
            exclusions: exclusions.iter().map(|s| s.to_string()).collect(),
            hashtags,
            hashtag_groups,
            emoji,
            default_emoji: default_emoji(),
        }
    }
}

fn group(tag: &str, any: &[&str]) -> HashtagGroup {
    HashtagGroup {
        tag: tag.to_string(),
        any: any.iter().map(|s| s.to_string()).collect(),
    }
}

/// Lowercase, trim, drop empties and duplicates (order kept).
fn clean_terms(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim().to_lowercase();
        if !t.is_empty() && !out.contains(&t) {
            out.push(t);
        }
    }
    out
}

// parse optional integer env override
fn parse_threshold_env(raw: Option<String>) -> Option<u32> {
    raw.and_then(|s| s.trim().parse::<u32>().ok())
}

/// True if `needle` occurs in `haystack` starting at a word boundary.
/// Both sides are expected lowercased. Prefix matching lets "invest" cover
/// "investor" while "rate" does not fire inside "corporate".
pub fn mentions(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(i, _)| {
        haystack[..i]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric())
    })
}

/// Result of relevance evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relevance {
    pub score: u32,
    pub matched: Vec<String>,
    /// Exclusion pattern that vetoed the item, if any.
    pub vetoed_by: Option<String>,
}

/* ----------------------------
Compiled classifier
---------------------------- */

#[derive(Debug)]
pub struct RelevanceClassifier {
    lexicon: Lexicon,
    weighted: Vec<(String, u32)>,
    exclusions: Vec<Regex>,
}

impl RelevanceClassifier {
    pub fn new(lexicon: Lexicon) -> anyhow::Result<Self> {
        let exclusions = lexicon
            .exclusions
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| anyhow::anyhow!("exclusion `{}` regex error: {}", p, e))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        // Core wins if a term is listed in both.
        let mut weighted: Vec<(String, u32)> =
            lexicon.core.iter().map(|k| (k.clone(), CORE_WEIGHT)).collect();
        for k in &lexicon.keywords {
            if !lexicon.core.contains(k) {
                weighted.push((k.clone(), REGULAR_WEIGHT));
            }
        }

        Ok(Self {
            lexicon,
            weighted,
            exclusions,
        })
    }

    /// Load the lexicon from `path` (or the built-in seed) and apply the
    /// optional `RELEVANCE_THRESHOLD` env override.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut lex = match path {
            Some(p) => Lexicon::load_from_file(p)?,
            None => Lexicon::default_seed(),
        };
        if let Some(t) = parse_threshold_env(std::env::var(ENV_RELEVANCE_THRESHOLD).ok()) {
            lex.threshold = t;
        }
        Self::new(lex)
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    pub fn threshold(&self) -> u32 {
        self.lexicon.threshold
    }

    /// Full evaluation: veto check, then per-keyword contributions.
    pub fn evaluate(&self, title: &str, body: &str) -> Relevance {
        let text = format!("{} {}", title, body).to_lowercase();

        if let Some(re) = self.exclusions.iter().find(|re| re.is_match(&text)) {
            debug!(target: "relevance", pattern = re.as_str(), "vetoed");
            return Relevance {
                score: 0,
                matched: Vec::new(),
                vetoed_by: Some(re.as_str().to_string()),
            };
        }

        let mut rel = Relevance::default();
        for (kw, w) in &self.weighted {
            if mentions(&text, kw) {
                rel.score += w;
                rel.matched.push(kw.clone());
            }
        }
        rel
    }

    pub fn score(&self, title: &str, body: &str) -> u32 {
        self.evaluate(title, body).score
    }

    pub fn is_relevant(&self, title: &str, body: &str) -> bool {
        self.score(title, body) >= self.lexicon.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_TOML: &str = r##"
threshold = 3
core = ["bank", "inflation"]
keywords = ["market", " Dividend ", "", "market"]
exclusions = ["(?i)\\bvideo\\b", "(?i)\\bsponsored\\b"]

[hashtags]
bank = ["#banks"]

[emoji]
bank = "🏦"
"##;

    fn clf() -> RelevanceClassifier {
        RelevanceClassifier::new(Lexicon::from_toml_str(TEST_TOML).expect("toml")).expect("clf")
    }

    #[test]
    fn terms_are_cleaned() {
        let lex = Lexicon::from_toml_str(TEST_TOML).unwrap();
        assert_eq!(lex.keywords, vec!["market".to_string(), "dividend".to_string()]);
        assert_eq!(lex.default_emoji, "📰");
    }

    #[test]
    fn core_counts_double_and_once() {
        let c = clf();
        // bank (2) + market (1); repetition does not add
        let r = c.evaluate("Bank bank BANK", "the market and the market again");
        assert_eq!(r.score, 3);
        assert_eq!(r.matched, vec!["bank".to_string(), "market".to_string()]);
        assert!(c.is_relevant("Bank", "market"));
    }

    #[test]
    fn single_regular_keyword_below_threshold() {
        let c = clf();
        assert_eq!(c.score("Quiet day", "the market drifted"), 1);
        assert!(!c.is_relevant("Quiet day", "the market drifted"));
    }

    #[test]
    fn exclusion_is_absolute_veto() {
        let c = clf();
        let r = c.evaluate(
            "VIDEO: bank inflation market dividend",
            "bank inflation market dividend",
        );
        assert_eq!(r.score, 0);
        assert!(r.vetoed_by.is_some());
        assert!(r.matched.is_empty());
    }

    #[test]
    fn word_prefix_matching() {
        assert!(mentions("investors cheer", "invest"));
        assert!(mentions("(bank) holiday", "bank"));
        assert!(!mentions("corporate news", "rate"));
        assert!(!mentions("anything", ""));
        assert!(mentions("ставка цб снижена", "цб"));
    }

    #[test]
    fn bad_exclusion_regex_is_an_error() {
        let mut lex = Lexicon::from_toml_str(TEST_TOML).unwrap();
        lex.exclusions.push("(unclosed".into());
        assert!(RelevanceClassifier::new(lex).is_err());
    }

    #[test]
    fn default_seed_scores_finance_text() {
        let c = RelevanceClassifier::new(Lexicon::default_seed()).unwrap();
        assert!(c.is_relevant("Central bank raises key rate", "Inflation remains high"));
        assert!(!c.is_relevant("Local team wins cup", "Fans celebrated downtown"));
        assert_eq!(c.score("Watch the video", "bank inflation"), 0);
    }
}

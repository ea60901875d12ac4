// src/extract.rs
//! Full-article text extraction.
//!
//! Each publisher domain maps to an [`ExtractStrategy`] (a prioritized list of
//! content-region selectors). Unknown domains use the generic strategy. Page
//! chrome (scripts, navigation, ad and share blocks) never contributes text.

use scraper::node::Element;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, warn};

use crate::normalize::strip_boilerplate;

/// `extract(html document, domain hint) -> plain text`
pub trait TextExtractor: Send + Sync {
    fn extract(&self, html: &str, domain: &str) -> String;
}

/// Picks the content region of a parsed page.
pub trait ExtractStrategy: Send + Sync {
    fn name(&self) -> &str;
    /// First matching region with non-empty text, if any.
    fn content_region<'a>(&self, doc: &'a Html) -> Option<ElementRef<'a>>;
}

/// Tries CSS selectors in order.
pub struct SelectorChain {
    name: String,
    selectors: Vec<Selector>,
}

impl SelectorChain {
    pub fn new(name: &str, selectors: &[&str]) -> Self {
        let selectors = selectors
            .iter()
            .filter_map(|s| match Selector::parse(s) {
                Ok(sel) => Some(sel),
                Err(e) => {
                    warn!(target: "extract", selector = %s, error = ?e, "invalid selector skipped");
                    None
                }
            })
            .collect();
        Self {
            name: name.to_string(),
            selectors,
        }
    }
}

impl ExtractStrategy for SelectorChain {
    fn name(&self) -> &str {
        &self.name
    }

    fn content_region<'a>(&self, doc: &'a Html) -> Option<ElementRef<'a>> {
        self.selectors.iter().find_map(|sel| {
            doc.select(sel)
                .find(|el| !visible_text(*el).trim().is_empty())
        })
    }
}

const GENERIC_SELECTORS: &[&str] = &[
    ".article-content",
    ".post-content",
    ".entry-content",
    ".article__body",
    ".article-body",
    "article",
    ".content",
];

const CHROME_TAGS: &[&str] = &[
    "head",
    "script",
    "style",
    "noscript",
    "nav",
    "header",
    "footer",
    "aside",
    "advertisement",
    "iframe",
    "form",
    "template",
];

const CHROME_CLASS_WORDS: &[&str] = &[
    "advert",
    "banner",
    "promo",
    "recommended",
    "social",
    "share",
    "clip",
];

fn is_chrome(el: &Element) -> bool {
    if CHROME_TAGS.contains(&el.name()) {
        return true;
    }
    el.classes().any(|c| {
        let c = c.to_ascii_lowercase();
        c == "ad"
            || c == "ads"
            || c.starts_with("ad-")
            || c.starts_with("ad_")
            || c.ends_with("-ad")
            || CHROME_CLASS_WORDS.iter().any(|w| c.contains(w))
    })
}

/// Text under `root`, skipping any node inside a chrome element.
pub fn visible_text(root: ElementRef<'_>) -> String {
    let root_id = root.id();
    let mut out = String::new();
    for node in root.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .take_while(|a| a.id() != root_id)
            .chain(std::iter::once(*root))
            .filter_map(|a| a.value().as_element())
            .any(is_chrome);
        if hidden {
            continue;
        }
        out.push_str(text);
        out.push(' ');
    }
    out
}

/// Domain-suffix keyed strategy map with a generic fallback.
pub struct ExtractorRegistry {
    by_domain: Vec<(String, Box<dyn ExtractStrategy>)>,
    fallback: Box<dyn ExtractStrategy>,
}

impl ExtractorRegistry {
    /// Only the generic fallback.
    pub fn empty() -> Self {
        Self {
            by_domain: Vec::new(),
            fallback: Box::new(SelectorChain::new("generic", GENERIC_SELECTORS)),
        }
    }

    /// Built-in per-publisher strategies.
    pub fn with_defaults() -> Self {
        let mut reg = Self::empty();
        reg.register("finam.ru", SelectorChain::new("finam", &[".article__body", ".content", "article"]));
        reg.register("cbr.ru", SelectorChain::new("cbr", &[".content", ".text", "article"]));
        reg.register(
            "vedomosti.ru",
            SelectorChain::new("vedomosti", &[".article__body", ".article-body", "article"]),
        );
        reg.register("arb.ru", SelectorChain::new("arb", &[".news-detail", ".content", "article"]));
        let newsroom = &[
            ".article__text",
            ".article__content",
            ".news-text",
            ".article-content",
            "article",
        ];
        for d in ["kommersant.ru", "rbc.ru", "banki.ru"] {
            reg.register(d, SelectorChain::new(d, newsroom));
        }
        reg
    }

    /// Later registrations for the same suffix take precedence.
    pub fn register(&mut self, domain_suffix: &str, strategy: impl ExtractStrategy + 'static) {
        self.by_domain
            .insert(0, (domain_suffix.to_ascii_lowercase(), Box::new(strategy)));
    }

    pub fn strategy_for(&self, domain: &str) -> &dyn ExtractStrategy {
        let domain = domain.to_ascii_lowercase();
        self.by_domain
            .iter()
            .find(|(suffix, _)| {
                domain == *suffix
                    || domain
                        .strip_suffix(suffix.as_str())
                        .is_some_and(|head| head.ends_with('.'))
            })
            .map(|(_, s)| s.as_ref())
            .unwrap_or(self.fallback.as_ref())
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl TextExtractor for ExtractorRegistry {
    fn extract(&self, html: &str, domain: &str) -> String {
        let doc = Html::parse_document(html);
        let strategy = self.strategy_for(domain);
        let text = match strategy.content_region(&doc) {
            Some(region) => visible_text(region),
            None => {
                debug!(target: "extract", strategy = strategy.name(), domain, "no content region; using whole document");
                visible_text(doc.root_element())
            }
        };
        strip_boilerplate(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><title>T</title><script>var x = 1;</script></head>
<body>
<header><nav>Home | Markets</nav></header>
<div class="content">Sidebar content block</div>
<div class="article__body">
  <p>The central bank held its key rate.</p>
  <div class="share-buttons">Share on X</div>
  <p>Analysts expect a cut in spring.</p>
  <div class="ad-slot">Buy now</div>
</div>
<footer>Copyright</footer>
</body></html>"#;

    #[test]
    fn domain_strategy_picks_its_region() {
        let reg = ExtractorRegistry::with_defaults();
        let text = reg.extract(PAGE, "www.finam.ru");
        assert_eq!(
            text,
            "The central bank held its key rate. Analysts expect a cut in spring."
        );
    }

    #[test]
    fn suffix_match_requires_label_boundary() {
        let reg = ExtractorRegistry::with_defaults();
        assert_eq!(reg.strategy_for("news.rbc.ru").name(), "rbc.ru");
        assert_eq!(reg.strategy_for("notrbc.ru").name(), "generic");
    }

    #[test]
    fn whole_document_fallback_drops_chrome() {
        let reg = ExtractorRegistry::empty();
        let html = "<html><body><nav>Menu</nav><p>Plain page about bonds.</p><script>x()</script></body></html>";
        assert_eq!(reg.extract(html, "example.com"), "Plain page about bonds.");
    }

    #[test]
    fn registered_strategy_overrides_default() {
        let mut reg = ExtractorRegistry::with_defaults();
        reg.register("finam.ru", SelectorChain::new("custom", &[".content"]));
        assert_eq!(reg.strategy_for("finam.ru").name(), "custom");
        assert_eq!(reg.extract(PAGE, "finam.ru"), "Sidebar content block");
    }
}

// src/format.rs
//! Outgoing message rendering (Telegram HTML subset).
//!
//! Layout:
//! ```text
//! <b>{emoji} {title}</b>
//!
//! {paragraph of ≤ 2 sentences}
//!
//! {paragraph ...}
//!
//! 👉 <a href="{url}">Read more</a>
//!
//! #tag1 #tag2
//! ```

use std::collections::BTreeSet;

use crate::relevance::{mentions, Lexicon};

pub const MAX_HASHTAGS: usize = 5;
/// How far back from the budget a sentence end may sit and still be used.
pub const SENTENCE_LOOKBACK: usize = 100;
/// Paragraphs this short are leftovers, not content.
const MIN_PARAGRAPH_CHARS: usize = 20;
const SENTENCES_PER_PARAGRAPH: usize = 2;
const READ_MORE_LABEL: &str = "Read more";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedMessage {
    pub html: String,
    pub emoji: String,
    pub hashtags: Vec<String>,
}

impl FormattedMessage {
    pub fn char_len(&self) -> usize {
        self.html.chars().count()
    }
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Cut `text` to at most `max` chars, preferring the last sentence end
/// within the final [`SENTENCE_LOOKBACK`] chars of the budget; otherwise a
/// hard cut marked with `…`.
pub fn smart_truncate(text: &str, max: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max {
        return text.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let window = &chars[..max];
    if let Some(i) = window.iter().rposition(|c| is_terminator(*c)) {
        if i + SENTENCE_LOOKBACK > max {
            return window[..=i].iter().collect();
        }
    }
    let cut: String = chars[..max - 1].iter().collect();
    format!("{}…", cut.trim_end())
}

/// Sentences end at `.`, `!` or `?` followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut prev_terminal = false;
    for (i, c) in text.char_indices() {
        if prev_terminal && c.is_whitespace() {
            let s = text[start..i].trim();
            if !s.is_empty() {
                out.push(s);
            }
            start = i;
        }
        prev_terminal = is_terminator(c);
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Group sentences two per paragraph; drop fragments of ≤ 20 chars.
pub fn paragraphs(text: &str) -> Vec<String> {
    split_sentences(text)
        .chunks(SENTENCES_PER_PARAGRAPH)
        .map(|chunk| chunk.join(" "))
        .filter(|p| p.chars().count() > MIN_PARAGRAPH_CHARS)
        .collect()
}

/// Keyword table plus group rules; sorted, at most [`MAX_HASHTAGS`].
pub fn derive_hashtags(lexicon: &Lexicon, text: &str) -> Vec<String> {
    let text = text.to_lowercase();
    let mut tags: BTreeSet<String> = BTreeSet::new();
    for (kw, set) in &lexicon.hashtags {
        if mentions(&text, &kw.to_lowercase()) {
            tags.extend(set.iter().cloned());
        }
    }
    for g in &lexicon.hashtag_groups {
        if g.any.iter().any(|w| mentions(&text, &w.to_lowercase())) {
            tags.insert(g.tag.clone());
        }
    }
    tags.into_iter().take(MAX_HASHTAGS).collect()
}

/// Longest matching keyword wins; equal lengths go alphabetically.
pub fn pick_emoji<'a>(lexicon: &'a Lexicon, text: &str) -> &'a str {
    let text = text.to_lowercase();
    let mut best: Option<(&String, &String)> = None;
    for (kw, emoji) in &lexicon.emoji {
        if !mentions(&text, &kw.to_lowercase()) {
            continue;
        }
        let longer = best.map_or(true, |(cur, _)| kw.chars().count() > cur.chars().count());
        if longer {
            best = Some((kw, emoji));
        }
    }
    best.map(|(_, e)| e.as_str())
        .unwrap_or(lexicon.default_emoji.as_str())
}

/// Drop a leading copy of the title (plus separator punctuation) from the body.
pub fn strip_title_prefix<'a>(body: &'a str, title: &str) -> &'a str {
    if title.is_empty() {
        return body;
    }
    match body.strip_prefix(title) {
        Some(rest) => rest.trim_start_matches([':', '.', '-', ' ']),
        None => body,
    }
}

#[derive(Debug, Clone)]
pub struct MessageFormatter<'a> {
    lexicon: &'a Lexicon,
    max_content_len: usize,
    ceiling: usize,
}

impl<'a> MessageFormatter<'a> {
    pub fn new(lexicon: &'a Lexicon, max_content_len: usize, ceiling: usize) -> Self {
        Self {
            lexicon,
            max_content_len,
            ceiling,
        }
    }

    pub fn format(&self, title: &str, body: &str, url: &str) -> FormattedMessage {
        let full = format!("{title} {body}");
        let mut hashtags = derive_hashtags(self.lexicon, &full);
        let emoji = pick_emoji(self.lexicon, &full).to_string();

        let mut truncated = smart_truncate(strip_title_prefix(body.trim(), title), self.max_content_len);
        let mut title = title.to_string();
        let link = format!(
            "\n\n👉 <a href=\"{}\">{}</a>",
            html_escape::encode_double_quoted_attribute(url),
            READ_MORE_LABEL
        );
        let build = |title: &str, body: &str, hashtags: &[String]| {
            assemble(&emoji, title, &render_body(body), &link, hashtags)
        };
        let overflow = |html: &str| html.chars().count().saturating_sub(self.ceiling);

        // body first, then hashtags, then the title; markup is never cut
        let mut html = build(&title, &truncated, &hashtags);
        while overflow(&html) > 0 && !truncated.is_empty() {
            let budget = truncated.chars().count().saturating_sub(overflow(&html) + 16);
            truncated = smart_truncate(&truncated, budget);
            html = build(&title, &truncated, &hashtags);
        }
        if overflow(&html) > 0 && !hashtags.is_empty() {
            hashtags.clear();
            html = build(&title, &truncated, &hashtags);
        }
        while overflow(&html) > 0 && !title.is_empty() {
            let budget = title.chars().count().saturating_sub(overflow(&html) + 1);
            title = smart_truncate(&title, budget);
            html = build(&title, &truncated, &hashtags);
        }
        if overflow(&html) > 0 {
            let keep = self.ceiling.saturating_sub(3);
            html = html.chars().take(keep).collect::<String>() + "...";
        }

        FormattedMessage {
            html,
            emoji,
            hashtags,
        }
    }
}

fn assemble(emoji: &str, title: &str, body_html: &str, link: &str, hashtags: &[String]) -> String {
    let mut html = format!("<b>{} {}</b>\n\n{}{}", emoji, html_escape::encode_text(title), body_html, link);
    if !hashtags.is_empty() {
        html.push_str("\n\n");
        html.push_str(&hashtags.join(" "));
    }
    html
}

fn render_body(text: &str) -> String {
    html_escape::encode_text(&paragraphs(text).join("\n\n")).into_owned()
}

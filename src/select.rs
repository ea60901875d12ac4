// src/select.rs
//! Fair selector: collapse batch duplicates, drop already-delivered stories,
//! rank, then fill up to K slots preferring domains that are missing from the
//! recent rotation and never repeating a domain back-to-back while an
//! alternative exists.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::{debug, info};

use crate::ingest::Candidate;
use crate::store::{FingerprintStore, RotationHistory, SourceHealth};

#[derive(Debug, Default)]
pub struct Selection {
    pub picked: Vec<Candidate>,
    /// Items folded into another with the same identity.
    pub collapsed: usize,
    /// Items whose fingerprint was already delivered.
    pub already_delivered: usize,
}

/// Highest score wins; on ties the first-seen item stays. The survivor keeps
/// the position of the first occurrence.
pub fn collapse_duplicates(candidates: Vec<Candidate>) -> (Vec<Candidate>, usize) {
    let mut out: Vec<Candidate> = Vec::with_capacity(candidates.len());
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut folded = 0usize;
    for c in candidates {
        match index.get(&c.identity()) {
            Some(&i) => {
                folded += 1;
                if c.relevance_score > out[i].relevance_score {
                    out[i] = c;
                }
            }
            None => {
                index.insert(c.identity(), out.len());
                out.push(c);
            }
        }
    }
    (out, folded)
}

/// Pure selection core. `recently_used(domain)` reports rotation membership,
/// `weight(candidate)` the source health tiebreaker.
pub fn pick_fair<R, W>(
    candidates: Vec<Candidate>,
    k: usize,
    is_delivered: impl Fn(&Candidate) -> bool,
    recently_used: R,
    weight: W,
) -> Selection
where
    R: Fn(&str) -> bool,
    W: Fn(&Candidate) -> f64,
{
    let (unique, collapsed) = collapse_duplicates(candidates);
    let before = unique.len();
    let fresh_items: Vec<Candidate> = unique.into_iter().filter(|c| !is_delivered(c)).collect();
    let already_delivered = before - fresh_items.len();

    // stable: ingestion order breaks remaining ties
    let mut ranked: Vec<(Candidate, f64)> = fresh_items
        .into_iter()
        .map(|c| {
            let w = weight(&c);
            (c, w)
        })
        .collect();
    ranked.sort_by(|(a, wa), (b, wb)| {
        b.relevance_score
            .cmp(&a.relevance_score)
            .then_with(|| wb.partial_cmp(wa).unwrap_or(Ordering::Equal))
    });

    let (fresh, seen): (Vec<Candidate>, Vec<Candidate>) = ranked
        .into_iter()
        .map(|(c, _)| c)
        .partition(|c| !recently_used(&c.domain));
    let mut pool: Vec<Candidate> = fresh.into_iter().chain(seen).collect();

    let mut picked: Vec<Candidate> = Vec::with_capacity(k.min(pool.len()));
    while picked.len() < k && !pool.is_empty() {
        let last = picked.last().map(|c| c.domain.as_str());
        let idx = pool
            .iter()
            .position(|c| Some(c.domain.as_str()) != last)
            .unwrap_or(0);
        picked.push(pool.remove(idx));
    }

    Selection {
        picked,
        collapsed,
        already_delivered,
    }
}

/// Selection against the persisted stores. Every picked domain is pushed to
/// the rotation history and persisted before any delivery happens.
pub fn select_fair(
    candidates: Vec<Candidate>,
    k: usize,
    fingerprints: &FingerprintStore,
    rotation: &mut RotationHistory,
    health: &SourceHealth,
    now: DateTime<Utc>,
) -> Selection {
    let offered = candidates.len();
    let sel = pick_fair(
        candidates,
        k,
        |c| fingerprints.contains(&c.fingerprint()),
        |d| rotation.contains(d),
        |c| health.weight(&c.source_feed, now),
    );

    for c in &sel.picked {
        debug!(target: "select", domain = %c.domain, score = c.relevance_score, fp = %c.fingerprint().short(), "picked");
        rotation.push(c.domain.clone());
    }
    if !sel.picked.is_empty() {
        rotation.persist();
    }

    counter!("select_picked_total").increment(sel.picked.len() as u64);
    info!(
        target: "select",
        offered,
        collapsed = sel.collapsed,
        already_delivered = sel.already_delivered,
        picked = sel.picked.len(),
        "selection done"
    );
    sel
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(domain: &str, path: &str, title: &str, score: u32) -> Candidate {
        Candidate {
            title: title.into(),
            canonical_url: format!("https://{domain}/{path}"),
            raw_content: String::new(),
            source_feed: format!("https://{domain}/rss"),
            domain: domain.into(),
            relevance_score: score,
        }
    }

    fn never(_: &Candidate) -> bool {
        false
    }

    #[test]
    fn collapse_keeps_highest_score_at_first_position() {
        let (v, folded) = collapse_duplicates(vec![
            cand("a.com", "1", "Same", 2),
            cand("b.com", "1", "Other", 3),
            cand("a.com", "1", "same", 5),
            cand("a.com", "1", "Same", 5),
        ]);
        assert_eq!(folded, 2);
        assert_eq!(v.len(), 2);
        assert_eq!(v[0].relevance_score, 5);
        assert_eq!(v[0].title, "same");
        assert_eq!(v[1].domain, "b.com");
    }

    #[test]
    fn never_more_than_k_and_no_back_to_back() {
        let items = vec![
            cand("a.com", "1", "A1", 9),
            cand("a.com", "2", "A2", 8),
            cand("a.com", "3", "A3", 7),
            cand("b.com", "1", "B1", 1),
            cand("c.com", "1", "C1", 1),
        ];
        let sel = pick_fair(items, 4, never, |_| false, |_| 0.5);
        let doms: Vec<&str> = sel.picked.iter().map(|c| c.domain.as_str()).collect();
        assert_eq!(doms, vec!["a.com", "b.com", "a.com", "c.com"]);
    }

    #[test]
    fn relaxes_when_only_one_domain_left() {
        let items = vec![cand("a.com", "1", "A1", 3), cand("a.com", "2", "A2", 2)];
        let sel = pick_fair(items, 3, never, |_| false, |_| 0.5);
        assert_eq!(sel.picked.len(), 2);
    }

    #[test]
    fn fresh_domain_beats_recent_one_at_equal_rank() {
        let items = vec![cand("a.com", "1", "A", 4), cand("b.com", "1", "B", 4)];
        let sel = pick_fair(items, 1, never, |d| d == "a.com", |_| 0.5);
        assert_eq!(sel.picked[0].domain, "b.com");
    }

    #[test]
    fn health_weight_breaks_score_ties() {
        let items = vec![cand("a.com", "1", "A", 4), cand("b.com", "1", "B", 4)];
        let sel = pick_fair(items, 2, never, |_| false, |c| if c.domain == "b.com" { 0.9 } else { 0.2 });
        assert_eq!(sel.picked[0].domain, "b.com");
    }

    #[test]
    fn delivered_items_are_excluded() {
        let items = vec![cand("a.com", "1", "A", 4), cand("b.com", "1", "B", 1)];
        let sel = pick_fair(items, 2, |c| c.domain == "a.com", |_| false, |_| 0.5);
        assert_eq!(sel.already_delivered, 1);
        assert_eq!(sel.picked.len(), 1);
        assert_eq!(sel.picked[0].domain, "b.com");
    }
}

//! Capability matcher
//!
//! Scores live candidates against a task description and picks one. The
//! scoring function is pluggable; selection is not. Candidates are ordered by
//! score (highest first) with ties going to the lexicographically smallest
//! name, and nothing below `min_score` is ever selected unless it carries the
//! capability the caller asked for.

use agentrelay_core::config::MatcherConfig;
use agentrelay_core::AgentCard;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Relevance of one card to a task description. Must be deterministic.
pub trait Scorer: Send + Sync {
    fn score(&self, description: &str, card: &AgentCard) -> f64;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Selected(AgentCard),
    NoMatch,
}

/// Tag overlap blended with word overlap against the card's name and description.
///
/// A capability tag counts as hit when every word of it occurs in the
/// description. Any hit earns half the tag credit and covering more of the
/// card's tags earns the rest, so a broad agent is not penalised for the
/// tags a task does not touch. Word overlap separates agents whose tags tie.
#[derive(Debug, Clone, Copy)]
pub struct KeywordScorer {
    pub tag_weight: f64,
    pub text_weight: f64,
}

impl Default for KeywordScorer {
    fn default() -> Self {
        Self {
            tag_weight: 0.7,
            text_weight: 0.3,
        }
    }
}

impl Scorer for KeywordScorer {
    fn score(&self, description: &str, card: &AgentCard) -> f64 {
        let query = terms(description);
        if query.is_empty() {
            return 0.0;
        }

        let query_words = words(description);
        let hits = card
            .capabilities
            .iter()
            .filter(|tag| {
                let tag_words = words(tag);
                !tag_words.is_empty() && tag_words.is_subset(&query_words)
            })
            .count();
        let tag_score = if hits == 0 {
            0.0
        } else {
            0.5 + 0.5 * hits as f64 / card.capabilities.len() as f64
        };

        let card_text = terms(&format!("{} {}", card.name, card.description));
        self.tag_weight * tag_score + self.text_weight * jaccard(&query, &card_text)
    }
}

/// Lowercased words, split on anything non-alphanumeric. Tags are matched on these,
/// so short tags like `ml` or `qa` still count.
fn words(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Words longer than two characters, for free-text overlap.
fn terms(text: &str) -> BTreeSet<String> {
    words(text).into_iter().filter(|w| w.chars().count() > 2).collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

#[derive(Clone)]
pub struct CapabilityMatcher {
    scorer: Arc<dyn Scorer>,
    min_score: f64,
}

impl CapabilityMatcher {
    pub fn new(scorer: Arc<dyn Scorer>, min_score: f64) -> Self {
        Self { scorer, min_score }
    }

    pub fn from_config(config: &MatcherConfig) -> Self {
        Self::new(Arc::new(KeywordScorer::default()), config.min_score)
    }

    pub fn min_score(&self) -> f64 {
        self.min_score
    }

    /// Every candidate with its score, best first.
    pub fn rank<'a>(&self, description: &str, candidates: &'a [AgentCard]) -> Vec<(f64, &'a AgentCard)> {
        let mut ranked: Vec<(f64, &AgentCard)> = candidates
            .iter()
            .map(|card| (self.scorer.score(description, card), card))
            .collect();
        ranked.sort_by(|(sa, a), (sb, b)| match sb.total_cmp(sa) {
            Ordering::Equal => a.name.cmp(&b.name),
            other => other,
        });
        ranked
    }

    pub fn select(&self, description: &str, candidates: &[AgentCard]) -> Selection {
        self.select_with_hint(None, description, candidates)
    }

    /// Like [`select`](Self::select), but a candidate carrying the `hint`
    /// capability is always eligible and outranks every candidate that does
    /// not. Among those, the usual score order and tie break apply.
    pub fn select_with_hint(&self, hint: Option<&str>, description: &str, candidates: &[AgentCard]) -> Selection {
        let ranked = self.rank(description, candidates);
        let hint = hint.map(str::trim).filter(|h| !h.is_empty());
        if let Some(hint) = hint {
            if let Some((_, card)) = ranked.iter().find(|(_, card)| card.has_capability(hint)) {
                return Selection::Selected((*card).clone());
            }
        }
        match ranked.first() {
            Some((score, card)) if *score >= self.min_score => Selection::Selected((*card).clone()),
            _ => Selection::NoMatch,
        }
    }
}

impl Default for CapabilityMatcher {
    fn default() -> Self {
        Self::from_config(&MatcherConfig::default())
    }
}

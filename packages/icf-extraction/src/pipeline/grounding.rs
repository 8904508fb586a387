//! Grounding - evidence accumulation, confidence and template filling.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::types::document::normalize;
use crate::types::result::{Confidence, Evidence, ExtractionStatus};

/// Text written into placeholders the engine could not fill.
pub const MANUAL_ENTRY_MARKER: &str = "[TO BE FILLED MANUALLY]";

#[derive(Debug, Clone)]
struct Ranked {
    evidence: Evidence,
    relevance: f32,
    discovered: usize,
}

/// Working evidence set owned by one search loop.
///
/// Exact duplicates (same normalized quote on the same page) collapse into
/// the first sighting, keeping the higher relevance.
#[derive(Debug, Default)]
pub struct EvidenceAccumulator {
    items: Vec<Ranked>,
    seen: HashSet<(String, u32)>,
}

impl EvidenceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a candidate. Returns false if it was a duplicate or empty.
    pub fn push(&mut self, quote: String, page: u32, relevance: Option<f32>) -> bool {
        let key = (normalize(&quote), page);
        if key.0.is_empty() {
            return false;
        }

        let relevance = relevance.unwrap_or(0.5).clamp(0.0, 1.0);

        if self.seen.contains(&key) {
            if let Some(existing) = self
                .items
                .iter_mut()
                .find(|r| r.evidence.page == page && normalize(&r.evidence.quote) == key.0)
            {
                existing.relevance = existing.relevance.max(relevance);
            }
            return false;
        }

        self.seen.insert(key);
        let discovered = self.items.len();
        self.items.push(Ranked {
            evidence: Evidence::new(quote, page),
            relevance,
            discovered,
        });
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Evidence ordered most relevant first, discovery order breaking ties.
    pub fn ranked(&self) -> Vec<Evidence> {
        let mut items = self.items.clone();
        items.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.discovered.cmp(&b.discovered))
        });
        items.into_iter().map(|r| r.evidence).collect()
    }
}

/// Derive confidence from status, evidence spread and conflicts.
pub fn derive_confidence(
    status: ExtractionStatus,
    evidence: &[Evidence],
    conflicting: bool,
) -> Option<Confidence> {
    match status {
        ExtractionStatus::StandardText => Some(Confidence::High),
        ExtractionStatus::Found | ExtractionStatus::Partial if conflicting => Some(Confidence::Low),
        ExtractionStatus::Found => {
            let pages: HashSet<u32> = evidence.iter().map(|e| e.page).collect();
            if evidence.len() >= 2 && pages.len() >= 2 {
                Some(Confidence::High)
            } else {
                Some(Confidence::Medium)
            }
        }
        ExtractionStatus::Partial => Some(Confidence::Medium),
        ExtractionStatus::NotFound | ExtractionStatus::Skipped | ExtractionStatus::Error => None,
    }
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{[^{}]*\}\}").expect("placeholder regex is valid"))
}

/// True if `text` still contains `{{ ... }}` placeholders.
pub fn has_placeholders(text: &str) -> bool {
    placeholder_regex().is_match(text)
}

/// Substitute every placeholder in `template` with `answer`.
///
/// An empty template yields the answer itself; an empty answer fills
/// placeholders with [`MANUAL_ENTRY_MARKER`].
pub fn fill_template(template: &str, answer: &str) -> String {
    let answer = answer.trim();
    if template.trim().is_empty() {
        return answer.to_string();
    }

    let fill = if answer.is_empty() {
        MANUAL_ENTRY_MARKER
    } else {
        answer
    };

    placeholder_regex()
        .replace_all(template, regex::NoExpand(fill))
        .into_owned()
}

/// Choose the filled template: the model's version if it resolved every
/// placeholder, otherwise our own substitution.
pub fn resolve_filled_template(template: &str, model_filled: &str, answer: &str) -> String {
    let model_filled = model_filled.trim();
    if !model_filled.is_empty() && !has_placeholders(model_filled) {
        return model_filled.to_string();
    }
    fill_template(template, answer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulator_dedupes_normalized() {
        let mut acc = EvidenceAccumulator::new();
        assert!(acc.push("Drug X every 21 days".into(), 42, Some(0.4)));
        assert!(!acc.push("drug x   every 21 DAYS".into(), 42, Some(0.9)));
        assert!(acc.push("Drug X every 21 days".into(), 43, None));
        assert!(!acc.push("   ".into(), 1, None));

        assert_eq!(acc.len(), 2);
        // Duplicate raised the relevance of the first sighting, text unchanged
        let ranked = acc.ranked();
        assert_eq!(ranked[0], Evidence::new("Drug X every 21 days", 42));
    }

    #[test]
    fn test_ranked_orders_by_relevance_then_discovery() {
        let mut acc = EvidenceAccumulator::new();
        acc.push("low".into(), 1, Some(0.1));
        acc.push("high".into(), 2, Some(0.9));
        acc.push("mid-a".into(), 3, Some(0.5));
        acc.push("mid-b".into(), 4, None);

        let quotes: Vec<_> = acc.ranked().into_iter().map(|e| e.quote).collect();
        assert_eq!(quotes, vec!["high", "mid-a", "mid-b", "low"]);
    }

    #[test]
    fn test_confidence_rules() {
        let one = vec![Evidence::new("a", 1)];
        let two_pages = vec![Evidence::new("a", 1), Evidence::new("b", 2)];
        let same_page = vec![Evidence::new("a", 1), Evidence::new("b", 1)];

        assert_eq!(
            derive_confidence(ExtractionStatus::Found, &two_pages, false),
            Some(Confidence::High)
        );
        assert_eq!(
            derive_confidence(ExtractionStatus::Found, &same_page, false),
            Some(Confidence::Medium)
        );
        assert_eq!(
            derive_confidence(ExtractionStatus::Found, &one, false),
            Some(Confidence::Medium)
        );
        assert_eq!(
            derive_confidence(ExtractionStatus::Partial, &one, false),
            Some(Confidence::Medium)
        );
        assert_eq!(
            derive_confidence(ExtractionStatus::Found, &two_pages, true),
            Some(Confidence::Low)
        );
        assert_eq!(derive_confidence(ExtractionStatus::NotFound, &[], false), None);
        assert_eq!(
            derive_confidence(ExtractionStatus::StandardText, &[], false),
            Some(Confidence::High)
        );
    }

    #[test]
    fn test_fill_template() {
        assert_eq!(
            fill_template("You will get {{ dosing schedule }}.", "drug X every 3 weeks"),
            "You will get drug X every 3 weeks."
        );
        assert_eq!(fill_template("", "plain answer"), "plain answer");
        assert_eq!(
            fill_template("Sponsor: {{sponsor}}", ""),
            "Sponsor: [TO BE FILLED MANUALLY]"
        );
        // `$` in the answer is literal
        assert_eq!(fill_template("Cost: {{x}}", "$0"), "Cost: $0");
    }

    #[test]
    fn test_resolve_filled_template() {
        let template = "You will get {{ schedule }}.";
        assert_eq!(
            resolve_filled_template(template, "You will get drug X.", "ignored"),
            "You will get drug X."
        );
        assert_eq!(
            resolve_filled_template(template, "You will get {{ schedule }}.", "drug X"),
            "You will get drug X."
        );
        assert_eq!(
            resolve_filled_template(template, "", "drug X"),
            "You will get drug X."
        );
    }
}

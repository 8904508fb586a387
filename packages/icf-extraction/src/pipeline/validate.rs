//! Validator - citation checks, reading level and traceability.
//!
//! Pure: reads the result and the document store, returns findings.
//! Problems are reported as issues and never change the result.

use crate::pipeline::readability::{flesch_kincaid_grade, within_target};
use crate::types::document::{normalize, DocumentStore};
use crate::types::result::{Evidence, ExtractionResult, ValidationResult};

const QUOTE_PREVIEW_CHARS: usize = 80;

/// Whether a quote appears on a page, and why not if it doesn't.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteCheck {
    Verified,
    NotOnPage,
    UnknownPage,
    EmptyQuote,
}

impl QuoteCheck {
    pub fn is_verified(&self) -> bool {
        matches!(self, QuoteCheck::Verified)
    }
}

/// Check that the normalized quote is contained in the normalized text of
/// the page it cites.
pub fn verify_quote(evidence: &Evidence, store: &DocumentStore) -> QuoteCheck {
    let quote = normalize(&evidence.quote);
    if quote.is_empty() {
        return QuoteCheck::EmptyQuote;
    }

    match store.segment_for_page(evidence.page) {
        None => QuoteCheck::UnknownPage,
        Some(segment) if segment.normalized().contains(&quote) => QuoteCheck::Verified,
        Some(_) => QuoteCheck::NotOnPage,
    }
}

fn preview(quote: &str) -> String {
    let flat = quote.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= QUOTE_PREVIEW_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(QUOTE_PREVIEW_CHARS).collect();
        format!("{cut}...")
    }
}

/// Validate one extraction result against the protocol.
pub fn validate(result: &ExtractionResult, store: &DocumentStore) -> ValidationResult {
    let mut issues = Vec::new();

    let quotes_verified = result
        .evidence
        .iter()
        .enumerate()
        .map(|(i, evidence)| {
            let check = verify_quote(evidence, store);
            match check {
                QuoteCheck::Verified => {}
                QuoteCheck::NotOnPage => issues.push(format!(
                    "Evidence [{}]: quote not found on page {}: \"{}\"",
                    i + 1,
                    evidence.page,
                    preview(&evidence.quote)
                )),
                QuoteCheck::UnknownPage => issues.push(format!(
                    "Evidence [{}]: page {} does not exist in the protocol",
                    i + 1,
                    evidence.page
                )),
                QuoteCheck::EmptyQuote => {
                    issues.push(format!("Evidence [{}]: empty quote", i + 1))
                }
            }
            check.is_verified()
        })
        .collect();

    let reading_grade_level = flesch_kincaid_grade(&result.answer);
    if let Some(grade) = reading_grade_level {
        if result.status.has_scorable_answer() && !within_target(grade) {
            issues.push(format!(
                "Reading level is grade {grade:.1}, outside the grade 6-8 target"
            ));
        }
    }

    if result.status.requires_citation() && result.evidence.is_empty() {
        issues.push(format!(
            "Ungrounded claim: {} result cites no evidence",
            result.status
        ));
    }

    ValidationResult {
        quotes_verified,
        reading_grade_level,
        issues,
    }
}

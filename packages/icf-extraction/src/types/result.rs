//! Extraction and validation results - one of each per variable.

use serde::{Deserialize, Serialize};

use super::variable::Variable;

/// A verbatim quote and the page it was taken from.
///
/// Evidence is never edited after the engine records it. Whether the quote
/// really appears on that page is the validator's call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub quote: String,
    pub page: u32,
}

impl Evidence {
    pub fn new(quote: impl Into<String>, page: u32) -> Self {
        Self {
            quote: quote.into(),
            page,
        }
    }
}

/// Terminal status of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtractionStatus {
    /// Instructions fully answered by cited evidence.
    Found,

    /// Some of the requested information was found.
    Partial,

    /// Nothing in the protocol answers the instructions.
    NotFound,

    /// Non-applicable slot, no search performed.
    Skipped,

    /// Required template text used verbatim.
    StandardText,

    /// Internal failure, see `error`.
    Error,
}

impl ExtractionStatus {
    /// All statuses in report order.
    pub const ALL: [ExtractionStatus; 6] = [
        ExtractionStatus::Found,
        ExtractionStatus::Partial,
        ExtractionStatus::NotFound,
        ExtractionStatus::Skipped,
        ExtractionStatus::StandardText,
        ExtractionStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStatus::Found => "FOUND",
            ExtractionStatus::Partial => "PARTIAL",
            ExtractionStatus::NotFound => "NOT_FOUND",
            ExtractionStatus::Skipped => "SKIPPED",
            ExtractionStatus::StandardText => "STANDARD_TEXT",
            ExtractionStatus::Error => "ERROR",
        }
    }

    /// Statuses that claim content from the protocol and need citations.
    pub fn requires_citation(&self) -> bool {
        matches!(self, ExtractionStatus::Found | ExtractionStatus::Partial)
    }

    /// Statuses whose answer is meaningful to score for reading level.
    pub fn has_scorable_answer(&self) -> bool {
        !matches!(self, ExtractionStatus::Skipped | ExtractionStatus::NotFound)
    }
}

impl std::fmt::Display for ExtractionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine's self-assessed reliability of an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "HIGH",
            Confidence::Medium => "MEDIUM",
            Confidence::Low => "LOW",
        }
    }
}

/// The structured, grounded result for one variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub section_id: String,

    pub status: ExtractionStatus,

    /// Plain-language answer (target grade 6-8)
    pub answer: String,

    /// Required template with placeholders substituted
    pub filled_template: String,

    /// Most relevant first
    pub evidence: Vec<Evidence>,

    pub confidence: Option<Confidence>,

    pub notes: String,

    /// Diagnostic output from the AI, if any
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub raw_response: String,

    /// Present iff `status == Error`
    pub error: Option<String>,
}

impl ExtractionResult {
    fn empty(variable: &Variable, status: ExtractionStatus) -> Self {
        Self {
            section_id: variable.section_id.clone(),
            status,
            answer: String::new(),
            filled_template: String::new(),
            evidence: Vec::new(),
            confidence: None,
            notes: String::new(),
            raw_response: String::new(),
            error: None,
        }
    }

    /// Required template text used verbatim.
    pub fn standard_text(variable: &Variable) -> Self {
        Self {
            answer: variable.required_template.clone(),
            filled_template: variable.required_template.clone(),
            confidence: Some(Confidence::High),
            notes: "Standard required text - no extraction needed.".to_string(),
            ..Self::empty(variable, ExtractionStatus::StandardText)
        }
    }

    /// Non-applicable slot.
    pub fn skipped(variable: &Variable) -> Self {
        Self {
            notes: "Section marked as not applicable - no search performed.".to_string(),
            ..Self::empty(variable, ExtractionStatus::Skipped)
        }
    }

    /// Nothing in the protocol answers the instructions.
    pub fn not_found(variable: &Variable, notes: impl Into<String>) -> Self {
        Self {
            notes: notes.into(),
            ..Self::empty(variable, ExtractionStatus::NotFound)
        }
    }

    /// Internal failure captured for this variable.
    pub fn error(variable: &Variable, message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::empty(variable, ExtractionStatus::Error)
        }
    }

    /// Attach the raw AI response.
    pub fn with_raw_response(mut self, raw: impl Into<String>) -> Self {
        self.raw_response = raw.into();
        self
    }

    pub fn is_error(&self) -> bool {
        self.status == ExtractionStatus::Error
    }
}

/// Validation outcome for one extraction result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Aligned 1:1 with the result's evidence
    pub quotes_verified: Vec<bool>,

    /// Flesch-Kincaid grade of the answer; absent when too short to score
    pub reading_grade_level: Option<f64>,

    /// Human-readable warnings, never escalated to errors
    pub issues: Vec<String>,
}

impl ValidationResult {
    /// True if every cited quote was found on its page.
    pub fn fully_verified(&self) -> bool {
        !self.quotes_verified.is_empty() && self.quotes_verified.iter().all(|v| *v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::variable::{Availability, Complexity};

    fn variable() -> Variable {
        Variable::new("6", "Contact", Complexity::Easy, Availability::Yes)
            .with_template("Call {{ study_doctor }} with questions.")
            .standard_text()
    }

    #[test]
    fn test_standard_text_result() {
        let result = ExtractionResult::standard_text(&variable());
        assert_eq!(result.status, ExtractionStatus::StandardText);
        assert_eq!(result.filled_template, "Call {{ study_doctor }} with questions.");
        assert_eq!(result.confidence, Some(Confidence::High));
        assert!(result.evidence.is_empty());
        assert!(result.error.is_none());
    }

    #[test]
    fn test_error_result_has_message() {
        let result = ExtractionResult::error(&variable(), "AI service error: boom");
        assert!(result.is_error());
        assert_eq!(result.error.as_deref(), Some("AI service error: boom"));
        assert!(result.confidence.is_none());
    }

    #[test]
    fn test_status_serializes_screaming_snake() {
        let json = serde_json::to_string(&ExtractionStatus::StandardText).unwrap();
        assert_eq!(json, "\"STANDARD_TEXT\"");
        let json = serde_json::to_string(&Confidence::Medium).unwrap();
        assert_eq!(json, "\"MEDIUM\"");
    }

    #[test]
    fn test_status_citation_rules() {
        assert!(ExtractionStatus::Found.requires_citation());
        assert!(ExtractionStatus::Partial.requires_citation());
        assert!(!ExtractionStatus::StandardText.requires_citation());
        assert!(!ExtractionStatus::Skipped.has_scorable_answer());
        assert!(!ExtractionStatus::NotFound.has_scorable_answer());
        assert!(ExtractionStatus::StandardText.has_scorable_answer());
    }
}

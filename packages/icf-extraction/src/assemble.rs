//! Report assembly - `extraction_report.json` and `draft_icf.md`.
//!
//! Assembly only reads the finished report. Nothing here changes a result.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AssembleError;
use crate::pipeline::grounding::MANUAL_ENTRY_MARKER;
use crate::pipeline::prompts::prompt_version_hash;
use crate::types::report::{ExtractionReport, ReportEntry};
use crate::types::result::{ExtractionResult, ExtractionStatus, ValidationResult};
use crate::types::variable::{Availability, Complexity, Variable};

pub const REPORT_FILE: &str = "extraction_report.json";
pub const DRAFT_FILE: &str = "draft_icf.md";

const SUGGESTED_PREVIEW_CHARS: usize = 800;
const QUOTE_PREVIEW_CHARS: usize = 250;

/// Run totals, as written to the report summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub total_sections: usize,
    pub found: usize,
    pub partial: usize,
    pub not_found: usize,
    pub skipped: usize,
    pub standard_text: usize,
    pub errors: usize,
    pub validation_issues: usize,
    pub elapsed_seconds: f64,
    pub cancelled: bool,
}

impl ReportSummary {
    pub fn from_report(report: &ExtractionReport) -> Self {
        let counts = &report.counts;
        Self {
            total_sections: counts.total(),
            found: counts.get(ExtractionStatus::Found),
            partial: counts.get(ExtractionStatus::Partial),
            not_found: counts.get(ExtractionStatus::NotFound),
            skipped: counts.get(ExtractionStatus::Skipped),
            standard_text: counts.get(ExtractionStatus::StandardText),
            errors: counts.get(ExtractionStatus::Error),
            validation_issues: report.issue_count(),
            elapsed_seconds: (report.elapsed.as_secs_f64() * 10.0).round() / 10.0,
            cancelled: report.cancelled,
        }
    }
}

#[derive(Serialize)]
struct DocumentInfo<'a> {
    source: &'a str,
    sha256: &'a str,
}

#[derive(Serialize)]
struct SectionRecord<'a> {
    heading: &'a str,
    sub_section: Option<&'a str>,
    complexity: Complexity,
    availability: Availability,
    #[serde(flatten)]
    result: &'a ExtractionResult,
    validation: &'a ValidationResult,
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    run_id: Uuid,
    generated_at: DateTime<Utc>,
    prompt_version: String,
    document: DocumentInfo<'a>,
    summary: ReportSummary,
    sections: Vec<SectionRecord<'a>>,
}

/// Render the JSON report.
pub fn render_report_json(report: &ExtractionReport) -> Result<String, AssembleError> {
    let document = ReportDocument {
        run_id: report.run_id,
        generated_at: report.generated_at,
        prompt_version: prompt_version_hash(),
        document: DocumentInfo {
            source: &report.document_source,
            sha256: &report.document_hash,
        },
        summary: ReportSummary::from_report(report),
        sections: report
            .entries
            .iter()
            .map(|entry| SectionRecord {
                heading: &entry.variable.heading,
                sub_section: entry.variable.sub_section.as_deref(),
                complexity: entry.variable.complexity,
                availability: entry.variable.availability,
                result: &entry.result,
                validation: &entry.validation,
            })
            .collect(),
    };

    Ok(serde_json::to_string_pretty(&document)?)
}

fn truncate(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}

fn push_entry(out: &mut Vec<String>, variable: &Variable, entry: &ReportEntry) {
    let result = &entry.result;

    let mut badge = format!("**Status:** {}", result.status);
    if let Some(confidence) = result.confidence {
        badge.push_str(&format!(" | **Confidence:** {}", confidence.as_str()));
    }
    if let Some(error) = &result.error {
        badge.push_str(&format!(" | **Error:** {error}"));
    }
    out.push(badge);

    match result.status {
        ExtractionStatus::Found | ExtractionStatus::Partial | ExtractionStatus::StandardText => {
            let text = if result.filled_template.trim().is_empty() {
                &result.answer
            } else {
                &result.filled_template
            };
            if !text.trim().is_empty() {
                out.push(text.trim().to_string());
            }
            if result.status == ExtractionStatus::Partial && !result.notes.trim().is_empty() {
                out.push(format!("> [PARTIAL] {}", result.notes.trim()));
            }
        }
        ExtractionStatus::NotFound | ExtractionStatus::Skipped => {
            out.push(format!("**{MANUAL_ENTRY_MARKER}**"));
            if !variable.suggested_text.trim().is_empty() {
                out.push(format!(
                    "_Suggested text: {}_",
                    truncate(&variable.suggested_text, SUGGESTED_PREVIEW_CHARS)
                ));
            }
        }
        ExtractionStatus::Error => {
            out.push(format!(
                "**[EXTRACTION ERROR]** {}",
                result.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }

    if !result.evidence.is_empty() {
        let mut lines = vec!["_Evidence:_".to_string()];
        for evidence in &result.evidence {
            lines.push(format!(
                "- Page {}: \"{}\"",
                evidence.page,
                truncate(&evidence.quote, QUOTE_PREVIEW_CHARS)
            ));
        }
        out.push(lines.join("\n"));
    }

    for issue in &entry.validation.issues {
        out.push(format!("> [VALIDATION] {issue}"));
    }
}

/// Render the Markdown draft, one section per registry variable in
/// registry order. Variables missing from the report are marked
/// `NOT PROCESSED`.
pub fn render_draft(report: &ExtractionReport, all_variables: &[Variable]) -> String {
    let entries: HashMap<&str, &ReportEntry> = report
        .entries
        .iter()
        .map(|e| (e.variable.section_id.as_str(), e))
        .collect();

    let mut out = vec![
        "# DRAFT - Informed Consent Form".to_string(),
        format!(
            "_This is an auto-generated draft. Sections marked {MANUAL_ENTRY_MARKER} require \
             human review and completion. Evidence citations are included below each section \
             for reference._"
        ),
    ];
    if report.cancelled {
        out.push(
            "_The run was cancelled before completion; some sections were not extracted._"
                .to_string(),
        );
    }

    for variable in all_variables {
        let level = if variable.sub_section.is_some() { "###" } else { "##" };
        let heading = match &variable.sub_section {
            Some(sub) => format!("{} - {}", variable.heading, sub),
            None => variable.heading.clone(),
        };
        out.push(format!("{level} {heading}"));

        match entries.get(variable.section_id.as_str()) {
            Some(entry) => push_entry(&mut out, variable, entry),
            None => out.push("**Status:** NOT PROCESSED".to_string()),
        }
    }

    let mut draft = out.join("\n\n");
    draft.push('\n');
    draft
}

fn write_file(dir: &Path, name: &str, contents: &str) -> Result<PathBuf, AssembleError> {
    std::fs::create_dir_all(dir).map_err(|source| AssembleError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let path = dir.join(name);
    std::fs::write(&path, contents).map_err(|source| AssembleError::Io {
        path: path.clone(),
        source,
    })?;

    Ok(path)
}

/// Write `extraction_report.json` into `dir`.
pub fn write_report_json(report: &ExtractionReport, dir: &Path) -> Result<PathBuf, AssembleError> {
    let path = write_file(dir, REPORT_FILE, &render_report_json(report)?)?;
    info!(path = %path.display(), "Wrote extraction report");
    Ok(path)
}

/// Write `draft_icf.md` into `dir`.
pub fn write_draft(
    report: &ExtractionReport,
    all_variables: &[Variable],
    dir: &Path,
) -> Result<PathBuf, AssembleError> {
    let path = write_file(dir, DRAFT_FILE, &render_draft(report, all_variables))?;
    info!(path = %path.display(), "Wrote draft ICF");
    Ok(path)
}

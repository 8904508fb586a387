//! LLM prompts for the extraction engine.
//!
//! Search prompts ask a yes/no-with-quotes question about one batch of
//! protocol pages. Synthesis prompts turn accumulated quotes into plain
//! language for the consent form.

use sha2::{Digest, Sha256};

use crate::types::result::Evidence;
use crate::types::variable::{Availability, Variable};

/// System prompt for the per-batch search query.
pub const SEARCH_SYSTEM_PROMPT: &str = r#"You are a Clinical Data Extraction Specialist reviewing excerpts of a clinical study protocol.

Rules:
1. Only report text that actually appears in the excerpt. Quotes must be verbatim, copied character for character.
2. Report the page number from the nearest preceding "--- PAGE N ---" marker.
3. Section names vary between protocols; judge by meaning, not by headings.
4. Never fabricate information. An empty candidate list is a valid answer."#;

/// User prompt for the per-batch search query.
pub const SEARCH_PROMPT: &str = r#"ICF section [{section_id}]: {target}

WHAT TO FIND: {instructions}
{hints_section}
{availability_note}

Does the excerpt below contain information answering WHAT TO FIND?

Set "sufficient" to true only if the evidence found so far, together with these candidates, fully answers WHAT TO FIND.
Evidence found so far: {evidence_count} quote(s).

Output JSON:
{
    "candidates": [
        {"quote": "Exact verbatim quote from the excerpt", "page": 12, "relevance": 0.0 to 1.0}
    ],
    "sufficient": true | false,
    "notes": "Anything unusual, e.g. conflicting statements"
}

EXCERPT:
{excerpt}"#;

/// System prompt for answer synthesis.
pub const SYNTHESIS_SYSTEM_PROMPT: &str = r#"You write informed consent form text for research participants.

Rules:
1. Use ONLY the numbered evidence provided. Do not add facts.
2. Write the answer in plain language at a Grade 6 to 8 reading level: short sentences, common words, explain medical terms.
3. Address the reader as "you".
4. If only part of the requested information is supported, use status "PARTIAL" and say what is missing in notes.
5. If the evidence does not answer the request at all, use status "NOT_FOUND".
6. For template placeholders you cannot fill from the evidence, write [TO BE FILLED MANUALLY]."#;

/// User prompt for answer synthesis.
pub const SYNTHESIS_PROMPT: &str = r#"ICF section [{section_id}]: {target}

WHAT TO EXTRACT: {instructions}

ICF TEMPLATE TEXT (fill the {{ ... }} placeholders):
{template}

SUGGESTED TEXT:
{suggested}

SEARCH NOTES:
{search_notes}

EVIDENCE:
{evidence}

Output JSON:
{
    "status": "FOUND" | "PARTIAL" | "NOT_FOUND",
    "answer": "Plain-language answer (Grade 6-8)",
    "filled_template": "The template text with placeholders filled in",
    "notes": "Caveats, missing items, items needing manual review",
    "conflicting": true | false
}"#;

/// Hash of all prompt templates, recorded so reports can be compared
/// across prompt revisions.
pub fn prompt_version_hash() -> String {
    let mut hasher = Sha256::new();
    for prompt in [
        SEARCH_SYSTEM_PROMPT,
        SEARCH_PROMPT,
        SYNTHESIS_SYSTEM_PROMPT,
        SYNTHESIS_PROMPT,
    ] {
        hasher.update(prompt.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn target(variable: &Variable) -> String {
    match &variable.sub_section {
        Some(sub) => format!("{} > {}", variable.heading, sub),
        None => variable.heading.clone(),
    }
}

fn availability_note(variable: &Variable) -> &'static str {
    match variable.availability {
        Availability::No => {
            "IMPORTANT: This information is usually NOT in clinical protocols. \
             Only report candidates if the excerpt states it explicitly."
        }
        Availability::Partially => {
            "NOTE: Only some of this information is usually in the protocol. \
             Report whatever parts you find."
        }
        Availability::Yes => "This information should be findable in the protocol.",
    }
}

/// Format the search prompt for one batch.
pub fn format_search_prompt(variable: &Variable, evidence_count: usize, excerpt: &str) -> String {
    let hints_section = if variable.has_location_hints() {
        format!(
            "\nWHERE IT USUALLY IS (section names vary between protocols):\n  Protocol sections: {}\n  Sponsor sections: {}\n",
            variable.protocol_section, variable.sponsor_section
        )
    } else {
        String::new()
    };

    SEARCH_PROMPT
        .replace("{section_id}", &variable.section_id)
        .replace("{target}", &target(variable))
        .replace("{instructions}", &variable.instructions)
        .replace("{hints_section}", &hints_section)
        .replace("{availability_note}", availability_note(variable))
        .replace("{evidence_count}", &evidence_count.to_string())
        .replace("{excerpt}", excerpt)
}

/// Format the synthesis prompt with numbered evidence and the caveats the
/// model reported while searching.
pub fn format_synthesis_prompt(
    variable: &Variable,
    evidence: &[Evidence],
    search_notes: &[String],
) -> String {
    let evidence_text = evidence
        .iter()
        .enumerate()
        .map(|(i, e)| format!("[{}] (page {}) \"{}\"", i + 1, e.page, e.quote))
        .collect::<Vec<_>>()
        .join("\n");

    let or_none = |text: &str| {
        if text.trim().is_empty() {
            "(none)".to_string()
        } else {
            text.to_string()
        }
    };

    SYNTHESIS_PROMPT
        .replace("{section_id}", &variable.section_id)
        .replace("{target}", &target(variable))
        .replace("{instructions}", &variable.instructions)
        .replace("{template}", &or_none(&variable.required_template))
        .replace("{suggested}", &or_none(&variable.suggested_text))
        .replace("{search_notes}", &or_none(&search_notes.join("\n")))
        .replace("{evidence}", &evidence_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::variable::Complexity;

    fn variable() -> Variable {
        Variable::new("8", "Study Procedures", Complexity::Moderate, Availability::Partially)
            .with_instructions("How often will participants receive the study drug?")
            .with_location_hints("Section 6 Treatment", "")
    }

    #[test]
    fn test_prompt_hash_is_consistent() {
        let hash1 = prompt_version_hash();
        let hash2 = prompt_version_hash();
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64); // SHA-256 hex
    }

    #[test]
    fn test_format_search_prompt() {
        let formatted = format_search_prompt(&variable(), 2, "--- PAGE 42 ---\nText");
        assert!(formatted.contains("[8]: Study Procedures"));
        assert!(formatted.contains("How often will participants"));
        assert!(formatted.contains("Section 6 Treatment"));
        assert!(formatted.contains("Only some of this information"));
        assert!(formatted.contains("Evidence found so far: 2 quote(s)"));
        assert!(formatted.ends_with("--- PAGE 42 ---\nText"));
    }

    #[test]
    fn test_format_search_prompt_without_hints() {
        let var = Variable::new("3", "Purpose", Complexity::Easy, Availability::Yes);
        let formatted = format_search_prompt(&var, 0, "excerpt");
        assert!(!formatted.contains("WHERE IT USUALLY IS"));
    }

    #[test]
    fn test_excerpt_is_not_reinterpolated() {
        let formatted = format_search_prompt(&variable(), 0, "literal {section_id} text");
        assert!(formatted.contains("literal {section_id} text"));
    }

    #[test]
    fn test_format_synthesis_prompt() {
        let evidence = vec![Evidence::new("Patients will receive drug X every 21 days", 42)];
        let formatted = format_synthesis_prompt(&variable(), &evidence, &[]);
        assert!(formatted.contains("[1] (page 42) \"Patients will receive drug X every 21 days\""));
        assert!(formatted.contains("ICF TEMPLATE TEXT"));
        assert!(formatted.contains("SEARCH NOTES:\n(none)"));
    }

    #[test]
    fn test_synthesis_prompt_carries_search_notes() {
        let evidence = vec![Evidence::new("Drug X every 21 days", 42)];
        let notes = vec![
            "Page 42 and page 57 give different cycle lengths.".to_string(),
            "Visit schedule is in an appendix not included.".to_string(),
        ];
        let formatted = format_synthesis_prompt(&variable(), &evidence, &notes);
        assert!(formatted.contains(
            "SEARCH NOTES:\nPage 42 and page 57 give different cycle lengths.\nVisit schedule"
        ));
    }
}

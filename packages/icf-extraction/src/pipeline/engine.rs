//! Extraction engine - routes a variable and produces its result.
//!
//! `extract` never fails: every internal error becomes an `ERROR` result
//! for that variable so the rest of the run carries on.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::{ExtractionError, Result};
use crate::pipeline::extract::{parse_synthesis_response, AIVerdict};
use crate::pipeline::grounding::{derive_confidence, resolve_filled_template};
use crate::pipeline::prompts::{format_synthesis_prompt, SYNTHESIS_SYSTEM_PROMPT};
use crate::pipeline::search::{SearchLoop, SearchOutcome};
use crate::traits::ai::{SynthesisPrompt, AI};
use crate::types::config::EngineConfig;
use crate::types::document::DocumentStore;
use crate::types::result::{ExtractionResult, ExtractionStatus};
use crate::types::variable::{Availability, Complexity, Variable};

/// How a variable will be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Non-applicable slot
    Skip,
    /// Template text used verbatim
    StandardText,
    /// Run the search loop with this many iterations at most
    Search { budget: usize },
}

/// Per-variable extraction engine.
///
/// Holds the AI client and the iteration budget table; keeps no state
/// between calls, so one engine serves every worker of a run.
pub struct ExtractionEngine<A: AI> {
    ai: A,
    config: EngineConfig,
}

impl<A: AI> ExtractionEngine<A> {
    pub fn new(ai: A, config: EngineConfig) -> Self {
        Self { ai, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ai(&self) -> &A {
        &self.ai
    }

    /// Decide how to handle a variable. Deterministic.
    pub fn route(&self, variable: &Variable) -> Route {
        let budgets = &self.config.budgets;
        match variable.availability {
            Availability::No if variable.always_skip => Route::Skip,
            Availability::Yes if variable.standard_text => Route::StandardText,
            Availability::No => Route::Search {
                budget: budgets.for_complexity(Complexity::NotInProtocol),
            },
            Availability::Yes | Availability::Partially => Route::Search {
                budget: budgets.for_complexity(variable.complexity),
            },
        }
    }

    /// Extract one variable. Always returns a result.
    pub async fn extract(&self, variable: &Variable, store: &DocumentStore) -> ExtractionResult {
        let started = Instant::now();
        let route = self.route(variable);
        debug!(section_id = %variable.section_id, route = ?route, "Routing variable");

        let result = match route {
            Route::Skip => ExtractionResult::skipped(variable),
            Route::StandardText => ExtractionResult::standard_text(variable),
            Route::Search { budget } => match self.search(variable, store, budget).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(section_id = %variable.section_id, error = %e, "Extraction failed");
                    let raw = e.raw_response().unwrap_or_default().to_string();
                    ExtractionResult::error(variable, e.to_string()).with_raw_response(raw)
                }
            },
        };

        info!(
            section_id = %variable.section_id,
            status = %result.status,
            evidence = result.evidence.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Variable extracted"
        );

        result
    }

    async fn search(
        &self,
        variable: &Variable,
        store: &DocumentStore,
        budget: usize,
    ) -> Result<ExtractionResult> {
        let outcome = SearchLoop::new(&self.ai, &self.config, variable, store, budget)
            .run()
            .await?;

        // Absence is only claimed for text somebody read
        if outcome.evidence.is_empty()
            && outcome.timeouts > 0
            && outcome.unexamined == store.page_count()
        {
            return Err(ExtractionError::Timeout {
                stage: "search",
                seconds: self.config.query_timeout.as_secs(),
            });
        }

        if outcome.evidence.is_empty() {
            return Ok(ExtractionResult::not_found(
                variable,
                not_found_note(variable, &outcome),
            ));
        }

        self.synthesize(variable, outcome).await
    }

    async fn synthesize(
        &self,
        variable: &Variable,
        outcome: SearchOutcome,
    ) -> Result<ExtractionResult> {
        let prompt = SynthesisPrompt {
            section_id: variable.section_id.clone(),
            evidence_count: outcome.evidence.len(),
            system: SYNTHESIS_SYSTEM_PROMPT.to_string(),
            user: format_synthesis_prompt(variable, &outcome.evidence, &outcome.model_notes),
        };

        let raw = tokio::time::timeout(self.config.query_timeout, self.ai.synthesize(&prompt))
            .await
            .map_err(|_| ExtractionError::Timeout {
                stage: "synthesis",
                seconds: self.config.query_timeout.as_secs(),
            })??;

        let response = parse_synthesis_response(&raw)?;

        let status = match response.status {
            AIVerdict::Found => ExtractionStatus::Found,
            AIVerdict::Partial => ExtractionStatus::Partial,
            AIVerdict::NotFound => {
                let mut notes = vec![format!(
                    "{} candidate quote(s) were judged not to answer the instructions. \
                     Enter this section manually.",
                    outcome.evidence.len()
                )];
                push_note(&mut notes, &response.notes);
                return Ok(ExtractionResult::not_found(variable, notes.join(" "))
                    .with_raw_response(raw));
            }
        };

        let answer = response.answer.trim().to_string();
        if answer.is_empty() {
            return Err(ExtractionError::MalformedResponse {
                stage: "synthesis",
                reason: format!("{status} verdict with an empty answer"),
                raw,
            });
        }

        let filled_template =
            resolve_filled_template(&variable.required_template, &response.filled_template, &answer);
        let confidence = derive_confidence(status, &outcome.evidence, response.conflicting);

        let mut notes = Vec::new();
        push_note(&mut notes, &response.notes);
        if response.conflicting {
            notes.push("Sources conflict; check the cited pages before use.".to_string());
        }
        notes.extend(search_caveats(&outcome));

        Ok(ExtractionResult {
            section_id: variable.section_id.clone(),
            status,
            answer,
            filled_template,
            evidence: outcome.evidence,
            confidence,
            notes: notes.join(" "),
            raw_response: raw,
            error: None,
        })
    }
}

fn push_note(notes: &mut Vec<String>, note: &str) {
    let note = note.trim();
    if !note.is_empty() {
        notes.push(note.to_string());
    }
}

fn not_found_note(variable: &Variable, outcome: &SearchOutcome) -> String {
    let mut note = format!(
        "No supporting text found after {} iteration(s) ({}).",
        outcome.iterations,
        outcome.termination.describe()
    );
    if variable.availability == Availability::No {
        note.push_str(" This information is usually not in the protocol.");
    }
    for caveat in search_caveats(outcome) {
        note.push(' ');
        note.push_str(&caveat);
    }
    note.push_str(" Manual entry recommended.");
    note
}

/// Caveats from the search loop that belong in the result notes.
fn search_caveats(outcome: &SearchOutcome) -> Vec<String> {
    let mut caveats = Vec::new();
    if !outcome.model_notes.is_empty() {
        caveats.push(format!("Search notes: {}", outcome.model_notes.join("; ")));
    }
    if outcome.discarded > 0 {
        caveats.push(format!(
            "{} candidate quote(s) were discarded for citing a page outside the searched excerpt.",
            outcome.discarded
        ));
    }
    if outcome.timeouts > 0 {
        caveats.push(format!(
            "{} search quer{} timed out; {} page(s) were never examined.",
            outcome.timeouts,
            if outcome.timeouts == 1 { "y" } else { "ies" },
            outcome.unexamined
        ));
    }
    caveats
}

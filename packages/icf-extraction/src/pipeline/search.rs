//! Search loop - bounded iteration over unexamined protocol pages.
//!
//! Each iteration partitions the pages not yet examined into batches, asks
//! the AI about the first `batches_per_iteration` of them and folds the
//! returned quotes into the evidence set. The loop stops on the first of:
//! the finalize policy is satisfied, the budget is spent, or every page
//! has been examined.

use futures::future::join_all;
use tracing::{debug, warn};

use crate::error::Result;
use crate::pipeline::extract::parse_search_response;
use crate::pipeline::grounding::EvidenceAccumulator;
use crate::pipeline::partition::{partition_unexamined, Batch};
use crate::pipeline::prompts::{format_search_prompt, SEARCH_SYSTEM_PROMPT};
use crate::traits::ai::{SearchPrompt, AI};
use crate::types::config::EngineConfig;
use crate::types::document::DocumentStore;
use crate::types::result::Evidence;
use crate::types::variable::Variable;

/// Why the search loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The finalize policy accepted the model's sufficiency signal
    Sufficient,
    BudgetExhausted,
    /// Every page was examined
    SegmentsExhausted,
}

/// What the search loop hands to synthesis.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Most relevant first
    pub evidence: Vec<Evidence>,
    pub iterations: usize,
    pub termination: Termination,

    /// Timed-out queries (each consumed an iteration)
    pub timeouts: usize,

    /// Pages no query ever answered for
    pub unexamined: usize,

    /// Candidates dropped for citing a page outside their batch
    pub discarded: usize,

    /// Free-text notes the model attached to its search answers
    pub model_notes: Vec<String>,
}

/// Working state for one variable's search. Owned by a single extraction,
/// never shared.
pub struct SearchLoop<'a, A: AI + ?Sized> {
    ai: &'a A,
    config: &'a EngineConfig,
    variable: &'a Variable,
    store: &'a DocumentStore,
    budget: usize,
    iteration: usize,
    examined: Vec<bool>,
    evidence: EvidenceAccumulator,
    timeouts: usize,
    discarded: usize,
    model_notes: Vec<String>,
}

impl<'a, A: AI + ?Sized> SearchLoop<'a, A> {
    pub fn new(
        ai: &'a A,
        config: &'a EngineConfig,
        variable: &'a Variable,
        store: &'a DocumentStore,
        budget: usize,
    ) -> Self {
        Self {
            ai,
            config,
            variable,
            store,
            budget,
            iteration: 0,
            examined: vec![false; store.page_count()],
            evidence: EvidenceAccumulator::new(),
            timeouts: 0,
            discarded: 0,
            model_notes: Vec::new(),
        }
    }

    /// Run to termination.
    ///
    /// Timeouts are absorbed; any other query failure or a malformed
    /// response ends the search with an error.
    pub async fn run(mut self) -> Result<SearchOutcome> {
        let termination = loop {
            if self.iteration >= self.budget {
                break Termination::BudgetExhausted;
            }

            let batches = partition_unexamined(
                self.store,
                &self.examined,
                self.config.max_batch_chars,
            );
            if batches.is_empty() {
                break Termination::SegmentsExhausted;
            }

            self.iteration += 1;
            let selected: Vec<Batch> = batches
                .into_iter()
                .take(self.config.batches_per_iteration.max(1))
                .collect();

            let sufficient = self.query_batches(&selected).await?;

            if self
                .config
                .finalize
                .is_satisfied(sufficient, self.evidence.len())
            {
                break Termination::Sufficient;
            }
        };

        debug!(
            section_id = %self.variable.section_id,
            iterations = self.iteration,
            evidence = self.evidence.len(),
            termination = ?termination,
            "Search finished"
        );

        Ok(SearchOutcome {
            evidence: self.evidence.ranked(),
            iterations: self.iteration,
            termination,
            timeouts: self.timeouts,
            unexamined: self.examined.iter().filter(|e| !**e).count(),
            discarded: self.discarded,
            model_notes: self.model_notes,
        })
    }

    /// Query the batches concurrently and fold in the answers in batch
    /// order. Returns the model's sufficiency signal for this iteration.
    async fn query_batches(&mut self, batches: &[Batch]) -> Result<bool> {
        let prompts: Vec<SearchPrompt> = batches.iter().map(|b| self.prompt_for(b)).collect();

        let timeout = self.config.query_timeout;
        let responses = join_all(
            prompts
                .iter()
                .map(|p| tokio::time::timeout(timeout, self.ai.search(p))),
        )
        .await;

        let mut sufficient = false;
        for (batch, response) in batches.iter().zip(responses) {
            match response {
                Ok(Ok(raw)) => {
                    sufficient |= self.absorb(batch, &raw)?;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    self.timeouts += 1;
                    warn!(
                        section_id = %self.variable.section_id,
                        iteration = self.iteration,
                        timeout_secs = timeout.as_secs(),
                        "Search query timed out, batch left for a later iteration"
                    );
                }
            }
        }

        Ok(sufficient)
    }

    fn prompt_for(&self, batch: &Batch) -> SearchPrompt {
        let excerpt = self.store.render_pages(&batch.segments);
        let pages = batch
            .segments
            .iter()
            .filter_map(|&i| self.store.segments().get(i).map(|s| s.page))
            .collect();

        SearchPrompt {
            section_id: self.variable.section_id.clone(),
            iteration: self.iteration,
            pages,
            system: SEARCH_SYSTEM_PROMPT.to_string(),
            user: format_search_prompt(self.variable, self.evidence.len(), &excerpt),
        }
    }

    /// Parse one answer, mark its batch examined and keep its candidates.
    fn absorb(&mut self, batch: &Batch, raw: &str) -> Result<bool> {
        let response = parse_search_response(raw)?;

        for &idx in &batch.segments {
            if let Some(flag) = self.examined.get_mut(idx) {
                *flag = true;
            }
        }

        let batch_pages: Vec<u32> = batch
            .segments
            .iter()
            .filter_map(|&i| self.store.segments().get(i).map(|s| s.page))
            .collect();

        for candidate in response.candidates {
            // A page-less quote from a single-page batch can only come from that page
            let page = match (candidate.page, batch_pages.as_slice()) {
                (Some(page), _) => page,
                (None, [only]) => *only,
                (None, _) => {
                    self.discarded += 1;
                    continue;
                }
            };

            if !batch_pages.contains(&page) {
                debug!(
                    section_id = %self.variable.section_id,
                    page,
                    "Discarding candidate citing a page outside its batch"
                );
                self.discarded += 1;
                continue;
            }

            self.evidence.push(candidate.quote, page, candidate.relevance);
        }

        if let Some(notes) = response.notes.map(|n| n.trim().to_string()) {
            if !notes.is_empty() && !self.model_notes.contains(&notes) {
                self.model_notes.push(notes);
            }
        }

        Ok(response.sufficient)
    }
}

impl Termination {
    pub fn describe(&self) -> &'static str {
        match self {
            Termination::Sufficient => "search finalized on sufficient evidence",
            Termination::BudgetExhausted => "iteration budget exhausted",
            Termination::SegmentsExhausted => "all pages examined",
        }
    }
}

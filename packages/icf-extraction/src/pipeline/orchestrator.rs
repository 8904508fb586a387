//! Orchestrator - runs the engine and validator over the registry.
//!
//! Variables are independent: each reads the shared, read-only document
//! store and owns its working state. The only shared mutation is the
//! aggregator, behind a mutex. Results land in slots indexed by request
//! order, so a sequential run and a parallel run produce the same report.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::pipeline::engine::{ExtractionEngine, Route};
use crate::pipeline::validate::validate;
use crate::traits::ai::AI;
use crate::types::config::OrchestratorConfig;
use crate::types::document::DocumentStore;
use crate::types::report::{ExtractionReport, ReportEntry, StatusCounts};
use crate::types::result::{ExtractionResult, ExtractionStatus};
use crate::types::variable::Variable;

/// Message recorded for variables interrupted by cancellation.
pub const CANCELLED_IN_FLIGHT: &str = "run cancelled";

/// Message recorded for variables never started because of cancellation.
pub const CANCELLED_BEFORE_START: &str = "run cancelled before extraction started";

/// Lifecycle of one variable within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableState {
    Pending,
    Searching,
    Terminal(ExtractionStatus),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid state transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: VariableState,
    pub to: VariableState,
}

impl VariableState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, VariableState::Terminal(_))
    }

    /// Move to `next`, rejecting anything the lifecycle does not allow.
    ///
    /// Terminal states are final. `ERROR` is reachable from any other state.
    pub fn advance(&mut self, next: VariableState) -> Result<(), InvalidTransition> {
        use ExtractionStatus as S;
        use VariableState as V;

        let allowed = match (*self, next) {
            (V::Terminal(_), _) => false,
            (_, V::Terminal(S::Error)) => true,
            (V::Pending, V::Searching) => true,
            (V::Pending, V::Terminal(S::StandardText | S::Skipped)) => true,
            (V::Searching, V::Terminal(S::Found | S::Partial | S::NotFound)) => true,
            _ => false,
        };

        if allowed {
            *self = next;
            Ok(())
        } else {
            Err(InvalidTransition {
                from: *self,
                to: next,
            })
        }
    }
}

/// Shared aggregation state, one slot per requested variable.
struct Aggregator {
    states: Vec<VariableState>,
    entries: Vec<Option<ReportEntry>>,
    counts: StatusCounts,
    completed: usize,
}

impl Aggregator {
    fn new(len: usize) -> Self {
        Self {
            states: vec![VariableState::Pending; len],
            entries: (0..len).map(|_| None).collect(),
            counts: StatusCounts::default(),
            completed: 0,
        }
    }

    fn begin_search(&mut self, slot: usize) {
        if let Err(e) = self.states[slot].advance(VariableState::Searching) {
            warn!(slot, error = %e, "Ignoring state change");
        }
    }

    /// Record a finished variable. A slot is written once; later writes are dropped.
    fn record(&mut self, slot: usize, entry: ReportEntry) {
        let status = entry.result.status;
        if let Err(e) = self.states[slot].advance(VariableState::Terminal(status)) {
            warn!(
                section_id = %entry.variable.section_id,
                error = %e,
                "Dropping second result for variable"
            );
            return;
        }

        self.counts.record(status);
        self.completed += 1;
        info!(
            section_id = %entry.variable.section_id,
            status = %status,
            issues = entry.validation.issues.len(),
            "[{}/{}] variable complete",
            self.completed,
            self.entries.len()
        );
        self.entries[slot] = Some(entry);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Select variables in registry order, warning about unknown filter ids.
pub fn select_variables<'a>(variables: &'a [Variable], filter: &[String]) -> Vec<&'a Variable> {
    if filter.is_empty() {
        return variables.iter().collect();
    }

    for id in filter {
        if !variables.iter().any(|v| &v.section_id == id) {
            warn!(section_id = %id, "Requested section is not in the registry");
        }
    }

    variables
        .iter()
        .filter(|v| filter.contains(&v.section_id))
        .collect()
}

/// Drives a whole extraction run.
pub struct Orchestrator<A: AI> {
    engine: ExtractionEngine<A>,
    config: OrchestratorConfig,
}

impl<A: AI> Orchestrator<A> {
    pub fn new(engine: ExtractionEngine<A>, config: OrchestratorConfig) -> Self {
        Self { engine, config }
    }

    pub fn engine(&self) -> &ExtractionEngine<A> {
        &self.engine
    }

    /// Extract and validate every selected variable.
    ///
    /// Always returns a report holding each selected variable exactly
    /// once, in registry order, even when the run is cancelled.
    pub async fn run(
        &self,
        variables: &[Variable],
        store: &DocumentStore,
        cancel: &CancellationToken,
    ) -> ExtractionReport {
        let started = Instant::now();
        let selected = select_variables(variables, &self.config.section_filter);
        let workers = self.config.effective_workers();

        info!(
            variables = selected.len(),
            workers,
            pages = store.page_count(),
            "Starting extraction run"
        );

        let aggregator = Mutex::new(Aggregator::new(selected.len()));

        stream::iter(selected.iter().copied().enumerate())
            .map(|(slot, variable)| self.process(slot, variable, store, cancel, &aggregator))
            .buffer_unordered(workers)
            .collect::<Vec<()>>()
            .await;

        let aggregator = aggregator.into_inner();
        let mut counts = aggregator.counts;
        let entries: Vec<ReportEntry> = selected
            .iter()
            .zip(aggregator.entries)
            .map(|(variable, entry)| {
                entry.unwrap_or_else(|| {
                    warn!(section_id = %variable.section_id, "Variable produced no result");
                    let result = ExtractionResult::error(variable, "variable was not processed");
                    counts.record(result.status);
                    ReportEntry {
                        variable: (*variable).clone(),
                        validation: validate(&result, store),
                        result,
                    }
                })
            })
            .collect();

        let elapsed = started.elapsed();
        let cancelled = cancel.is_cancelled();
        info!(
            elapsed_secs = elapsed.as_secs_f64(),
            cancelled,
            errors = counts.get(ExtractionStatus::Error),
            "Extraction run finished"
        );

        ExtractionReport {
            run_id: Uuid::now_v7(),
            generated_at: Utc::now(),
            document_source: store.source().to_string(),
            document_hash: store.content_hash().to_string(),
            counts,
            elapsed,
            cancelled,
            entries,
        }
    }

    async fn process(
        &self,
        slot: usize,
        variable: &Variable,
        store: &DocumentStore,
        cancel: &CancellationToken,
        aggregator: &Mutex<Aggregator>,
    ) {
        let result = if cancel.is_cancelled() {
            ExtractionResult::error(variable, CANCELLED_BEFORE_START)
        } else {
            if matches!(self.engine.route(variable), Route::Search { .. }) {
                aggregator.lock().await.begin_search(slot);
            }

            let work = AssertUnwindSafe(self.engine.extract(variable, store)).catch_unwind();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => ExtractionResult::error(variable, CANCELLED_IN_FLIGHT),
                outcome = work => match outcome {
                    Ok(result) => result,
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        warn!(section_id = %variable.section_id, panic = %message, "Extraction panicked");
                        ExtractionResult::error(variable, format!("internal error: {message}"))
                    }
                },
            }
        };

        let validation = validate(&result, store);
        aggregator.lock().await.record(
            slot,
            ReportEntry {
                variable: variable.clone(),
                result,
                validation,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockAI;
    use crate::types::config::EngineConfig;
    use crate::types::variable::{Availability, Complexity};
    use std::time::Duration;

    fn store() -> DocumentStore {
        DocumentStore::from_pages(
            "protocol.txt",
            (1..=4u32).map(|p| (p, format!("Page {p} of the protocol."))),
        )
        .unwrap()
    }

    fn variables() -> Vec<Variable> {
        vec![
            Variable::new("1", "Title", Complexity::Easy, Availability::Yes),
            Variable::new("2", "Contact", Complexity::Easy, Availability::Yes)
                .with_template("Call us.")
                .standard_text(),
            Variable::new("3", "Sponsor slot", Complexity::Easy, Availability::No).always_skip(),
            Variable::new("4", "Costs", Complexity::Complex, Availability::No),
        ]
    }

    fn orchestrator(ai: MockAI, workers: usize) -> Orchestrator<MockAI> {
        Orchestrator::new(
            ExtractionEngine::new(ai, EngineConfig::new().with_max_batch_chars(1)),
            OrchestratorConfig::new().with_workers(workers),
        )
    }

    #[test]
    fn test_state_machine() {
        let mut state = VariableState::Pending;
        state.advance(VariableState::Searching).unwrap();
        state
            .advance(VariableState::Terminal(ExtractionStatus::Partial))
            .unwrap();
        assert!(state.is_terminal());

        // Terminal states are final, even for errors
        assert!(state
            .advance(VariableState::Terminal(ExtractionStatus::Error))
            .is_err());

        let mut state = VariableState::Pending;
        assert!(state
            .advance(VariableState::Terminal(ExtractionStatus::Found))
            .is_err());
        state
            .advance(VariableState::Terminal(ExtractionStatus::Skipped))
            .unwrap();

        let mut state = VariableState::Searching;
        assert!(state
            .advance(VariableState::Terminal(ExtractionStatus::StandardText))
            .is_err());
        state
            .advance(VariableState::Terminal(ExtractionStatus::Error))
            .unwrap();
    }

    #[test]
    fn test_select_variables_keeps_registry_order() {
        let vars = variables();
        let filter = vec!["4".to_string(), "1".to_string(), "99".to_string()];
        let ids: Vec<_> = select_variables(&vars, &filter)
            .iter()
            .map(|v| v.section_id.as_str())
            .collect();
        assert_eq!(ids, vec!["1", "4"]);
    }

    #[tokio::test]
    async fn test_run_covers_every_variable_in_order() {
        let ai = MockAI::new().with_search_hit("1", 1, "Page 1 of the protocol.", true);
        let report = orchestrator(ai, 3)
            .run(&variables(), &store(), &CancellationToken::new())
            .await;

        assert_eq!(report.section_ids(), vec!["1", "2", "3", "4"]);
        assert_eq!(report.counts.total(), 4);
        assert_eq!(report.counts.get(ExtractionStatus::Found), 1);
        assert_eq!(report.counts.get(ExtractionStatus::StandardText), 1);
        assert_eq!(report.counts.get(ExtractionStatus::Skipped), 1);
        assert_eq!(report.counts.get(ExtractionStatus::NotFound), 1);
        assert!(!report.cancelled);
        assert_eq!(report.document_hash, store().content_hash());
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let ai = MockAI::new()
            .with_search_failure("1", "provider unavailable")
            .with_panic("4");
        let report = orchestrator(ai, 2)
            .run(&variables(), &store(), &CancellationToken::new())
            .await;

        assert_eq!(report.entries.len(), 4);
        let first = &report.entry("1").unwrap().result;
        assert_eq!(first.status, ExtractionStatus::Error);
        assert!(first.error.as_deref().unwrap().contains("provider unavailable"));

        let panicked = &report.entry("4").unwrap().result;
        assert_eq!(panicked.status, ExtractionStatus::Error);
        assert!(panicked.error.as_deref().unwrap().contains("mock AI panic"));

        assert_eq!(
            report.entry("2").unwrap().result.status,
            ExtractionStatus::StandardText
        );
    }

    #[tokio::test]
    async fn test_sequential_and_parallel_agree() {
        let make_ai = || {
            MockAI::new()
                .with_search_hit("1", 2, "Page 2 of the protocol.", true)
                .with_search_hit("4", 3, "Page 3 of the protocol.", false)
        };

        let sequential = orchestrator(make_ai(), 1)
            .run(&variables(), &store(), &CancellationToken::new())
            .await;
        let parallel = orchestrator(make_ai(), 4)
            .run(&variables(), &store(), &CancellationToken::new())
            .await;

        assert_eq!(sequential.counts, parallel.counts);
        for (a, b) in sequential.entries.iter().zip(&parallel.entries) {
            assert_eq!(a.variable.section_id, b.variable.section_id);
            assert_eq!(a.result.status, b.result.status);
            assert_eq!(a.result.evidence, b.result.evidence);
            assert_eq!(a.validation, b.validation);
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = orchestrator(MockAI::new(), 2)
            .run(&variables(), &store(), &cancel)
            .await;

        assert!(report.cancelled);
        assert_eq!(report.entries.len(), 4);
        assert_eq!(report.counts.get(ExtractionStatus::Error), 4);
        assert!(report
            .entries
            .iter()
            .all(|e| e.result.error.as_deref() == Some(CANCELLED_BEFORE_START)));
    }

    #[tokio::test]
    async fn test_cancel_in_flight() {
        let ai = MockAI::new().with_search_delay(Duration::from_secs(30));
        let orchestrator = orchestrator(ai, 1);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let vars = vec![
            Variable::new("1", "Title", Complexity::Easy, Availability::Yes),
            Variable::new("5", "Purpose", Complexity::Easy, Availability::Yes),
        ];
        let report = orchestrator.run(&vars, &store(), &cancel).await;

        assert!(report.cancelled);
        assert_eq!(report.section_ids(), vec!["1", "5"]);
        assert_eq!(
            report.entry("1").unwrap().result.error.as_deref(),
            Some(CANCELLED_IN_FLIGHT)
        );
        assert_eq!(
            report.entry("5").unwrap().result.error.as_deref(),
            Some(CANCELLED_BEFORE_START)
        );
    }
}

//! Configuration types for the engine and orchestrator.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::variable::Complexity;

/// Maximum search-loop iterations per complexity label.
///
/// Passed into the engine at construction; there is no global table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationBudgets {
    pub easy: usize,
    pub moderate: usize,
    pub complex: usize,

    /// Reserved for "is this really absent?" checks on `availability = No`
    pub not_in_protocol: usize,
}

impl Default for IterationBudgets {
    fn default() -> Self {
        Self {
            easy: 10,
            moderate: 15,
            complex: 20,
            not_in_protocol: 8,
        }
    }
}

impl IterationBudgets {
    /// Budget for a complexity label.
    pub fn for_complexity(&self, complexity: Complexity) -> usize {
        match complexity {
            Complexity::Easy => self.easy,
            Complexity::Moderate => self.moderate,
            Complexity::Complex => self.complex,
            Complexity::NotInProtocol => self.not_in_protocol,
        }
    }

    /// Clamp every entry to `max_iterations`.
    pub fn capped(self, max_iterations: usize) -> Self {
        Self {
            easy: self.easy.min(max_iterations),
            moderate: self.moderate.min(max_iterations),
            complex: self.complex.min(max_iterations),
            not_in_protocol: self.not_in_protocol.min(max_iterations),
        }
    }
}

/// When the search loop may stop before its budget runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizePolicy {
    /// Honour the model's `sufficient` self-report.
    ///
    /// When false the loop only stops on budget or segment exhaustion.
    pub trust_model_signal: bool,

    /// Evidence items required before the self-report is honoured.
    pub min_evidence: usize,
}

impl Default for FinalizePolicy {
    fn default() -> Self {
        Self {
            trust_model_signal: true,
            min_evidence: 1,
        }
    }
}

impl FinalizePolicy {
    /// Never finalize early.
    pub fn exhaustive() -> Self {
        Self {
            trust_model_signal: false,
            min_evidence: 0,
        }
    }

    /// Should the loop finalize now?
    pub fn is_satisfied(&self, model_says_sufficient: bool, evidence_count: usize) -> bool {
        self.trust_model_signal && model_says_sufficient && evidence_count >= self.min_evidence
    }
}

/// Configuration for the extraction engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Iteration budget per complexity label
    pub budgets: IterationBudgets,

    /// Timeout for a single AI call.
    ///
    /// A timed-out search call consumes its iteration but is not fatal.
    pub query_timeout: Duration,

    /// Maximum characters of protocol text per search query.
    ///
    /// A single page larger than this forms its own batch. Default: 100_000.
    pub max_batch_chars: usize,

    /// Batches queried (concurrently) per iteration. Default: 1.
    pub batches_per_iteration: usize,

    pub finalize: FinalizePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            budgets: IterationBudgets::default(),
            query_timeout: Duration::from_secs(120),
            max_batch_chars: 100_000,
            batches_per_iteration: 1,
            finalize: FinalizePolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap every iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.budgets = self.budgets.capped(max_iterations);
        self
    }

    pub fn with_budgets(mut self, budgets: IterationBudgets) -> Self {
        self.budgets = budgets;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_max_batch_chars(mut self, chars: usize) -> Self {
        self.max_batch_chars = chars.max(1);
        self
    }

    pub fn with_batches_per_iteration(mut self, batches: usize) -> Self {
        self.batches_per_iteration = batches.max(1);
        self
    }

    pub fn with_finalize_policy(mut self, policy: FinalizePolicy) -> Self {
        self.finalize = policy;
        self
    }
}

/// Configuration for the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Variables extracted concurrently. 0 or 1 runs sequentially.
    pub workers: usize,

    /// Only process these section ids (empty = all)
    #[serde(default)]
    pub section_filter: Vec<String>,
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self {
            workers: 1,
            section_filter: Vec::new(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_sections(mut self, sections: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.section_filter = sections.into_iter().map(|s| s.into()).collect();
        self
    }

    /// Effective worker count (at least one).
    pub fn effective_workers(&self) -> usize {
        self.workers.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budgets() {
        let budgets = IterationBudgets::default();
        assert_eq!(budgets.for_complexity(Complexity::Easy), 10);
        assert_eq!(budgets.for_complexity(Complexity::Moderate), 15);
        assert_eq!(budgets.for_complexity(Complexity::Complex), 20);
        assert_eq!(budgets.for_complexity(Complexity::NotInProtocol), 8);
    }

    #[test]
    fn test_budget_cap() {
        let config = EngineConfig::new().with_max_iterations(12);
        assert_eq!(config.budgets.easy, 10);
        assert_eq!(config.budgets.moderate, 12);
        assert_eq!(config.budgets.complex, 12);
        assert_eq!(config.budgets.not_in_protocol, 8);
    }

    #[test]
    fn test_finalize_policy() {
        let policy = FinalizePolicy::default();
        assert!(policy.is_satisfied(true, 1));
        assert!(!policy.is_satisfied(true, 0));
        assert!(!policy.is_satisfied(false, 3));

        assert!(!FinalizePolicy::exhaustive().is_satisfied(true, 5));
    }

    #[test]
    fn test_orchestrator_workers() {
        assert_eq!(OrchestratorConfig::default().effective_workers(), 1);
        assert_eq!(OrchestratorConfig::new().with_workers(4).effective_workers(), 4);
    }
}

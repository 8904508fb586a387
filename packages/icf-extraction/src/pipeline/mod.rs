//! Extraction pipeline - the core of the library.
//!
//! The pipeline orchestrates:
//! - Routing (skip / standard text / search with a budget)
//! - The bounded search loop over unexamined pages
//! - Synthesis with evidence grounding
//! - Validation (quote verification, reading level, traceability)
//! - The run-level orchestrator with bounded concurrency

pub mod engine;
pub mod extract;
pub mod grounding;
pub mod orchestrator;
pub mod partition;
pub mod prompts;
pub mod readability;
pub mod search;
pub mod validate;

pub use engine::{ExtractionEngine, Route};
pub use extract::{
    parse_json_response, parse_search_response, parse_synthesis_response, AICandidate,
    AISearchResponse, AISynthesisResponse, AIVerdict,
};
pub use grounding::{
    derive_confidence, fill_template, resolve_filled_template, EvidenceAccumulator,
    MANUAL_ENTRY_MARKER,
};
pub use orchestrator::{
    select_variables, InvalidTransition, Orchestrator, VariableState, CANCELLED_BEFORE_START,
    CANCELLED_IN_FLIGHT,
};
pub use partition::{partition_unexamined, Batch};
pub use prompts::{
    format_search_prompt, format_synthesis_prompt, prompt_version_hash, SEARCH_PROMPT,
    SEARCH_SYSTEM_PROMPT, SYNTHESIS_PROMPT, SYNTHESIS_SYSTEM_PROMPT,
};
pub use readability::flesch_kincaid_grade;
pub use search::{SearchLoop, SearchOutcome, Termination};
pub use validate::{validate, verify_quote, QuoteCheck};

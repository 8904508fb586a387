//! Grounded Informed Consent Form Drafting Library
//!
//! Drafts the sections of an informed consent form from a clinical trial
//! protocol. Each section (a *variable*) is extracted independently by a
//! bounded search loop over the protocol's pages, synthesized into plain
//! language, and validated against the source before it reaches the draft.
//!
//! # Design Philosophy
//!
//! - Every claim cites a verbatim quote and the page it came from
//! - A missing answer is reported as missing, never invented
//! - One variable's failure never aborts the run
//! - The query capability is a trait; the library never hardcodes a model
//!
//! # Usage
//!
//! ```rust,ignore
//! use icf_extraction::{load_protocol, load_registry, Orchestrator, ExtractionEngine};
//! use icf_extraction::testing::MockAI;
//! use tokio_util::sync::CancellationToken;
//!
//! let variables = load_registry("sections.csv")?;
//! let store = load_protocol("protocol.txt")?;
//!
//! let engine = ExtractionEngine::new(MockAI::new(), EngineConfig::default());
//! let orchestrator = Orchestrator::new(engine, OrchestratorConfig::default());
//! let report = orchestrator.run(&variables, &store, &CancellationToken::new()).await;
//!
//! write_report_json(&report, Path::new("output"))?;
//! write_draft(&report, &variables, Path::new("output"))?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - The `AI` query capability
//! - [`types`] - Variables, document store, results, report, configuration
//! - [`pipeline`] - Extraction engine, search loop, validator, orchestrator
//! - [`registry`] - Variable registry CSV loading
//! - [`ingest`] - Protocol text into a page-addressable document store
//! - [`assemble`] - JSON report and Markdown draft output
//! - [`ai`] - OpenAI-compatible backend and rate limiting
//! - [`security`] - Credential handling
//! - [`testing`] - Mock implementations for testing

pub mod ai;
pub mod assemble;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod registry;
pub mod security;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{
    AssembleError, ConfigError, ExtractionError, IngestError, RegistryError, Result,
};
pub use traits::ai::{SearchPrompt, SynthesisPrompt, AI};
pub use types::{
    config::{EngineConfig, FinalizePolicy, IterationBudgets, OrchestratorConfig},
    document::{DocumentSegment, DocumentStore},
    report::{ExtractionReport, ReportEntry, StatusCounts},
    result::{Confidence, Evidence, ExtractionResult, ExtractionStatus, ValidationResult},
    variable::{Availability, Complexity, Variable},
};

// Re-export pipeline components
pub use pipeline::{
    // Engine
    ExtractionEngine, Route, SearchLoop, SearchOutcome, Termination,
    // Validation
    flesch_kincaid_grade, validate, verify_quote, QuoteCheck,
    // Orchestration
    select_variables, Orchestrator, VariableState, CANCELLED_BEFORE_START, CANCELLED_IN_FLIGHT,
    // Grounding
    MANUAL_ENTRY_MARKER,
};

// Re-export loaders and writers
pub use assemble::{render_draft, render_report_json, write_draft, write_report_json, ReportSummary};
pub use ingest::{load_protocol, parse_protocol_text};
pub use registry::{load_registry, parse_registry};

// Re-export AI backends
#[cfg(feature = "openai")]
pub use ai::OpenAI;
pub use ai::RateLimitedAI;
pub use security::{AICredentials, Provider, SecretString};

// Re-export testing utilities
pub use testing::MockAI;

//! AI trait - the query capability the engine calls.
//!
//! The AI trait abstracts the two LLM operations the extraction engine
//! needs:
//! - Search: does this batch of protocol pages answer the instructions?
//! - Synthesis: turn accumulated evidence into a plain-language answer
//!
//! Both return the model's raw text. Parsing happens in the engine so a
//! malformed response is visible and can be reported, not papered over.
//! These calls are the only suspension points of an extraction.

use async_trait::async_trait;

use crate::error::Result;

/// A search query over one batch of protocol pages.
#[derive(Debug, Clone)]
pub struct SearchPrompt {
    /// Variable being extracted
    pub section_id: String,

    /// 1-based search-loop iteration
    pub iteration: usize,

    /// Page numbers included in this batch
    pub pages: Vec<u32>,

    pub system: String,

    /// Instructions plus the page-marked excerpt
    pub user: String,
}

/// A synthesis request over accumulated evidence.
#[derive(Debug, Clone)]
pub struct SynthesisPrompt {
    pub section_id: String,

    pub evidence_count: usize,

    pub system: String,

    pub user: String,
}

/// AI trait for LLM operations.
///
/// Implementations wrap specific LLM providers (OpenAI, OpenRouter, etc.)
/// and are expected to ask for JSON output. They must be cheap to share
/// across concurrently running extractions.
#[async_trait]
pub trait AI: Send + Sync {
    /// Ask whether a batch of pages contains information answering the
    /// variable's instructions.
    ///
    /// Expected JSON: `{"candidates": [{"quote", "page", "relevance"}],
    /// "sufficient": bool, "notes": string}`.
    async fn search(&self, prompt: &SearchPrompt) -> Result<String>;

    /// Write the plain-language answer from accumulated evidence.
    ///
    /// Expected JSON: `{"status", "answer", "filled_template", "notes",
    /// "conflicting"}`.
    async fn synthesize(&self, prompt: &SynthesisPrompt) -> Result<String>;
}

#[async_trait]
impl<T: AI + ?Sized> AI for std::sync::Arc<T> {
    async fn search(&self, prompt: &SearchPrompt) -> Result<String> {
        (**self).search(prompt).await
    }

    async fn synthesize(&self, prompt: &SynthesisPrompt) -> Result<String> {
        (**self).synthesize(prompt).await
    }
}

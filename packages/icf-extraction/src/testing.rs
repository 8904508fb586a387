//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the extraction library
//! without making real AI calls.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{ExtractionError, Result};
use crate::traits::ai::{SearchPrompt, SynthesisPrompt, AI};

/// A scripted quote returned when a search batch contains its page.
#[derive(Debug, Clone)]
struct SearchHit {
    page: u32,
    quote: String,
    sufficient: bool,
}

/// A mock AI implementation for testing.
///
/// Returns deterministic, configurable responses keyed by section id.
/// Unscripted sections find nothing during search and synthesize a
/// generic FOUND answer.
#[derive(Default)]
pub struct MockAI {
    /// Quotes that appear when their page is searched
    hits: Arc<RwLock<HashMap<String, Vec<SearchHit>>>>,

    /// Raw search responses returned for every batch
    search_responses: Arc<RwLock<HashMap<String, String>>>,

    /// Raw synthesis responses
    synthesis_responses: Arc<RwLock<HashMap<String, String>>>,

    /// Sections whose search fails with this message
    search_failures: Arc<RwLock<HashMap<String, String>>>,

    /// Sections whose synthesis fails with this message
    synthesis_failures: Arc<RwLock<HashMap<String, String>>>,

    /// Sections whose search panics
    panics: Arc<RwLock<Vec<String>>>,

    search_delay: Option<Duration>,
    synthesis_delay: Option<Duration>,

    /// Call tracking for assertions
    calls: Arc<RwLock<Vec<MockAICall>>>,
}

/// Record of a call made to the mock AI.
#[derive(Debug, Clone)]
pub enum MockAICall {
    Search(SearchPrompt),
    Synthesize(SynthesisPrompt),
}

impl MockAI {
    /// Create a new mock AI with default behavior.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `quote` whenever a search for `section_id` covers `page`.
    pub fn with_search_hit(
        self,
        section_id: impl Into<String>,
        page: u32,
        quote: impl Into<String>,
        sufficient: bool,
    ) -> Self {
        self.hits
            .write()
            .unwrap()
            .entry(section_id.into())
            .or_default()
            .push(SearchHit {
                page,
                quote: quote.into(),
                sufficient,
            });
        self
    }

    /// Return `raw` for every search batch of `section_id`.
    pub fn with_search_response(self, section_id: impl Into<String>, raw: impl Into<String>) -> Self {
        self.search_responses
            .write()
            .unwrap()
            .insert(section_id.into(), raw.into());
        self
    }

    /// Return `raw` from synthesis for `section_id`.
    pub fn with_synthesis_response(
        self,
        section_id: impl Into<String>,
        raw: impl Into<String>,
    ) -> Self {
        self.synthesis_responses
            .write()
            .unwrap()
            .insert(section_id.into(), raw.into());
        self
    }

    /// Make every search for `section_id` fail.
    pub fn with_search_failure(
        self,
        section_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.search_failures
            .write()
            .unwrap()
            .insert(section_id.into(), message.into());
        self
    }

    /// Make synthesis for `section_id` fail.
    pub fn with_synthesis_failure(
        self,
        section_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.synthesis_failures
            .write()
            .unwrap()
            .insert(section_id.into(), message.into());
        self
    }

    /// Panic inside search for `section_id`.
    pub fn with_panic(self, section_id: impl Into<String>) -> Self {
        self.panics.write().unwrap().push(section_id.into());
        self
    }

    /// Sleep before answering every search call.
    pub fn with_search_delay(mut self, delay: Duration) -> Self {
        self.search_delay = Some(delay);
        self
    }

    /// Sleep before answering every synthesis call.
    pub fn with_synthesis_delay(mut self, delay: Duration) -> Self {
        self.synthesis_delay = Some(delay);
        self
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockAICall> {
        self.calls.read().unwrap().clone()
    }

    pub fn search_calls(&self) -> Vec<SearchPrompt> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockAICall::Search(p) => Some(p),
                MockAICall::Synthesize(_) => None,
            })
            .collect()
    }

    pub fn synthesis_calls(&self) -> Vec<SynthesisPrompt> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockAICall::Synthesize(p) => Some(p),
                MockAICall::Search(_) => None,
            })
            .collect()
    }

    /// Search calls made for one section.
    pub fn search_calls_for(&self, section_id: &str) -> usize {
        self.search_calls()
            .iter()
            .filter(|p| p.section_id == section_id)
            .count()
    }

    /// Clear call history.
    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    fn scripted_search(&self, prompt: &SearchPrompt) -> String {
        if let Some(raw) = self.search_responses.read().unwrap().get(&prompt.section_id) {
            return raw.clone();
        }

        let hits = self.hits.read().unwrap();
        let matching: Vec<&SearchHit> = hits
            .get(&prompt.section_id)
            .map(|hits| {
                hits.iter()
                    .filter(|h| prompt.pages.contains(&h.page))
                    .collect()
            })
            .unwrap_or_default();

        let candidates: Vec<serde_json::Value> = matching
            .iter()
            .map(|h| serde_json::json!({"quote": h.quote, "page": h.page, "relevance": 0.9}))
            .collect();
        let sufficient = matching.iter().any(|h| h.sufficient);

        serde_json::json!({"candidates": candidates, "sufficient": sufficient}).to_string()
    }

    fn default_synthesis(prompt: &SynthesisPrompt) -> String {
        serde_json::json!({
            "status": "FOUND",
            "answer": format!("Mock answer for section {}.", prompt.section_id),
            "filled_template": "",
            "notes": "",
            "conflicting": false
        })
        .to_string()
    }
}

#[async_trait]
impl AI for MockAI {
    async fn search(&self, prompt: &SearchPrompt) -> Result<String> {
        self.calls
            .write()
            .unwrap()
            .push(MockAICall::Search(prompt.clone()));

        if self.panics.read().unwrap().contains(&prompt.section_id) {
            panic!("mock AI panic for section {}", prompt.section_id);
        }

        if let Some(delay) = self.search_delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self.search_failures.read().unwrap().get(&prompt.section_id) {
            return Err(ExtractionError::AI(message.clone().into()));
        }

        Ok(self.scripted_search(prompt))
    }

    async fn synthesize(&self, prompt: &SynthesisPrompt) -> Result<String> {
        self.calls
            .write()
            .unwrap()
            .push(MockAICall::Synthesize(prompt.clone()));

        if let Some(delay) = self.synthesis_delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self
            .synthesis_failures
            .read()
            .unwrap()
            .get(&prompt.section_id)
        {
            return Err(ExtractionError::AI(message.clone().into()));
        }

        Ok(self
            .synthesis_responses
            .read()
            .unwrap()
            .get(&prompt.section_id)
            .cloned()
            .unwrap_or_else(|| Self::default_synthesis(prompt)))
    }
}

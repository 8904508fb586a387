//! Core trait abstractions for the extraction library.
//!
//! Applications implement [`ai::AI`] to provide the LLM query capability.

pub mod ai;

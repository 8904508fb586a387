//! AI implementations for the extraction library.
//!
//! This module provides reference implementations of the `AI` trait.
//! Users can use these directly or implement their own.

mod rate_limited;
pub mod schema;

#[cfg(feature = "openai")]
mod openai;

#[cfg(feature = "openai")]
pub use openai::OpenAI;
pub use rate_limited::RateLimitedAI;
pub use schema::StructuredOutput;

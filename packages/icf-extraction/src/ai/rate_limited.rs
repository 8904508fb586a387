//! Rate-limited AI wrapper.
//!
//! Wraps any AI implementation with a request quota using the governor
//! crate, so a worker pool cannot outrun the provider's limits.

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;

use crate::error::Result;
use crate::traits::ai::{SearchPrompt, SynthesisPrompt, AI};

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// An AI wrapper that waits for a permit before every query.
pub struct RateLimitedAI<A: AI> {
    inner: A,
    limiter: Arc<DefaultRateLimiter>,
}

impl<A: AI> RateLimitedAI<A> {
    /// Allow `requests_per_minute` queries per minute. Zero is treated as one.
    pub fn per_minute(inner: A, requests_per_minute: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_minute).unwrap_or(nonzero!(1u32));
        Self::with_quota(inner, Quota::per_minute(rate))
    }

    /// Create with a custom quota.
    pub fn with_quota(inner: A, quota: Quota) -> Self {
        Self {
            inner,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    async fn wait_for_permit(&self) {
        self.limiter.until_ready().await;
    }
}

#[async_trait]
impl<A: AI> AI for RateLimitedAI<A> {
    async fn search(&self, prompt: &SearchPrompt) -> Result<String> {
        self.wait_for_permit().await;
        self.inner.search(prompt).await
    }

    async fn synthesize(&self, prompt: &SynthesisPrompt) -> Result<String> {
        self.wait_for_permit().await;
        self.inner.synthesize(prompt).await
    }
}

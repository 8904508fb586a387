//! Credential handling with secure memory.
//!
//! Uses the `secrecy` crate to prevent accidental logging of sensitive values.

use secrecy::{ExposeSecret, SecretBox};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// A secret string that won't be logged or displayed.
///
/// Uses `secrecy::SecretBox` to ensure API keys and other credentials
/// are never accidentally exposed in logs, debug output, or error messages.
pub struct SecretString(SecretBox<str>);

impl SecretString {
    /// Create a new secret string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretBox::new(Box::from(value.into().as_str())))
    }

    /// Expose the secret value for use.
    ///
    /// Only call this when actually using the secret (e.g., in an API request).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self::new(self.expose().to_string())
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Chat-completions provider. Both speak the OpenAI wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    OpenRouter,
}

impl Provider {
    /// Environment variable holding the API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::OpenRouter => "OPENROUTER_API_KEY",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::OpenAI => "https://api.openai.com/v1",
            Provider::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAI => "openai",
            Provider::OpenRouter => "openrouter",
        }
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAI),
            "openrouter" => Ok(Provider::OpenRouter),
            other => Err(ConfigError::Invalid {
                name: "backend",
                reason: format!("unknown backend '{other}' (expected openai or openrouter)"),
            }),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for an AI service with secure credential handling.
#[derive(Clone)]
pub struct AICredentials {
    pub provider: Provider,

    /// API key (secret)
    pub api_key: SecretString,

    /// Model identifier
    pub model: String,

    /// API base URL override
    pub base_url: Option<String>,
}

impl AICredentials {
    /// Create new AI credentials.
    pub fn new(provider: Provider, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider,
            api_key: SecretString::new(api_key),
            model: model.into(),
            base_url: None,
        }
    }

    /// Read the provider's API key from the environment.
    pub fn from_env(provider: Provider, model: impl Into<String>) -> Result<Self, ConfigError> {
        Self::from_lookup(provider, model, |name| std::env::var(name).ok())
    }

    /// Read the API key through `lookup`. A blank key counts as missing.
    pub fn from_lookup(
        provider: Provider,
        model: impl Into<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let variable = provider.api_key_env();
        let key = lookup(variable)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingCredential { variable })?;

        Ok(Self::new(provider, key, model))
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Base URL to call: the override, or the provider default.
    pub fn endpoint(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
    }
}

impl fmt::Debug for AICredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AICredentials")
            .field("provider", &self.provider)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

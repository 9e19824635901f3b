// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! LLM provider implementations.
//!
//! The host speaks the OpenAI chat completions protocol, which also covers
//! Ollama, Groq, Together and most self-hosted gateways.
//!
//! ```bash
//! # Hosted OpenAI
//! export OPENAI_API_KEY=your-key
//!
//! # Ollama or any compatible endpoint (no key needed)
//! mcp-host chat --base-url http://localhost:11434/v1 --model llama3.2 "hi"
//! ```
//!
//! ```rust,ignore
//! use mcp_host::providers::create_provider_from_config;
//!
//! let provider = create_provider_from_config(&config.provider_config())?;
//! let response = provider.chat(&messages, Some(&tools), None).await?;
//! ```

pub mod openai;

pub use openai::{OpenAIProvider, DEFAULT_MODEL, OPENAI_BASE_URL};

use std::sync::Arc;

use crate::error::ProviderError;
use crate::types::{ProviderConfig, SharedProvider};

/// Environment variable consulted when no key is configured.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Only the hosted OpenAI API refuses unauthenticated requests.
fn requires_api_key(base_url: &str) -> bool {
    base_url.contains("api.openai.com")
}

/// Build the provider described by `config`.
///
/// A missing key falls back to `OPENAI_API_KEY`. It is an error only when
/// the endpoint is the hosted OpenAI API.
pub fn create_provider_from_config(config: &ProviderConfig) -> Result<SharedProvider, ProviderError> {
    let base_url = config
        .base_url
        .clone()
        .unwrap_or_else(|| OPENAI_BASE_URL.to_string());
    let model = config
        .model
        .clone()
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let api_key = config
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()));

    if api_key.is_none() && requires_api_key(&base_url) {
        return Err(ProviderError::NotConfigured(format!(
            "{} not set; configure llm.apiKey or point llm.baseUrl at a local endpoint",
            API_KEY_ENV
        )));
    }

    let provider = OpenAIProvider::new(api_key, model, base_url, config)?;
    Ok(Arc::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_endpoint_needs_no_key() {
        let config = ProviderConfig {
            base_url: Some("http://localhost:11434/v1".into()),
            model: Some("llama3.2".into()),
            ..Default::default()
        };
        let provider = create_provider_from_config(&config).unwrap();
        assert_eq!(provider.model(), "llama3.2");
        assert_eq!(provider.name(), "Ollama");
    }

    #[test]
    fn test_explicit_key_and_defaults() {
        let config = ProviderConfig {
            api_key: Some("sk-test".into()),
            ..Default::default()
        };
        let provider = create_provider_from_config(&config).unwrap();
        assert_eq!(provider.model(), DEFAULT_MODEL);
    }

    #[test]
    fn test_requires_api_key() {
        assert!(requires_api_key(OPENAI_BASE_URL));
        assert!(!requires_api_key("http://localhost:8080/v1"));
    }
}

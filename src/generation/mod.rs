// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Upstream text-generation collaborators
//!
//! The gateway only needs `generate(prompt) -> text`; retries, model choice
//! and provider failover belong to the implementation behind this trait.

pub mod echo;
pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

pub use echo::EchoGenerator;
pub use openai::{OpenAiCompatibleGenerator, OpenAiConfig};

/// Errors surfaced by a generation backend
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Transport failure talking to the backend
    #[error("Generation request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("Generation backend returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Backend did not answer in time
    #[error("Generation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Backend answered without any generated text
    #[error("Generation backend returned no choices")]
    EmptyResponse,
}

/// A text-generation backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt`
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

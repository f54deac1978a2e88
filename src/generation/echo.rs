// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use async_trait::async_trait;

use super::{GenerationError, TextGenerator};

/// Returns the prompt unchanged. Used when no upstream is configured, which
/// turns the gateway into a pure filter.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoGenerator;

#[async_trait]
impl TextGenerator for EchoGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        Ok(prompt.to_string())
    }

    fn name(&self) -> &'static str {
        "echo"
    }
}

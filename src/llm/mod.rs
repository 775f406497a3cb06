use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod chat;
pub mod prompts;
pub mod report;

#[cfg(feature = "gemini")]
pub mod client;
#[cfg(feature = "gemini")]
pub mod types;

pub use chat::*;
pub use report::*;

#[cfg(feature = "gemini")]
pub use client::GeminiClient;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system_instruction: Option<String>,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_instruction: None,
            temperature: 0.7,
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Prompt in, text out. The report generator and the chat assistant only see
/// this contract, never a concrete network client.
#[async_trait]
pub trait TextCompletionService: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

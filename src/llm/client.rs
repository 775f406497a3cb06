use crate::error::{Result, SalesInsightsError};
use crate::llm::types::*;
use crate::llm::{CompletionRequest, TextCompletionService};
use async_trait::async_trait;
use log::debug;
use reqwest::Client;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Reads the key from `GEMINI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.trim().is_empty() => Ok(Self::new(key)),
            _ => Err(SalesInsightsError::InvalidConfig(format!(
                "{} is not set",
                API_KEY_ENV
            ))),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub(crate) async fn generate_content(&self, request: &CompletionRequest) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let payload = GenerateContentRequest {
            contents: vec![Content::user(request.prompt.clone())],
            system_instruction: request
                .system_instruction
                .as_ref()
                .map(|s| Content::system(s.clone())),
            generation_config: GenerationConfig {
                temperature: request.temperature,
            },
        };

        debug!(
            "Calling {} with a {} character prompt",
            self.model,
            request.prompt.len()
        );
        let res = self.client.post(&url).json(&payload).send().await?;
        let status = res.status();

        if !status.is_success() {
            let err_text = res.text().await?;
            return Err(SalesInsightsError::Completion(format!(
                "Gemini API Error (status {}): {}",
                status, err_text
            )));
        }

        let body: GenerateContentResponse = res.json().await?;
        body.first_text()
            .ok_or_else(|| SalesInsightsError::Completion("No text in response".to_string()))
    }
}

#[async_trait]
impl TextCompletionService for GeminiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        self.generate_content(&request).await
    }
}

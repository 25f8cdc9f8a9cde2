use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openrouter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::error::{ReportError, Result};

const SUMMARY_PREAMBLE: &str =
    "You are a medical AI expert who writes clear, concise report summaries for doctors.";
const QA_PREAMBLE: &str = "You are a medical expert AI that answers questions strictly \
                           from the medical report provided.";

/// A hosted chat model that turns a system preamble plus a user prompt into text
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, preamble: &str, prompt: &str) -> anyhow::Result<String>;
}

/// Chat completions through OpenRouter
pub struct OpenRouterModel {
    client: openrouter::Client,
    model: String,
}

impl OpenRouterModel {
    pub fn new(api_key: &str, model: impl Into<String>) -> Self {
        Self {
            client: openrouter::Client::new(api_key),
            model: model.into(),
        }
    }
}

#[async_trait]
impl ChatModel for OpenRouterModel {
    async fn complete(&self, preamble: &str, prompt: &str) -> anyhow::Result<String> {
        let agent = self.client.agent(&self.model).preamble(preamble).build();
        let response = agent.prompt(prompt).await?;
        Ok(response)
    }
}

pub fn summary_prompt(report_text: &str) -> String {
    format!(
        "Summarize the following medical report clearly and concisely for a doctor.

        Medical Report:
        {}

        Summary:",
        report_text
    )
}

pub fn answer_prompt(report_text: &str, question: &str) -> String {
    format!(
        "Based only on the given medical report, answer the question accurately.

        Medical Report:
        {}

        Question: {}

        Answer:",
        report_text, question
    )
}

/// The two operations the assistant needs from the language model
#[derive(Clone)]
pub struct LlmFacade {
    model: Arc<dyn ChatModel>,
    timeout: Duration,
}

impl LlmFacade {
    pub fn new(model: Arc<dyn ChatModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    pub async fn summarize(&self, report_text: &str) -> Result<String> {
        info!("Requesting summary for {} characters of report text", report_text.len());
        self.generate(SUMMARY_PREAMBLE, &summary_prompt(report_text))
            .await
    }

    pub async fn answer(&self, report_text: &str, question: &str) -> Result<String> {
        info!("Requesting answer for question: {}", question);
        self.generate(QA_PREAMBLE, &answer_prompt(report_text, question))
            .await
    }

    async fn generate(&self, preamble: &str, prompt: &str) -> Result<String> {
        let response = tokio::time::timeout(self.timeout, self.model.complete(preamble, prompt))
            .await
            .map_err(|_| {
                error!("LLM call timed out after {:?}", self.timeout);
                ReportError::GenerationFailed(format!(
                    "no response from the model within {:?}",
                    self.timeout
                ))
            })?
            .map_err(|e| {
                error!("LLM call failed: {}", e);
                ReportError::GenerationFailed(e.to_string())
            })?;

        if response.trim().is_empty() {
            return Err(ReportError::GenerationFailed(
                "the model returned an empty response".to_string(),
            ));
        }

        info!("LLM returned {} characters", response.len());
        Ok(response)
    }
}

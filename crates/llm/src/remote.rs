//! OpenAI-compatible chat-completions backend.
//!
//! Each prompt is a separate request. Failed prompts are collected and
//! retried in sweeps; after `max_attempts` sweeps whatever is still
//! unanswered is reported as failed with the last error seen.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::generator::TextGenerator;
use crate::http::{build_client, endpoint, post_with_attempts};
use crate::types::{ChatMessage, ChatPrompt, GenerateParams, GenerationOutcome};

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiGenerator {
    client: Client,
    base_url: Url,
    api_key: String,
    model: String,
    params: GenerateParams,
    /// Sweeps handle retries; each request is tried once per sweep.
    single_attempt: GenerateParams,
}

impl OpenAiGenerator {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        params: GenerateParams,
    ) -> anyhow::Result<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| anyhow::anyhow!("Invalid API base URL '{base_url}': {e}"))?;
        let single_attempt = GenerateParams {
            max_attempts: 1,
            ..params.clone()
        };
        Ok(Self {
            client: build_client(&params)?,
            base_url,
            api_key: api_key.into(),
            model: model.into(),
            params,
            single_attempt,
        })
    }

    async fn complete(&self, url: &Url, prompt: &ChatPrompt) -> anyhow::Result<String> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: prompt.messages(),
            max_tokens: self.params.max_new_tokens,
            temperature: self.params.temperature,
            top_p: self.params.top_p,
        };
        let resp =
            post_with_attempts(&self.client, url, &request, Some(&self.api_key), &self.single_attempt).await?;
        let body: ChatCompletionResponse = resp.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| anyhow::anyhow!("Response has no message content"))
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompts: Vec<ChatPrompt>) -> anyhow::Result<Vec<GenerationOutcome>> {
        let url = endpoint(&self.base_url, "chat/completions")?;
        let mut outcomes: Vec<Option<GenerationOutcome>> = vec![None; prompts.len()];
        let mut last_errors: Vec<String> = vec![String::new(); prompts.len()];
        let mut remaining: Vec<usize> = (0..prompts.len()).collect();

        let sweeps = self.params.max_attempts.max(1);
        for sweep in 0..sweeps {
            if remaining.is_empty() {
                break;
            }
            if sweep > 0 {
                let delay = self.params.backoff(sweep - 1);
                tracing::info!(sweep, remaining = remaining.len(), delay_ms = delay.as_millis() as u64, "Retrying failed prompts");
                tokio::time::sleep(delay).await;
            }

            let mut still_failing = Vec::new();
            for &i in &remaining {
                match self.complete(&url, &prompts[i]).await {
                    Ok(text) => outcomes[i] = Some(GenerationOutcome::Completed(text)),
                    Err(e) => {
                        tracing::error!(error = %e, prompt = i, sweep, "OpenAI API error");
                        last_errors[i] = e.to_string();
                        still_failing.push(i);
                    }
                }
            }
            remaining = still_failing;
        }

        if !remaining.is_empty() {
            tracing::warn!(failed = remaining.len(), total = prompts.len(), "Prompts failed after all sweeps");
        }
        Ok(outcomes
            .into_iter()
            .zip(last_errors)
            .map(|(outcome, reason)| outcome.unwrap_or(GenerationOutcome::Failed { reason }))
            .collect())
    }
}

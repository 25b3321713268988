//! Local generation through an SGLang server.
//!
//! Prompts are rendered with a chat template and sent together in one
//! batched `/generate` request. If that request ultimately fails, every
//! prompt in the batch is reported as failed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::generator::TextGenerator;
use crate::http::{build_client, endpoint, post_with_attempts};
use crate::types::{ChatPrompt, GenerateParams, GenerationOutcome};

/// How a system + user pair is flattened into raw text for `/generate`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatTemplate {
    #[default]
    ChatMl,
    Llama3,
    Plain,
}

impl ChatTemplate {
    pub fn render(&self, prompt: &ChatPrompt) -> String {
        match self {
            ChatTemplate::ChatMl => format!(
                "<|im_start|>system\n{}<|im_end|>\n<|im_start|>user\n{}<|im_end|>\n<|im_start|>assistant\n",
                prompt.system, prompt.user
            ),
            ChatTemplate::Llama3 => format!(
                "<|begin_of_text|><|start_header_id|>system<|end_header_id|>\n\n{}<|eot_id|>\
                 <|start_header_id|>user<|end_header_id|>\n\n{}<|eot_id|>\
                 <|start_header_id|>assistant<|end_header_id|>\n\n",
                prompt.system, prompt.user
            ),
            ChatTemplate::Plain => format!("{}\n\n{}\n\n", prompt.system, prompt.user),
        }
    }
}

#[derive(Serialize)]
struct BatchGenerateRequest {
    text: Vec<String>,
    sampling_params: SamplingParams,
}

#[derive(Serialize)]
struct SamplingParams {
    max_new_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    text: String,
}

/// Client for a locally served model.
pub struct LocalGenerator {
    client: Client,
    base_url: Url,
    template: ChatTemplate,
    params: GenerateParams,
}

impl LocalGenerator {
    pub fn new(server_url: &str, template: ChatTemplate, params: GenerateParams) -> anyhow::Result<Self> {
        let base_url = Url::parse(server_url)
            .map_err(|e| anyhow::anyhow!("Invalid server URL '{server_url}': {e}"))?;
        Ok(Self {
            client: build_client(&params)?,
            base_url,
            template,
            params,
        })
    }

    /// Verify the server is reachable.
    pub async fn health_check(&self) -> anyhow::Result<()> {
        let url = endpoint(&self.base_url, "health")?;
        let resp = self
            .client
            .get(url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Generation server unreachable at {}: {e}", self.base_url))?;
        if !resp.status().is_success() {
            anyhow::bail!("Generation server health check returned {}", resp.status());
        }
        tracing::info!(url = %self.base_url, "Generation server healthy");
        Ok(())
    }

    async fn generate_batch(&self, prompts: &[ChatPrompt]) -> anyhow::Result<Vec<String>> {
        let request = BatchGenerateRequest {
            text: prompts.iter().map(|p| self.template.render(p)).collect(),
            sampling_params: SamplingParams {
                max_new_tokens: self.params.max_new_tokens,
                temperature: self.params.temperature,
                top_p: self.params.top_p,
            },
        };
        let url = endpoint(&self.base_url, "generate")?;
        let resp = post_with_attempts(&self.client, &url, &request, None, &self.params).await?;
        let items: Vec<GenerateResponse> = resp.json().await?;
        if items.len() != prompts.len() {
            anyhow::bail!("Server returned {} completions for {} prompts", items.len(), prompts.len());
        }
        Ok(items.into_iter().map(|r| r.text.trim().to_string()).collect())
    }
}

#[async_trait]
impl TextGenerator for LocalGenerator {
    fn name(&self) -> &str {
        self.base_url.as_str()
    }

    async fn generate(&self, prompts: Vec<ChatPrompt>) -> anyhow::Result<Vec<GenerationOutcome>> {
        if prompts.is_empty() {
            return Ok(Vec::new());
        }
        match self.generate_batch(&prompts).await {
            Ok(texts) => Ok(texts.into_iter().map(GenerationOutcome::Completed).collect()),
            Err(e) => {
                tracing::error!(error = %e, n = prompts.len(), "Batched generation failed");
                let reason = e.to_string();
                Ok(prompts.iter().map(|_| GenerationOutcome::failed(reason.clone())).collect())
            }
        }
    }
}

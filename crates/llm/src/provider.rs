//! Provider selection and construction.

use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::generator::TextGenerator;
use crate::local::{ChatTemplate, LocalGenerator};
use crate::remote::OpenAiGenerator;
use crate::types::GenerateParams;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Local,
    OpenAi,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Unknown LLM provider '{0}' (expected 'local' or 'openai')")]
    Unknown(String),
    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,
}

impl FromStr for Provider {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Provider::Local),
            "openai" => Ok(Provider::OpenAi),
            _ => Err(ProviderError::Unknown(s.to_string())),
        }
    }
}

/// Credentials read from the environment.
#[derive(Debug, Clone, Default)]
pub struct ProviderEnv {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl ProviderEnv {
    /// `OPENAI_API_KEY` and `OPENAI_BASE_URL`.
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            api_key: non_empty("OPENAI_API_KEY"),
            base_url: non_empty("OPENAI_BASE_URL"),
        }
    }
}

/// `[llm]` section of the run configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default)]
    pub chat_template: ChatTemplate,
    #[serde(default)]
    pub generate: GenerateParams,
}

fn default_server_url() -> String {
    "http://localhost:30000".to_string()
}

impl LlmConfig {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            server_url: default_server_url(),
            chat_template: ChatTemplate::default(),
            generate: GenerateParams::default(),
        }
    }

    pub fn provider(&self) -> Result<Provider, ProviderError> {
        self.provider.parse()
    }

    /// Build the generator using credentials from the process environment.
    /// A local server is health-checked before it is returned.
    pub async fn build_generator(&self) -> anyhow::Result<Arc<dyn TextGenerator>> {
        if self.provider()? == Provider::Local {
            let local = LocalGenerator::new(&self.server_url, self.chat_template, self.generate.clone())?;
            local.health_check().await?;
            return Ok(Arc::new(local));
        }
        self.build_generator_with(&ProviderEnv::from_env())
    }

    /// Build the generator without any network access.
    pub fn build_generator_with(&self, env: &ProviderEnv) -> anyhow::Result<Arc<dyn TextGenerator>> {
        match self.provider()? {
            Provider::Local => {
                tracing::info!(model = %self.model, url = %self.server_url, "Using local generation server");
                Ok(Arc::new(LocalGenerator::new(
                    &self.server_url,
                    self.chat_template,
                    self.generate.clone(),
                )?))
            }
            Provider::OpenAi => {
                let api_key = env.api_key.clone().ok_or(ProviderError::MissingApiKey)?;
                let base_url = env.base_url.as_deref().unwrap_or(DEFAULT_OPENAI_BASE_URL);
                tracing::info!(model = %self.model, url = %base_url, "Using OpenAI-compatible API");
                Ok(Arc::new(OpenAiGenerator::new(
                    base_url,
                    api_key,
                    &self.model,
                    self.generate.clone(),
                )?))
            }
        }
    }
}

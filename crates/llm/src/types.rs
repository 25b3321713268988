use std::time::Duration;

use lamp::Task;
use serde::{Deserialize, Serialize};

/// One chat turn in OpenAI message format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A system instruction plus the user message built from retrieved profiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
}

impl ChatPrompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }

    /// Prompt with the task's standard system instruction.
    pub fn for_task(task: Task, user: impl Into<String>) -> Self {
        Self::new(task.system_prompt(), user)
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![ChatMessage::system(&self.system), ChatMessage::user(&self.user)]
    }
}

/// Sampling and transport settings shared by both providers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenerateParams {
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,
    /// Omitted from requests when unset so the provider default applies.
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    /// Per-request timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Attempts per request (local) or sweeps over outstanding prompts (remote).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Delay before the second attempt; doubles for each further attempt.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
}

fn default_max_new_tokens() -> usize {
    256
}
fn default_request_timeout_secs() -> u64 {
    120
}
fn default_max_attempts() -> usize {
    5
}
fn default_base_backoff_ms() -> u64 {
    500
}

impl Default for GenerateParams {
    fn default() -> Self {
        Self {
            max_new_tokens: default_max_new_tokens(),
            temperature: None,
            top_p: None,
            request_timeout_secs: default_request_timeout_secs(),
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
        }
    }
}

impl GenerateParams {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Delay before retry number `retry` (0-based): `base * 2^retry`.
    pub fn backoff(&self, retry: usize) -> Duration {
        let factor = 1u64.checked_shl(retry.min(16) as u32).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_backoff_ms.saturating_mul(factor))
    }
}

/// Terminal result for one prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Completed(String),
    Failed { reason: String },
}

impl GenerationOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        GenerationOutcome::Failed {
            reason: reason.into(),
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            GenerationOutcome::Completed(text) => Some(text),
            GenerationOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, GenerationOutcome::Failed { .. })
    }

    /// Generated text, or an empty prediction for a failed item.
    pub fn into_text_or_empty(self) -> String {
        match self {
            GenerationOutcome::Completed(text) => text,
            GenerationOutcome::Failed { .. } => String::new(),
        }
    }
}

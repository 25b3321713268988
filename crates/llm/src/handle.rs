//! Cloneable handle over a [`TextGenerator`].

use std::sync::Arc;

use crate::generator::TextGenerator;
use crate::types::{ChatPrompt, GenerationOutcome};

/// Shared generation backend with async and blocking entry points.
#[derive(Clone)]
pub struct GenerationHandle(Arc<dyn TextGenerator>);

impl GenerationHandle {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self(generator)
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub async fn generate(&self, prompts: Vec<ChatPrompt>) -> anyhow::Result<Vec<GenerationOutcome>> {
        let n = prompts.len();
        let outcomes = self.0.generate(prompts).await?;
        if outcomes.len() != n {
            anyhow::bail!("Generator '{}' returned {} outcomes for {n} prompts", self.name(), outcomes.len());
        }
        Ok(outcomes)
    }

    /// Blocking variant for sync callers inside a multi-threaded tokio runtime.
    pub fn generate_blocking(&self, prompts: Vec<ChatPrompt>) -> anyhow::Result<Vec<GenerationOutcome>> {
        tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(self.generate(prompts)))
    }
}

use async_trait::async_trait;

use crate::types::{ChatPrompt, GenerationOutcome};

/// A backend that turns chat prompts into completions.
///
/// Implementations return exactly one outcome per prompt, in input order.
/// `Err` is reserved for failures that make the whole call meaningless
/// (misconfiguration); per-prompt failures are reported as
/// [`GenerationOutcome::Failed`].
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Model identifier, for logging.
    fn name(&self) -> &str;

    async fn generate(&self, prompts: Vec<ChatPrompt>) -> anyhow::Result<Vec<GenerationOutcome>>;
}

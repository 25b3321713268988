//! Text generation backends for personalized prompts.
//!
//! Two providers implement [`TextGenerator`]:
//!
//! - [`LocalGenerator`]: an SGLang server, all prompts in one batched `/generate` call
//! - [`OpenAiGenerator`]: an OpenAI-compatible chat-completions API, one request per
//!   prompt, retried in bounded sweeps over the prompts still unanswered
//!
//! Both return one [`GenerationOutcome`] per prompt in input order. A prompt
//! that never succeeds is reported as [`GenerationOutcome::Failed`] instead of
//! blocking the batch.

pub mod generator;
pub mod handle;
mod http;
pub mod local;
pub mod mocks;
pub mod provider;
pub mod remote;
pub mod types;

pub use generator::TextGenerator;
pub use handle::GenerationHandle;
pub use local::{ChatTemplate, LocalGenerator};
pub use provider::{LlmConfig, Provider, ProviderEnv, ProviderError};
pub use remote::OpenAiGenerator;
pub use types::{ChatMessage, ChatPrompt, GenerateParams, GenerationOutcome};

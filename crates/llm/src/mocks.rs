//! In-process generators for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::generator::TextGenerator;
use crate::types::{ChatPrompt, GenerationOutcome};

type BatchFn = dyn Fn(&[ChatPrompt]) -> Vec<GenerationOutcome> + Send + Sync;

/// Generator that answers from a closure and records what it was asked.
pub struct MockGenerator {
    respond: Box<BatchFn>,
    calls: AtomicUsize,
    seen: Mutex<Vec<ChatPrompt>>,
}

impl MockGenerator {
    /// Per-prompt responder.
    pub fn with_fn(f: impl Fn(&ChatPrompt) -> GenerationOutcome + Send + Sync + 'static) -> Self {
        Self::with_batch_fn(move |prompts| prompts.iter().map(&f).collect())
    }

    /// Whole-batch responder; may return the wrong count on purpose.
    pub fn with_batch_fn(f: impl Fn(&[ChatPrompt]) -> Vec<GenerationOutcome> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(f),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn constant(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::with_fn(move |_| GenerationOutcome::Completed(text.clone()))
    }

    /// Answers with the user message.
    pub fn echo() -> Self {
        Self::with_fn(|p| GenerationOutcome::Completed(p.user.clone()))
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every prompt received, in order.
    pub fn seen(&self) -> Vec<ChatPrompt> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, prompts: Vec<ChatPrompt>) -> anyhow::Result<Vec<GenerationOutcome>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.extend(prompts.iter().cloned());
        }
        Ok((self.respond)(&prompts))
    }
}

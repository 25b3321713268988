//! Tokenization into [`TokenizedBatch`]es.

use std::path::Path;
use std::sync::Mutex;

use lamp::TokenCounter;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

use crate::batch::TokenizedBatch;

/// Turns texts into a padded token batch, truncating each to `max_length` tokens.
pub trait BatchTokenizer: Send + Sync {
    fn tokenize(&self, texts: &[String], max_length: usize) -> anyhow::Result<TokenizedBatch>;
}

/// HuggingFace `tokenizer.json` tokenizer with longest-in-batch padding.
///
/// Truncation length varies per call (queries and documents use different
/// limits), so the tokenizer sits behind a mutex and is reconfigured per batch.
pub struct HfTokenizer {
    inner: Mutex<Tokenizer>,
}

impl HfTokenizer {
    /// Load from a `tokenizer.json` file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let mut tokenizer = Tokenizer::from_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer {}: {e}", path.display()))?;

        let (pad_id, pad_token) = match tokenizer.get_padding() {
            Some(p) => (p.pad_id, p.pad_token.clone()),
            None => {
                let token = "[PAD]".to_string();
                (tokenizer.token_to_id(&token).unwrap_or(0), token)
            }
        };
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            pad_id,
            pad_token,
            ..Default::default()
        }));

        tracing::debug!(path = %path.display(), pad_id, "Loaded tokenizer");
        Ok(Self {
            inner: Mutex::new(tokenizer),
        })
    }
}

impl BatchTokenizer for HfTokenizer {
    fn tokenize(&self, texts: &[String], max_length: usize) -> anyhow::Result<TokenizedBatch> {
        if texts.is_empty() {
            return Ok(TokenizedBatch::default());
        }
        let mut tokenizer = self
            .inner
            .lock()
            .map_err(|e| anyhow::anyhow!("Tokenizer lock poisoned: {e}"))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("Invalid truncation length {max_length}: {e}"))?;

        let encodings = tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {e}"))?;

        TokenizedBatch::from_rows(
            encodings.iter().map(|e| e.get_ids().to_vec()).collect(),
            encodings.iter().map(|e| e.get_attention_mask().to_vec()).collect(),
            encodings.iter().map(|e| e.get_type_ids().to_vec()).collect(),
        )
    }
}

impl TokenCounter for HfTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        let counted = self
            .inner
            .lock()
            .ok()
            .and_then(|t| t.encode(text, false).ok().map(|e| e.get_ids().len()));
        counted.unwrap_or_else(|| text.split_whitespace().count())
    }
}

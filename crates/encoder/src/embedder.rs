//! Sentence embeddings from a frozen encoder via masked mean pooling.

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};

use crate::batch::TokenizedBatch;
use crate::resolve::ModelFiles;
use crate::tokenizer::BatchTokenizer;

/// Maps tokenized text to one dense vector per row.
///
/// Implementations are frozen: `embed` never mutates model state.
pub trait SentenceEmbedder: Send + Sync {
    /// Identifier the encoder was resolved from (persisted with the scorer).
    fn model_id(&self) -> &str;
    /// Embedding dimension.
    fn hidden_size(&self) -> usize;
    /// One embedding of length `hidden_size()` per row of `batch`, in row order.
    fn embed(&self, batch: &TokenizedBatch) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Tokenize `texts` and embed them in a single pass.
pub fn embed_texts(
    tokenizer: &dyn BatchTokenizer,
    embedder: &dyn SentenceEmbedder,
    texts: &[String],
    max_length: usize,
) -> anyhow::Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let batch = tokenizer.tokenize(texts, max_length)?;
    embedder.embed(&batch)
}

/// Mean of token vectors over unmasked positions.
///
/// `hidden`: `(batch, seq, dim)`, `mask`: `(batch, seq)` of 0/1.
/// Returns `(batch, dim)`. The divisor is clamped so an all-masked row
/// yields zeros instead of NaN.
pub fn masked_mean_pool(hidden: &Tensor, mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = mask
        .to_dtype(hidden.dtype())?
        .unsqueeze(2)?
        .broadcast_as(hidden.shape())?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
    summed.broadcast_div(&counts)
}

/// BERT-family encoder running on candle.
pub struct CandleEmbedder {
    model_id: String,
    model: BertModel,
    hidden_size: usize,
    device: Device,
}

impl CandleEmbedder {
    /// Load weights and config from resolved model files.
    pub fn load(model_id: &str, files: &ModelFiles, device: &Device) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(&files.config)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", files.config.display()))?;
        let config: BertConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", files.config.display()))?;

        // SAFETY: the weights file is not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[&files.weights], DTYPE, device)? };
        let model = BertModel::load(vb, &config)
            .map_err(|e| anyhow::anyhow!("Failed to load encoder '{model_id}': {e}"))?;

        tracing::info!(
            model = model_id,
            hidden_size = config.hidden_size,
            "Loaded frozen encoder"
        );
        Ok(Self {
            model_id: model_id.to_string(),
            model,
            hidden_size: config.hidden_size,
            device: device.clone(),
        })
    }
}

impl SentenceEmbedder for CandleEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    fn embed(&self, batch: &TokenizedBatch) -> anyhow::Result<Vec<Vec<f32>>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        batch.ensure_non_empty_rows()?;

        let shape = (batch.len(), batch.seq_len());
        let input_ids = Tensor::from_vec(batch.input_ids.clone(), shape, &self.device)?;
        let token_type_ids = Tensor::from_vec(batch.token_type_ids.clone(), shape, &self.device)?;
        let attention_mask = Tensor::from_vec(batch.attention_mask.clone(), shape, &self.device)?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_pool(&hidden, &attention_mask)?;
        Ok(pooled.to_dtype(DType::F32)?.to_vec2::<f32>()?)
    }
}

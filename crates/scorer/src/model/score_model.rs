//! Frozen encoder plus trainable head, and its on-disk format.
//!
//! A saved model is a directory holding `config.json` (encoder identifier and
//! head hyperparameters) and `model.mpk` (head weights only). The encoder is
//! resolved again from its identifier on load.

use std::path::Path;
use std::sync::Arc;

use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::AutodiffBackend;
use encoder::SentenceEmbedder;

use crate::collator::CollatedBatch;
use crate::model::bridge::{embeddings_to_tensor, scatter_embeddings, tensor_to_rows};
use crate::model::score_head::{ScoreHead, ScoreHeadConfig};

const CONFIG_FILE: &str = "config.json";
const WEIGHTS_STEM: &str = "model";

#[derive(Debug, thiserror::Error)]
pub enum ScoreModelError {
    #[error("Failed to resolve encoder '{id}': {reason}")]
    EncoderResolution { id: String, reason: String },
    #[error("Hidden size {hidden} is not divisible by {heads} attention heads")]
    InvalidHeads { hidden: usize, heads: usize },
    #[error("Expected {expected} document embeddings for the mask, got {got}")]
    DocumentCountMismatch { expected: usize, got: usize },
    #[error("Expected {expected} query embeddings, got {got}")]
    QueryCountMismatch { expected: usize, got: usize },
    #[error("Failed to {action} {path}: {reason}")]
    Persistence {
        action: &'static str,
        path: String,
        reason: String,
    },
}

/// Hyperparameters persisted next to the head weights.
#[derive(Config, Debug, PartialEq)]
pub struct ScoreModelRecord {
    /// Identifier the frozen encoder is resolved from.
    pub encoder_model: String,
    #[config(default = 8)]
    pub num_heads: usize,
    #[config(default = 256)]
    pub decoder_hidden_size: usize,
}

/// Scores candidate slots of a [`CollatedBatch`].
///
/// Holds a shared, never-mutated encoder and the trainable [`ScoreHead`].
/// Embeddings are recomputed on every forward pass.
pub struct ScoreModel<B: Backend> {
    head: ScoreHead<B>,
    embedder: Arc<dyn SentenceEmbedder>,
    record: ScoreModelRecord,
    device: B::Device,
}

impl<B: Backend> ScoreModel<B> {
    /// Fresh head sized to the embedder.
    pub fn new(
        record: ScoreModelRecord,
        embedder: Arc<dyn SentenceEmbedder>,
        device: &B::Device,
    ) -> Result<Self, ScoreModelError> {
        let hidden = embedder.hidden_size();
        if record.num_heads == 0 || hidden % record.num_heads != 0 {
            return Err(ScoreModelError::InvalidHeads {
                hidden,
                heads: record.num_heads,
            });
        }
        if embedder.model_id() != record.encoder_model {
            tracing::warn!(
                configured = record.encoder_model,
                loaded = embedder.model_id(),
                "Encoder identifier differs from the model record"
            );
        }
        let head = ScoreHeadConfig::new(hidden)
            .with_num_heads(record.num_heads)
            .with_decoder_hidden_size(record.decoder_hidden_size)
            .init(device);
        tracing::info!(
            encoder = record.encoder_model,
            hidden,
            num_heads = record.num_heads,
            decoder_hidden_size = record.decoder_hidden_size,
            params = head.num_params(),
            "Initialized score model"
        );
        Ok(Self {
            head,
            embedder,
            record,
            device: device.clone(),
        })
    }

    /// Rebuild a saved model. `resolve` loads the frozen encoder named in
    /// `config.json`.
    pub fn from_pretrained(
        dir: &Path,
        resolve: &dyn Fn(&str) -> anyhow::Result<Arc<dyn SentenceEmbedder>>,
        device: &B::Device,
    ) -> anyhow::Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        let record = ScoreModelRecord::load(&config_path).map_err(|e| ScoreModelError::Persistence {
            action: "read",
            path: config_path.display().to_string(),
            reason: e.to_string(),
        })?;
        let embedder = resolve(&record.encoder_model).map_err(|e| ScoreModelError::EncoderResolution {
            id: record.encoder_model.clone(),
            reason: e.to_string(),
        })?;
        let model = Self::new(record, embedder, device)?;
        model.load_head_weights(&dir.join(WEIGHTS_STEM))
    }

    /// Replace the head's parameters with those saved at `path`
    /// (`.mpk` extension optional).
    pub fn load_head_weights(mut self, path: &Path) -> anyhow::Result<Self> {
        self.head = self
            .head
            .load_file(path, &NamedMpkFileRecorder::<FullPrecisionSettings>::new(), &self.device)
            .map_err(|e| ScoreModelError::Persistence {
                action: "load weights from",
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        tracing::info!(path = %path.display(), "Loaded score head weights");
        Ok(self)
    }

    /// Write `config.json` and the head weights into `dir`.
    pub fn save_pretrained(&self, dir: &Path) -> anyhow::Result<()> {
        std::fs::create_dir_all(dir)?;
        let config_path = dir.join(CONFIG_FILE);
        self.record.save(&config_path).map_err(|e| ScoreModelError::Persistence {
            action: "write",
            path: config_path.display().to_string(),
            reason: e.to_string(),
        })?;
        let weights_path = dir.join(WEIGHTS_STEM);
        self.head
            .clone()
            .save_file(&weights_path, &NamedMpkFileRecorder::<FullPrecisionSettings>::new())
            .map_err(|e| ScoreModelError::Persistence {
                action: "save weights to",
                path: weights_path.display().to_string(),
                reason: e.to_string(),
            })?;
        tracing::info!(dir = %dir.display(), "Saved score model");
        Ok(())
    }

    /// Likelihoods `(batch, slots)` for a collated batch, 0 at padded slots.
    pub fn forward(&self, batch: &CollatedBatch) -> anyhow::Result<Tensor<B, 2>> {
        let hidden = self.embedder.hidden_size();

        let queries = self.embedder.embed(&batch.query)?;
        if queries.len() != batch.mask.batch() {
            return Err(ScoreModelError::QueryCountMismatch {
                expected: batch.mask.batch(),
                got: queries.len(),
            }
            .into());
        }

        let mut documents = Vec::with_capacity(batch.mask.total_true());
        for chunk in &batch.documents {
            documents.extend(self.embedder.embed(chunk)?);
        }
        if documents.len() != batch.mask.total_true() {
            return Err(ScoreModelError::DocumentCountMismatch {
                expected: batch.mask.total_true(),
                got: documents.len(),
            }
            .into());
        }

        let query = embeddings_to_tensor::<B>(&queries, hidden, &self.device)?;
        let docs = scatter_embeddings::<B>(&documents, &batch.mask, hidden, &self.device)?;
        let mask = batch.mask.to_tensor::<B>(&self.device);
        Ok(self.head.forward(query, docs, mask))
    }

    /// [`forward`](Self::forward) read back to host rows.
    pub fn likelihoods(&self, batch: &CollatedBatch) -> anyhow::Result<Vec<Vec<f32>>> {
        let scores = self.forward(batch)?;
        let [rows, slots] = scores.dims();
        if slots == 0 {
            return Ok(vec![Vec::new(); rows]);
        }
        tensor_to_rows(scores)
    }

    /// Apply an optimizer-style update to the head.
    pub fn map_head(mut self, update: impl FnOnce(ScoreHead<B>) -> ScoreHead<B>) -> Self {
        self.head = update(self.head);
        self
    }

    pub fn head(&self) -> &ScoreHead<B> {
        &self.head
    }

    pub fn record(&self) -> &ScoreModelRecord {
        &self.record
    }

    pub fn embedder(&self) -> &Arc<dyn SentenceEmbedder> {
        &self.embedder
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn num_params(&self) -> usize {
        self.head.num_params()
    }
}

impl<B: AutodiffBackend> ScoreModel<B> {
    /// Gradient-free copy of the model for evaluation.
    pub fn valid(&self) -> ScoreModel<B::InnerBackend> {
        ScoreModel {
            head: self.head.valid(),
            embedder: Arc::clone(&self.embedder),
            record: self.record.clone(),
            device: self.device.clone(),
        }
    }
}

//! Frozen sentence encoder used by the scorer and the dense retriever.
//!
//! Text is tokenized into a padded [`TokenizedBatch`], run through a frozen
//! BERT-family model, and mean-pooled over unmasked tokens into one vector
//! per text. The encoder is never trained or saved by this workspace.
//!
//! # Key types
//!
//! - [`BatchTokenizer`] / [`HfTokenizer`]: text → padded token ids
//! - [`SentenceEmbedder`] / [`CandleEmbedder`]: token ids → pooled embeddings
//! - [`ModelResolver`]: encoder identifier → files on disk
//! - [`mocks`]: deterministic tokenizer and embedder for tests

pub mod batch;
pub mod device;
pub mod embedder;
pub mod mocks;
pub mod resolve;
pub mod tokenizer;

pub use batch::TokenizedBatch;
pub use device::DeviceConfig;
pub use embedder::{embed_texts, masked_mean_pool, CandleEmbedder, SentenceEmbedder};
pub use resolve::{ModelFiles, ModelResolver, ResolveError};
pub use tokenizer::{BatchTokenizer, HfTokenizer};

//! Candidate scorer: a trainable attention head over frozen sentence embeddings.
//!
//! A [`Collator`] turns a batch of [`lamp::CandidateExample`]s into token
//! batches plus a [`ProfileMask`]. [`ScoreModel::forward`] embeds them with
//! the frozen encoder, scatters document embeddings into a dense
//! `(batch, slot, hidden)` tensor and runs the [`ScoreHead`], which returns
//! one selection likelihood in `[0, 1]` per slot. Padded slots are exactly 0.
//!
//! Only the head is trained and persisted; the encoder is loaded separately
//! from its own pretrained source.

pub mod collator;
pub mod mask;
pub mod model;

pub use collator::{CollatedBatch, Collator, CollatorConfig, DOCUMENT_CHUNK_SIZE};
pub use mask::ProfileMask;
pub use model::bridge::{embeddings_to_tensor, scatter_embeddings, tensor_to_rows};
pub use model::score_head::{ScoreHead, ScoreHeadConfig};
pub use model::score_model::{ScoreModel, ScoreModelError, ScoreModelRecord};

//! Score model components: the trainable head, the embedding bridge between
//! the candle encoder and burn, and the full model with persistence.

pub mod bridge;
pub mod score_head;
pub mod score_model;

//! Integration tests for the encoder crate using the deterministic mocks.
//!
//! The candle BERT path needs real weights and is exercised by the
//! `bandit-pr` binary; here we cover the tokenizer/embedder contracts that
//! the scorer and the dense retriever rely on.

use encoder::mocks::{HashEmbedder, WhitespaceTokenizer};
use encoder::{embed_texts, BatchTokenizer, SentenceEmbedder};

#[test]
fn test_embed_texts_one_vector_per_text_in_order() {
    let tok = WhitespaceTokenizer::default();
    let emb = HashEmbedder::new("mock-encoder", 16);
    let texts: Vec<String> = ["alpha", "beta gamma", ""].iter().map(|s| s.to_string()).collect();

    let vectors = embed_texts(&tok, &emb, &texts, 32).unwrap();
    assert_eq!(vectors.len(), 3);
    assert!(vectors.iter().all(|v| v.len() == emb.hidden_size()));

    // Same text embedded alone yields the same vector.
    let single = embed_texts(&tok, &emb, &texts[1..2], 32).unwrap();
    for (a, b) in single[0].iter().zip(&vectors[1]) {
        assert!((a - b).abs() < 1e-6);
    }
}

#[test]
fn test_embed_texts_empty_input() {
    let tok = WhitespaceTokenizer::default();
    let emb = HashEmbedder::new("mock-encoder", 4);
    assert!(embed_texts(&tok, &emb, &[], 8).unwrap().is_empty());
}

#[test]
fn test_truncation_changes_embedding() {
    let tok = WhitespaceTokenizer::default();
    let emb = HashEmbedder::new("mock-encoder", 8);
    let text = vec!["one two three four five".to_string()];
    let full = emb.embed(&tok.tokenize(&text, 64).unwrap()).unwrap();
    let cut = emb.embed(&tok.tokenize(&text, 2).unwrap()).unwrap();
    assert_ne!(full[0], cut[0]);
}

#[test]
fn test_embedders_are_shareable_trait_objects() {
    fn assert_send_sync<T: Send + Sync + ?Sized>() {}
    assert_send_sync::<dyn SentenceEmbedder>();
    assert_send_sync::<dyn BatchTokenizer>();
}

//! Dual-encoder retrieval: dot product between the query embedding and each
//! document embedding from the same frozen encoder.

use std::sync::Arc;

use encoder::{embed_texts, BatchTokenizer, SentenceEmbedder};

use crate::bm25::top_indices;

/// Documents embedded per encoder call.
pub const DENSE_CHUNK_SIZE: usize = 4;

/// Token limit applied to queries and documents.
const DEFAULT_MAX_LENGTH: usize = 512;

#[derive(Clone)]
pub struct DenseRetriever {
    tokenizer: Arc<dyn BatchTokenizer>,
    embedder: Arc<dyn SentenceEmbedder>,
    max_length: usize,
}

impl DenseRetriever {
    pub fn new(tokenizer: Arc<dyn BatchTokenizer>, embedder: Arc<dyn SentenceEmbedder>) -> Self {
        Self {
            tokenizer,
            embedder,
            max_length: DEFAULT_MAX_LENGTH,
        }
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn model_id(&self) -> &str {
        self.embedder.model_id()
    }

    /// Similarity of `query` to every document, in corpus order.
    pub fn scores(&self, query: &str, corpus: &[String]) -> anyhow::Result<Vec<f32>> {
        if corpus.is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = embed_texts(
            self.tokenizer.as_ref(),
            self.embedder.as_ref(),
            &[query.to_string()],
            self.max_length,
        )?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Encoder returned no query embedding"))?;

        let mut scores = Vec::with_capacity(corpus.len());
        for chunk in corpus.chunks(DENSE_CHUNK_SIZE) {
            let doc_vecs = embed_texts(
                self.tokenizer.as_ref(),
                self.embedder.as_ref(),
                chunk,
                self.max_length,
            )?;
            if doc_vecs.len() != chunk.len() {
                anyhow::bail!(
                    "Encoder returned {} embeddings for {} documents",
                    doc_vecs.len(),
                    chunk.len()
                );
            }
            scores.extend(doc_vecs.iter().map(|d| dot(&query_vec, d)));
        }
        Ok(scores)
    }

    /// Indices of the `k` most similar documents, best first.
    pub fn top_k(&self, query: &str, corpus: &[String], k: usize) -> anyhow::Result<Vec<usize>> {
        let scores = self.scores(query, corpus)?;
        Ok(top_indices(&scores, k))
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoder::mocks::{HashEmbedder, WhitespaceTokenizer};

    fn retriever() -> DenseRetriever {
        retriever_with_dim(32)
    }

    fn retriever_with_dim(dim: usize) -> DenseRetriever {
        DenseRetriever::new(
            Arc::new(WhitespaceTokenizer::default()),
            Arc::new(HashEmbedder::new("mock-encoder", dim)),
        )
    }

    fn docs(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("document number {i} about topic {}", i % 3)).collect()
    }

    #[test]
    fn test_scores_cover_every_document_across_chunks() {
        let r = retriever();
        let corpus = docs(DENSE_CHUNK_SIZE * 2 + 1);
        let scores = r.scores("topic 1", &corpus).unwrap();
        assert_eq!(scores.len(), corpus.len());
    }

    #[test]
    fn test_chunking_does_not_change_scores() {
        let r = retriever();
        let corpus = docs(7);
        let all = r.scores("document about topic", &corpus).unwrap();
        for (i, doc) in corpus.iter().enumerate() {
            let single = r.scores("document about topic", std::slice::from_ref(doc)).unwrap();
            assert!((single[0] - all[i]).abs() < 1e-5);
        }
    }

    #[test]
    fn test_identical_document_scores_highest() {
        let r = retriever_with_dim(256);
        let corpus = vec![
            "completely unrelated words".to_string(),
            "the exact query text".to_string(),
            "something else entirely".to_string(),
        ];
        let scores = r.scores("the exact query text", &corpus).unwrap();
        let top = top_indices(&scores, 1);
        assert_eq!(top, vec![1]);
    }

    #[test]
    fn test_top_k_larger_than_corpus() {
        let r = retriever();
        let corpus = docs(3);
        assert_eq!(r.top_k("q", &corpus, 10).unwrap().len(), 3);
        assert!(r.top_k("q", &[], 10).unwrap().is_empty());
    }

    #[test]
    fn test_model_id_passthrough() {
        assert_eq!(retriever().model_id(), "mock-encoder");
    }
}

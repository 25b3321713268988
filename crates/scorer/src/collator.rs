//! Batching of variable-size candidate sets into fixed-rank token batches.

use std::sync::Arc;

use encoder::{BatchTokenizer, TokenizedBatch};
use lamp::{CandidateExample, Profile};
use serde::Deserialize;

use crate::mask::ProfileMask;

/// Documents tokenized per chunk.
pub const DOCUMENT_CHUNK_SIZE: usize = 100;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CollatorConfig {
    /// Cap on candidates per example; 0 keeps every candidate.
    #[serde(default)]
    pub max_n_profiles: usize,
    #[serde(default = "default_max_query_length")]
    pub max_query_length: usize,
    #[serde(default = "default_max_document_length")]
    pub max_document_length: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_max_query_length() -> usize {
    512
}
fn default_max_document_length() -> usize {
    512
}
fn default_chunk_size() -> usize {
    DOCUMENT_CHUNK_SIZE
}

impl Default for CollatorConfig {
    fn default() -> Self {
        Self {
            max_n_profiles: 0,
            max_query_length: default_max_query_length(),
            max_document_length: default_max_document_length(),
            chunk_size: default_chunk_size(),
        }
    }
}

/// One collated batch.
///
/// `corpora` rows are padded with `""` up to the ceiling; `profiles` rows are
/// truncated alongside but never padded, so `profiles[b][p]` is the profile
/// behind slot `(b, p)` whenever that slot is valid.
#[derive(Debug, Clone)]
pub struct CollatedBatch {
    pub ids: Vec<String>,
    pub sources: Vec<String>,
    pub profiles: Vec<Vec<Profile>>,
    pub corpora: Vec<Vec<String>>,
    pub targets: Vec<String>,
    pub query: TokenizedBatch,
    /// Tokenized valid documents in [`ProfileMask::valid_slots`] order.
    pub documents: Vec<TokenizedBatch>,
    pub mask: ProfileMask,
}

impl CollatedBatch {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn num_documents(&self) -> usize {
        self.documents.iter().map(TokenizedBatch::len).sum()
    }
}

pub struct Collator {
    tokenizer: Arc<dyn BatchTokenizer>,
    config: CollatorConfig,
}

impl Collator {
    pub fn new(tokenizer: Arc<dyn BatchTokenizer>, config: CollatorConfig) -> Self {
        Self { tokenizer, config }
    }

    pub fn config(&self) -> &CollatorConfig {
        &self.config
    }

    /// Candidate slots per row for a batch: the longest corpus, capped by
    /// `max_n_profiles` when that is non-zero.
    pub fn ceiling(&self, examples: &[CandidateExample]) -> usize {
        let longest = examples.iter().map(|e| e.corpus.len()).max().unwrap_or(0);
        if self.config.max_n_profiles > 0 {
            longest.min(self.config.max_n_profiles)
        } else {
            longest
        }
    }

    pub fn collate(&self, examples: Vec<CandidateExample>) -> anyhow::Result<CollatedBatch> {
        if examples.is_empty() {
            anyhow::bail!("Cannot collate an empty batch");
        }
        let ceiling = self.ceiling(&examples);

        let mut ids = Vec::with_capacity(examples.len());
        let mut sources = Vec::with_capacity(examples.len());
        let mut queries = Vec::with_capacity(examples.len());
        let mut profiles = Vec::with_capacity(examples.len());
        let mut corpora = Vec::with_capacity(examples.len());
        let mut targets = Vec::with_capacity(examples.len());
        let mut lengths = Vec::with_capacity(examples.len());

        for example in examples {
            let CandidateExample {
                id,
                source,
                query,
                mut corpus,
                profiles: mut row_profiles,
                target,
            } = example;

            if corpus.len() != row_profiles.len() {
                anyhow::bail!(
                    "Example '{id}' has {} documents but {} profiles",
                    corpus.len(),
                    row_profiles.len()
                );
            }
            if corpus.len() > ceiling {
                tracing::debug!(id, kept = ceiling, dropped = corpus.len() - ceiling, "Truncating corpus");
                corpus.truncate(ceiling);
                row_profiles.truncate(ceiling);
            }
            lengths.push(corpus.len());
            corpus.resize(ceiling, String::new());

            ids.push(id);
            sources.push(source);
            queries.push(query);
            profiles.push(row_profiles);
            corpora.push(corpus);
            targets.push(target);
        }

        let mask = ProfileMask::from_lengths(&lengths, ceiling);
        let query = self.tokenizer.tokenize(&queries, self.config.max_query_length)?;

        let valid_documents: Vec<String> = mask
            .valid_slots()
            .into_iter()
            .map(|(b, p)| corpora[b][p].clone())
            .collect();
        let documents = valid_documents
            .chunks(self.config.chunk_size.max(1))
            .map(|chunk| self.tokenizer.tokenize(chunk, self.config.max_document_length))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(CollatedBatch {
            ids,
            sources,
            profiles,
            corpora,
            targets,
            query,
            documents,
            mask,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoder::mocks::WhitespaceTokenizer;

    fn example(id: &str, n: usize) -> CandidateExample {
        CandidateExample {
            id: id.to_string(),
            source: format!("source {id}"),
            query: format!("query {id}"),
            corpus: (0..n).map(|i| format!("doc {id} {i}")).collect(),
            profiles: (0..n)
                .map(|i| Profile::new(format!("{id}-{i}"), &[("text", "t")]))
                .collect(),
            target: "5".to_string(),
        }
    }

    fn collator(max_n_profiles: usize, chunk_size: usize) -> Collator {
        Collator::new(
            Arc::new(WhitespaceTokenizer::default()),
            CollatorConfig {
                max_n_profiles,
                chunk_size,
                ..CollatorConfig::default()
            },
        )
    }

    #[test]
    fn test_pads_to_longest_when_uncapped() {
        let batch = collator(0, 100)
            .collate(vec![example("a", 2), example("b", 5)])
            .unwrap();
        assert_eq!(batch.mask.dims(), [2, 5]);
        assert_eq!(batch.mask.true_count_per_row(), vec![2, 5]);
        assert!(batch.corpora.iter().all(|c| c.len() == 5));
        assert_eq!(batch.corpora[0][2], "");
        assert_eq!(batch.profiles[0].len(), 2);
    }

    #[test]
    fn test_cap_truncates_corpus_and_profiles_together() {
        let batch = collator(3, 100)
            .collate(vec![example("a", 6), example("b", 1)])
            .unwrap();
        assert_eq!(batch.mask.true_count_per_row(), vec![3, 1]);
        assert_eq!(batch.corpora[0], vec!["doc a 0", "doc a 1", "doc a 2"]);
        assert_eq!(batch.profiles[0].len(), 3);
        assert_eq!(batch.profiles[0][2].id, "a-2");
    }

    #[test]
    fn test_cap_above_longest_uses_longest() {
        let c = collator(10, 100);
        assert_eq!(c.ceiling(&[example("a", 2), example("b", 4)]), 4);
    }

    #[test]
    fn test_documents_follow_valid_slot_order_across_chunks() {
        let batch = collator(0, 2)
            .collate(vec![example("a", 3), example("b", 1), example("c", 2)])
            .unwrap();
        assert_eq!(batch.num_documents(), batch.mask.total_true());
        assert_eq!(batch.documents.len(), 3);
        assert!(batch.documents.iter().all(|d| d.len() <= 2));

        let tok = WhitespaceTokenizer::default();
        let expected: Vec<String> = batch
            .mask
            .valid_slots()
            .into_iter()
            .map(|(b, p)| batch.corpora[b][p].clone())
            .collect();
        let mut offset = 0;
        for chunk in &batch.documents {
            for row in 0..chunk.len() {
                let single = tok.tokenize(&expected[offset..offset + 1], 512).unwrap();
                let n = single.ids_row(0).len();
                assert_eq!(&chunk.ids_row(row)[..n], single.ids_row(0));
                offset += 1;
            }
        }
        assert_eq!(offset, expected.len());
    }

    #[test]
    fn test_example_without_candidates() {
        let batch = collator(0, 100)
            .collate(vec![example("a", 0), example("b", 2)])
            .unwrap();
        assert_eq!(batch.mask.row(0), &[false, false]);
        assert_eq!(batch.num_documents(), 2);
        assert_eq!(batch.query.len(), 2);
    }

    #[test]
    fn test_all_examples_without_candidates() {
        let batch = collator(0, 100)
            .collate(vec![example("a", 0)])
            .unwrap();
        assert_eq!(batch.mask.dims(), [1, 0]);
        assert!(batch.documents.is_empty());
    }

    #[test]
    fn test_misaligned_example_rejected() {
        let mut bad = example("a", 2);
        bad.profiles.pop();
        assert!(collator(0, 100).collate(vec![bad]).is_err());
    }

    #[test]
    fn test_empty_batch_rejected() {
        assert!(collator(0, 100).collate(Vec::new()).is_err());
    }
}

//! Strategy selection and the shared retrieval contract.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use encoder::{BatchTokenizer, SentenceEmbedder};
use lamp::{Profile, QueryCorpusBuilder};
use rand::rngs::StdRng;
use rand::Rng;

use crate::bm25::{self, Bm25Okapi};
use crate::dense::DenseRetriever;

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("Unknown retrieval strategy '{0}' (expected random, bm25, dense or contriever)")]
    UnknownStrategy(String),
    #[error("Dense retrieval needs an encoder but none was provided")]
    MissingEmbedder,
}

/// Identifier of a retrieval strategy, as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetrieverKind {
    Random,
    Bm25,
    Dense,
}

impl RetrieverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrieverKind::Random => "random",
            RetrieverKind::Bm25 => "bm25",
            RetrieverKind::Dense => "dense",
        }
    }
}

impl fmt::Display for RetrieverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrieverKind {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(RetrieverKind::Random),
            "bm25" => Ok(RetrieverKind::Bm25),
            "dense" | "contriever" => Ok(RetrieverKind::Dense),
            _ => Err(RetrievalError::UnknownStrategy(s.to_string())),
        }
    }
}

/// A retrieval strategy resolved once from configuration.
///
/// Every variant returns at most `min(k, profiles.len())` profiles and never
/// fails because `k` is larger than the pool.
#[derive(Clone)]
pub enum Retriever {
    /// Uniform sampling with replacement. The same profile may be returned
    /// more than once even when the pool is large enough to avoid it.
    Random,
    Bm25,
    Dense(DenseRetriever),
}

impl fmt::Debug for Retriever {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Retriever::Dense(d) => write!(f, "Retriever::Dense({})", d.model_id()),
            other => write!(f, "Retriever::{:?}", other.kind()),
        }
    }
}

impl Retriever {
    /// Build a retriever. Dense retrieval takes the encoder pair; the other
    /// strategies ignore it.
    pub fn from_kind(
        kind: RetrieverKind,
        encoder: Option<(Arc<dyn BatchTokenizer>, Arc<dyn SentenceEmbedder>)>,
    ) -> Result<Self, RetrievalError> {
        match kind {
            RetrieverKind::Random => Ok(Retriever::Random),
            RetrieverKind::Bm25 => Ok(Retriever::Bm25),
            RetrieverKind::Dense => {
                let (tokenizer, embedder) = encoder.ok_or(RetrievalError::MissingEmbedder)?;
                Ok(Retriever::Dense(DenseRetriever::new(tokenizer, embedder)))
            }
        }
    }

    pub fn kind(&self) -> RetrieverKind {
        match self {
            Retriever::Random => RetrieverKind::Random,
            Retriever::Bm25 => RetrieverKind::Bm25,
            Retriever::Dense(_) => RetrieverKind::Dense,
        }
    }

    /// Select up to `k` profiles for a task input.
    ///
    /// `rng` is only consumed by [`Retriever::Random`].
    pub fn retrieve(
        &self,
        input: &str,
        profiles: &[Profile],
        k: usize,
        builder: &QueryCorpusBuilder,
        rng: &mut StdRng,
    ) -> anyhow::Result<Vec<Profile>> {
        let k = k.min(profiles.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let indices: Vec<usize> = match self {
            Retriever::Random => (0..k).map(|_| rng.gen_range(0..profiles.len())).collect(),
            Retriever::Bm25 => {
                let (query, corpus) = builder.build(input, profiles);
                let tokenized: Vec<Vec<String>> = corpus.iter().map(|d| bm25::tokenize(d)).collect();
                Bm25Okapi::new(&tokenized).top_n(&bm25::tokenize(&query), k)
            }
            Retriever::Dense(dense) => {
                let (query, corpus) = builder.build(input, profiles);
                dense.top_k(&query, &corpus, k)?
            }
        };
        Ok(indices.into_iter().map(|i| profiles[i].clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoder::mocks::{HashEmbedder, WhitespaceTokenizer};
    use lamp::Task;
    use rand::SeedableRng;

    fn pool(n: usize) -> Vec<Profile> {
        (0..n)
            .map(|i| {
                let text = format!("review text {i}");
                Profile::new(format!("p{i}"), &[("text", text.as_str()), ("score", "3")])
            })
            .collect()
    }

    fn all_retrievers() -> Vec<Retriever> {
        let encoder: (Arc<dyn BatchTokenizer>, Arc<dyn SentenceEmbedder>) = (
            Arc::new(WhitespaceTokenizer::default()),
            Arc::new(HashEmbedder::new("mock", 16)),
        );
        vec![
            Retriever::from_kind(RetrieverKind::Random, None).unwrap(),
            Retriever::from_kind(RetrieverKind::Bm25, None).unwrap(),
            Retriever::from_kind(RetrieverKind::Dense, Some(encoder)).unwrap(),
        ]
    }

    #[test]
    fn test_parse_kinds() {
        assert_eq!("random".parse::<RetrieverKind>().unwrap(), RetrieverKind::Random);
        assert_eq!("BM25".parse::<RetrieverKind>().unwrap(), RetrieverKind::Bm25);
        assert_eq!("dense".parse::<RetrieverKind>().unwrap(), RetrieverKind::Dense);
        assert_eq!("contriever".parse::<RetrieverKind>().unwrap(), RetrieverKind::Dense);
        let err = "tfidf".parse::<RetrieverKind>().unwrap_err();
        assert!(matches!(err, RetrievalError::UnknownStrategy(ref s) if s == "tfidf"));
    }

    #[test]
    fn test_dense_without_encoder_fails() {
        let err = Retriever::from_kind(RetrieverKind::Dense, None).unwrap_err();
        assert!(matches!(err, RetrievalError::MissingEmbedder));
    }

    #[test]
    fn test_k_larger_than_pool_is_capped() {
        let builder = QueryCorpusBuilder::new(Task::LaMP3);
        let profiles = pool(3);
        let mut rng = StdRng::seed_from_u64(0);
        for r in all_retrievers() {
            let got = r
                .retrieve("Rate this review: great text", &profiles, 10, &builder, &mut rng)
                .unwrap();
            assert_eq!(got.len(), 3, "{r:?}");
        }
    }

    #[test]
    fn test_empty_pool_and_zero_k() {
        let builder = QueryCorpusBuilder::new(Task::LaMP3);
        let mut rng = StdRng::seed_from_u64(0);
        for r in all_retrievers() {
            assert!(r.retrieve("x", &[], 5, &builder, &mut rng).unwrap().is_empty());
            assert!(r.retrieve("x", &pool(4), 0, &builder, &mut rng).unwrap().is_empty());
        }
    }

    #[test]
    fn test_random_is_seeded() {
        let builder = QueryCorpusBuilder::new(Task::LaMP3);
        let profiles = pool(50);
        let a = Retriever::Random
            .retrieve("q", &profiles, 10, &builder, &mut StdRng::seed_from_u64(7))
            .unwrap();
        let b = Retriever::Random
            .retrieve("q", &profiles, 10, &builder, &mut StdRng::seed_from_u64(7))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_random_samples_with_replacement() {
        let builder = QueryCorpusBuilder::new(Task::LaMP3);
        let profiles = pool(2);
        let mut rng = StdRng::seed_from_u64(3);
        // 2 draws from 2 profiles repeat about half the time.
        let saw_duplicate = (0..64).any(|_| {
            let got = Retriever::Random
                .retrieve("q", &profiles, 2, &builder, &mut rng)
                .unwrap();
            got[0] == got[1]
        });
        assert!(saw_duplicate);
    }

    #[test]
    fn test_bm25_prefers_lexical_match() {
        let builder = QueryCorpusBuilder::new(Task::LaMP3);
        let profiles = vec![
            Profile::new("a", &[("text", "terrible plot and acting")]),
            Profile::new("b", &[("text", "wonderful soundtrack wonderful cast")]),
            Profile::new("c", &[("text", "average film overall")]),
        ];
        let mut rng = StdRng::seed_from_u64(0);
        let got = Retriever::Bm25
            .retrieve("review: wonderful cast", &profiles, 1, &builder, &mut rng)
            .unwrap();
        assert_eq!(got[0].id, "b");
    }
}

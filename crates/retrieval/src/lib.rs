//! Candidate retrieval over a user's profile pool.
//!
//! Three interchangeable strategies share one contract: given a task input,
//! a profile pool and `k`, return at most `min(k, pool size)` profiles.
//!
//! - **random**: uniform sampling *with* replacement (duplicates possible)
//! - **bm25**: Okapi BM25 over whitespace tokens, best first
//! - **dense**: dot product of frozen-encoder embeddings, best first
//!
//! [`build_candidate_pools`] runs a strategy over a whole dataset to produce
//! the candidate sets the scorer is trained on.

pub mod bm25;
pub mod dense;
pub mod pool;
pub mod retriever;

pub use bm25::{Bm25Okapi, Bm25Params};
pub use dense::{DenseRetriever, DENSE_CHUNK_SIZE};
pub use pool::build_candidate_pools;
pub use retriever::{RetrievalError, Retriever, RetrieverKind};

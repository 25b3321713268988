//! LaMP / LongLaMP benchmark domain.
//!
//! Task identifiers and their label sets, dataset and gold-label loading,
//! per-task query/document construction for retrieval, prompt assembly for
//! the generator, and the benchmark metrics.
//!
//! # Key types
//!
//! - [`Task`]: one of LaMP-1..7 / LongLaMP-1..4
//! - [`Example`] / [`LabeledExample`]: dataset records
//! - [`CandidateExample`]: a query with its candidate corpus, consumed by the scorer
//! - [`QueryCorpusBuilder`]: builds retrieval queries and documents
//! - [`PromptBuilder`]: builds the user message from selected profiles

pub mod metrics;
pub mod prompt;
pub mod query;
pub mod task;
pub mod types;

pub use metrics::{evaluate_task, rating_value, rouge1, TaskMetrics};
pub use prompt::{PromptBuilder, TokenCounter, WordCounter};
pub use query::QueryCorpusBuilder;
pub use task::{Task, TaskError, TaskKind};
pub use types::{
    join_labels, load_examples, load_labeled, load_labels, write_examples, CandidateExample,
    DataLayout, Example, LabeledExample, Profile,
};

//! Per-task construction of retrieval queries and profile documents.

use crate::task::Task;
use crate::types::{CandidateExample, LabeledExample, Profile};

/// Builds `(query, corpus)` pairs from a task input and a profile pool.
///
/// The query is the part of the input that carries the user's content (the
/// text after the task's marker, e.g. `review:` for LaMP-3). Each profile is
/// rendered into one document by joining the task's text fields with spaces.
#[derive(Debug, Clone, Copy)]
pub struct QueryCorpusBuilder {
    task: Task,
}

impl QueryCorpusBuilder {
    pub fn new(task: Task) -> Self {
        Self { task }
    }

    pub fn task(&self) -> Task {
        self.task
    }

    /// Extract the retrieval query from a task input.
    pub fn query(&self, input: &str) -> String {
        if self.task == Task::LaMP1 {
            if let Some(q) = citation_reference_titles(input) {
                return q;
            }
        }
        match query_marker(self.task) {
            Some(marker) => match input.find(marker) {
                Some(pos) => input[pos + marker.len()..].trim().to_string(),
                None => input.trim().to_string(),
            },
            None => input.trim().to_string(),
        }
    }

    /// Render one profile into a retrievable document.
    pub fn document(&self, profile: &Profile) -> String {
        corpus_fields(self.task)
            .iter()
            .filter_map(|f| profile.field(f))
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Build the query and the index-aligned corpus for a profile pool.
    pub fn build(&self, input: &str, profiles: &[Profile]) -> (String, Vec<String>) {
        let query = self.query(input);
        let corpus = profiles.iter().map(|p| self.document(p)).collect();
        (query, corpus)
    }

    /// Turn a labelled example (whose profile pool is its candidate set) into
    /// the scorer's input record.
    pub fn candidate_example(&self, labeled: &LabeledExample) -> CandidateExample {
        let (query, corpus) = self.build(&labeled.example.input, &labeled.example.profile);
        CandidateExample {
            id: labeled.example.id.clone(),
            source: labeled.example.input.clone(),
            query,
            corpus,
            profiles: labeled.example.profile.clone(),
            target: labeled.target.clone(),
        }
    }
}

fn query_marker(task: Task) -> Option<&'static str> {
    match task {
        Task::LaMP2 => Some("description:"),
        Task::LaMP3 => Some("review:"),
        Task::LaMP4 => Some("article:"),
        Task::LaMP5 => Some("paper:"),
        Task::LaMP6 => Some("email:"),
        Task::LaMP7 => Some("it:"),
        _ => None,
    }
}

/// Profile fields forming a document, in order.
fn corpus_fields(task: Task) -> &'static [&'static str] {
    match task {
        Task::LaMP1 => &["title", "abstract"],
        Task::LaMP2 => &["description"],
        Task::LaMP3 => &["text"],
        Task::LaMP4 => &["title", "text"],
        Task::LaMP5 => &["title", "abstract"],
        Task::LaMP6 => &["title", "text"],
        Task::LaMP7 => &["text"],
        Task::LongLaMP1 => &["subject", "content"],
        Task::LongLaMP2 => &["title", "abstract"],
        Task::LongLaMP3 => &["summary", "content"],
        Task::LongLaMP4 => &["summary", "reviewText", "description"],
    }
}

/// LaMP-1 inputs end with `[1]: "title one" [2]: "title two"`; the two
/// reference titles are the query.
fn citation_reference_titles(input: &str) -> Option<String> {
    let mut titles = Vec::new();
    for tag in ["[1]:", "[2]:"] {
        let start = input.find(tag)? + tag.len();
        let rest = &input[start..];
        let open = rest.find('"')?;
        let rest = &rest[open + 1..];
        let close = rest.find('"')?;
        titles.push(rest[..close].trim().to_string());
    }
    Some(titles.join(" "))
}

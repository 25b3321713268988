//! Benchmark task identifiers and the per-task constants hanging off them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a task identifier is not recognized.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Unknown task '{0}' (expected LaMP-1..LaMP-7 or LongLaMP-1..LongLaMP-4)")]
    Unknown(String),
}

/// How a task's outputs are compared against gold labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Output must be exactly one of a fixed label set.
    Classification,
    /// Output is a number on an ordinal scale.
    Regression,
    /// Free-form text scored by overlap.
    Generation,
}

/// A LaMP or LongLaMP benchmark task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Task {
    /// Personalized citation identification.
    LaMP1,
    /// Personalized movie tagging.
    LaMP2,
    /// Personalized product rating.
    LaMP3,
    /// Personalized news headline generation.
    LaMP4,
    /// Personalized scholarly title generation.
    LaMP5,
    /// Personalized email subject generation.
    LaMP6,
    /// Personalized tweet paraphrasing.
    LaMP7,
    /// Personalized email completion.
    LongLaMP1,
    /// Personalized abstract generation.
    LongLaMP2,
    /// Personalized topic writing.
    LongLaMP3,
    /// Personalized product review writing.
    LongLaMP4,
}

const MOVIE_TAGS: [&str; 15] = [
    "sci-fi",
    "based on a book",
    "comedy",
    "action",
    "twist ending",
    "dystopia",
    "dark comedy",
    "classic",
    "psychology",
    "fantasy",
    "romance",
    "thought-provoking",
    "social commentary",
    "violence",
    "true story",
];

impl Task {
    /// Every task, in identifier order.
    pub const ALL: [Task; 11] = [
        Task::LaMP1,
        Task::LaMP2,
        Task::LaMP3,
        Task::LaMP4,
        Task::LaMP5,
        Task::LaMP6,
        Task::LaMP7,
        Task::LongLaMP1,
        Task::LongLaMP2,
        Task::LongLaMP3,
        Task::LongLaMP4,
    ];

    /// Canonical identifier, e.g. `"LaMP-3"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::LaMP1 => "LaMP-1",
            Task::LaMP2 => "LaMP-2",
            Task::LaMP3 => "LaMP-3",
            Task::LaMP4 => "LaMP-4",
            Task::LaMP5 => "LaMP-5",
            Task::LaMP6 => "LaMP-6",
            Task::LaMP7 => "LaMP-7",
            Task::LongLaMP1 => "LongLaMP-1",
            Task::LongLaMP2 => "LongLaMP-2",
            Task::LongLaMP3 => "LongLaMP-3",
            Task::LongLaMP4 => "LongLaMP-4",
        }
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            Task::LaMP1 | Task::LaMP2 => TaskKind::Classification,
            Task::LaMP3 => TaskKind::Regression,
            _ => TaskKind::Generation,
        }
    }

    /// The closed label set for classification and regression tasks.
    ///
    /// Empty for generation tasks.
    pub fn labels(&self) -> Vec<&'static str> {
        match self {
            Task::LaMP1 => vec!["[1]", "[2]"],
            Task::LaMP2 => MOVIE_TAGS.to_vec(),
            Task::LaMP3 => vec!["1", "2", "3", "4", "5"],
            _ => Vec::new(),
        }
    }

    /// Split used for evaluation: LaMP ships labelled `dev`, LongLaMP labelled `test`.
    pub fn eval_split(&self) -> &'static str {
        match self {
            Task::LongLaMP1 | Task::LongLaMP2 | Task::LongLaMP3 | Task::LongLaMP4 => "test",
            _ => "dev",
        }
    }

    /// System message sent to the generator for this task.
    pub fn system_prompt(&self) -> String {
        let choose = |what: &str| {
            format!(
                "You are a personalized {what} chatbot who responds with one of the following: \
                 {} based on the given examples.",
                format_label_list(&self.labels())
            )
        };
        let write = |what: &str, action: &str| {
            format!(
                "You are a personalized {what} chatbot who {action} in a style similar to \
                 the given examples without any additional text."
            )
        };

        match self {
            Task::LaMP1 => choose("citation identification"),
            Task::LaMP2 => choose("movie tagging"),
            Task::LaMP3 => choose("product rating"),
            Task::LaMP4 => write("news headline generation", "generates a news headline"),
            Task::LaMP5 => write("scholarly title generation", "generates a scholarly title"),
            Task::LaMP6 => write("email subject generation", "generates an email subject"),
            Task::LaMP7 => write("tweet paraphrasing", "paraphrases a tweet"),
            Task::LongLaMP1 => write("email completion", "completes an email"),
            Task::LongLaMP2 => write("abstract generation", "generates an abstract"),
            Task::LongLaMP3 => write("topic generation", "generates a topic"),
            Task::LongLaMP4 => write("product review generation", "generates a product review"),
        }
    }
}

/// Render labels as a bracketed list of single-quoted strings, e.g. `['[1]', '[2]']`.
fn format_label_list(labels: &[&str]) -> String {
    let quoted: Vec<String> = labels.iter().map(|l| format!("'{l}'")).collect();
    format!("[{}]", quoted.join(", "))
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Task {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Task::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| TaskError::Unknown(s.to_string()))
    }
}

impl TryFrom<String> for Task {
    type Error = TaskError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Task> for String {
    fn from(task: Task) -> Self {
        task.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        for task in Task::ALL {
            let parsed: Task = task.as_str().parse().unwrap();
            assert_eq!(parsed, task);
        }
    }

    #[test]
    fn test_unknown_task() {
        let err = "LaMP-9".parse::<Task>().unwrap_err();
        assert!(err.to_string().contains("LaMP-9"));
    }

    #[test]
    fn test_kinds() {
        assert_eq!(Task::LaMP1.kind(), TaskKind::Classification);
        assert_eq!(Task::LaMP2.kind(), TaskKind::Classification);
        assert_eq!(Task::LaMP3.kind(), TaskKind::Regression);
        assert_eq!(Task::LaMP7.kind(), TaskKind::Generation);
        assert_eq!(Task::LongLaMP2.kind(), TaskKind::Generation);
    }

    #[test]
    fn test_system_prompt_lists_labels() {
        let prompt = Task::LaMP3.system_prompt();
        assert!(prompt.contains("product rating"));
        assert!(prompt.contains("['1', '2', '3', '4', '5']"));

        let prompt = Task::LaMP4.system_prompt();
        assert!(prompt.contains("news headline"));
        assert!(prompt.ends_with("without any additional text."));
    }

    #[test]
    fn test_eval_split() {
        assert_eq!(Task::LaMP2.eval_split(), "dev");
        assert_eq!(Task::LongLaMP3.eval_split(), "test");
    }

    #[test]
    fn test_serde_uses_identifier() {
        let json = serde_json::to_string(&Task::LaMP5).unwrap();
        assert_eq!(json, "\"LaMP-5\"");
        let back: Task = serde_json::from_str("\"LongLaMP-1\"").unwrap();
        assert_eq!(back, Task::LongLaMP1);
        assert!(serde_json::from_str::<Task>("\"bogus\"").is_err());
    }
}

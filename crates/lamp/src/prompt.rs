//! User-message formatting for personalized generation.
//!
//! The builder follows a "first k" policy: the first `k` profiles it is given
//! (already ordered by the retriever or sampler) become in-context examples,
//! as long as they fit the token budget.

use crate::task::Task;
use crate::types::Profile;

/// Counts tokens of a text under some tokenizer.
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

/// Whitespace word count. Used when no model tokenizer is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordCounter;

impl TokenCounter for WordCounter {
    fn count_tokens(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// `(label, profile field)` pairs rendered for one in-context example.
fn example_fields(task: Task) -> &'static [(&'static str, &'static str)] {
    match task {
        Task::LaMP1 => &[("Title", "title")],
        Task::LaMP2 => &[("Description", "description"), ("Tag", "tag")],
        Task::LaMP3 => &[("Review", "text"), ("Score", "score")],
        Task::LaMP4 => &[("Article", "text"), ("Headline", "title")],
        Task::LaMP5 => &[("Abstract", "abstract"), ("Title", "title")],
        Task::LaMP6 => &[("Email", "text"), ("Subject", "title")],
        Task::LaMP7 => &[("Tweet", "text")],
        Task::LongLaMP1 => &[("Subject", "subject"), ("Email", "content")],
        Task::LongLaMP2 => &[("Title", "title"), ("Abstract", "abstract")],
        Task::LongLaMP3 => &[("Summary", "summary"), ("Post", "content")],
        Task::LongLaMP4 => &[
            ("Rating", "overall"),
            ("Summary", "summary"),
            ("Review", "reviewText"),
        ],
    }
}

/// Render one profile as an in-context example block.
pub fn format_example(task: Task, profile: &Profile) -> String {
    example_fields(task)
        .iter()
        .filter_map(|(label, field)| profile.field(field).map(|v| format!("{label}: {}", v.trim())))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builds the user message from a task input and the selected profiles.
pub struct PromptBuilder {
    task: Task,
    num_retrieve: usize,
    max_length: usize,
    counter: Box<dyn TokenCounter>,
}

impl PromptBuilder {
    /// `max_length` is the token budget for the whole message; 0 disables the budget.
    pub fn new(task: Task, num_retrieve: usize, max_length: usize, counter: Box<dyn TokenCounter>) -> Self {
        Self {
            task,
            num_retrieve,
            max_length,
            counter,
        }
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn num_retrieve(&self) -> usize {
        self.num_retrieve
    }

    /// Build the user message.
    ///
    /// The input is always kept; examples are appended in order until the
    /// next one would exceed the budget.
    pub fn build(&self, input: &str, profiles: &[Profile]) -> String {
        let input = input.trim();
        let mut used = self.counter.count_tokens(input);
        let mut examples = Vec::new();

        for profile in profiles.iter().take(self.num_retrieve) {
            let example = format_example(self.task, profile);
            if example.is_empty() {
                continue;
            }
            let cost = self.counter.count_tokens(&example);
            if self.max_length > 0 && used + cost > self.max_length {
                tracing::debug!(
                    kept = examples.len(),
                    budget = self.max_length,
                    "Prompt budget reached, dropping remaining examples"
                );
                break;
            }
            used += cost;
            examples.push(example);
        }

        if examples.is_empty() {
            return input.to_string();
        }
        format!(
            "Here are examples from the same user:\n\n{}\n\n{input}",
            examples.join("\n\n")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(id: &str, text: &str, score: &str) -> Profile {
        Profile::new(id, &[("text", text), ("score", score)])
    }

    #[test]
    fn test_format_example() {
        let p = review("1", " nice ", "4");
        assert_eq!(format_example(Task::LaMP3, &p), "Review: nice\nScore: 4");
    }

    #[test]
    fn test_no_profiles_returns_input() {
        let builder = PromptBuilder::new(Task::LaMP3, 3, 0, Box::new(WordCounter));
        assert_eq!(builder.build(" rate this ", &[]), "rate this");
    }

    #[test]
    fn test_takes_first_k() {
        let builder = PromptBuilder::new(Task::LaMP3, 2, 0, Box::new(WordCounter));
        let profiles = vec![review("1", "a", "1"), review("2", "b", "2"), review("3", "c", "3")];
        let prompt = builder.build("q", &profiles);
        assert!(prompt.contains("Review: a"));
        assert!(prompt.contains("Review: b"));
        assert!(!prompt.contains("Review: c"));
        assert!(prompt.ends_with("\n\nq"));
    }

    #[test]
    fn test_budget_drops_examples_but_keeps_input() {
        // Input = 3 words, each example = 4 words ("Review: w w\nScore: 1").
        let builder = PromptBuilder::new(Task::LaMP3, 5, 8, Box::new(WordCounter));
        let profiles = vec![review("1", "w w", "1"), review("2", "x x", "2")];
        let prompt = builder.build("one two three", &profiles);
        assert!(prompt.contains("Review: w w"));
        assert!(!prompt.contains("Review: x x"));

        let tight = PromptBuilder::new(Task::LaMP3, 5, 2, Box::new(WordCounter));
        assert_eq!(tight.build("one two three", &profiles), "one two three");
    }
}

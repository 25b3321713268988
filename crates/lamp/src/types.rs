//! Dataset records: profiles, examples, gold labels and on-disk layout.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::task::Task;

/// One historical item from a user's profile.
///
/// Only `id` is fixed; the remaining fields differ per task (`title`,
/// `abstract`, `text`, `description`, `tag`, `score`, ...) and are kept as
/// a flat JSON map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Profile {
    /// Build a profile from `(field, value)` pairs.
    pub fn new(id: impl Into<String>, fields: &[(&str, &str)]) -> Self {
        Self {
            id: id.into(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
                .collect(),
        }
    }

    /// Textual value of a field. Numbers are rendered, missing or null fields yield `None`.
    pub fn field(&self, name: &str) -> Option<String> {
        match self.fields.get(name)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// One benchmark instance: an input and the user's ordered profile pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub input: String,
    #[serde(default)]
    pub profile: Vec<Profile>,
}

/// An [`Example`] joined with its gold output.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledExample {
    pub example: Example,
    pub target: String,
}

/// The unit consumed by the scorer: a query, its candidate corpus and the
/// profiles the corpus was built from (index-aligned with `corpus`).
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateExample {
    pub id: String,
    /// Original task input, used again when building the generation prompt.
    pub source: String,
    pub query: String,
    pub corpus: Vec<String>,
    pub profiles: Vec<Profile>,
    pub target: String,
}

#[derive(Deserialize)]
struct GoldFile {
    golds: Vec<Gold>,
}

#[derive(Deserialize)]
struct Gold {
    #[serde(deserialize_with = "deserialize_id")]
    id: String,
    output: String,
}

/// Accept both `"id": "110"` and `"id": 110`.
fn deserialize_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Str(String),
        Int(i64),
    }
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Str(s) => s,
        RawId::Int(n) => n.to_string(),
    })
}

/// Load the examples of a dataset file (a JSON array).
pub fn load_examples(path: &Path) -> anyhow::Result<Vec<Example>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read dataset {}: {e}", path.display()))?;
    let examples: Vec<Example> = serde_json::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse dataset {}: {e}", path.display()))?;
    tracing::info!(count = examples.len(), path = %path.display(), "Loaded examples");
    Ok(examples)
}

/// Load a label file (`{"task": ..., "golds": [{id, output}, ...]}`) into an id → output map.
pub fn load_labels(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read labels {}: {e}", path.display()))?;
    let file: GoldFile = serde_json::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse labels {}: {e}", path.display()))?;
    Ok(file.golds.into_iter().map(|g| (g.id, g.output)).collect())
}

/// Join examples with their gold outputs by id.
///
/// Fails on the first example without a label.
pub fn join_labels(
    examples: Vec<Example>,
    labels: &HashMap<String, String>,
) -> anyhow::Result<Vec<LabeledExample>> {
    examples
        .into_iter()
        .map(|example| {
            let target = labels
                .get(&example.id)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("No gold output for example id '{}'", example.id))?;
            Ok(LabeledExample { example, target })
        })
        .collect()
}

/// Load a dataset file and its label file, joined by id.
pub fn load_labeled(data_path: &Path, label_path: &Path) -> anyhow::Result<Vec<LabeledExample>> {
    let examples = load_examples(data_path)?;
    let labels = load_labels(label_path)?;
    join_labels(examples, &labels)
}

/// Write examples (typically with retrieved candidate pools) as a JSON array.
pub fn write_examples(path: &Path, examples: &[Example]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = std::fs::File::create(path)
        .map_err(|e| anyhow::anyhow!("Failed to create {}: {e}", path.display()))?;
    serde_json::to_writer(std::io::BufWriter::new(file), examples)?;
    tracing::info!(count = examples.len(), path = %path.display(), "Wrote examples");
    Ok(())
}

/// Conventional file locations under a data root.
#[derive(Debug, Clone)]
pub struct DataLayout {
    pub root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `{root}/{task}/{split}_questions.json`
    pub fn questions(&self, task: Task, split: &str) -> PathBuf {
        self.root.join(task.as_str()).join(format!("{split}_questions.json"))
    }

    /// `{root}/{task}/{split}_outputs.json`
    pub fn outputs(&self, task: Task, split: &str) -> PathBuf {
        self.root.join(task.as_str()).join(format!("{split}_outputs.json"))
    }

    /// `{root}/{task}/{split}_candidates.json`
    pub fn candidates(&self, task: Task, split: &str) -> PathBuf {
        self.root.join(task.as_str()).join(format!("{split}_candidates.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_numeric_id_and_fields() {
        let json = r#"{"id": 7, "text": "great", "score": 5, "note": null}"#;
        let profile: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.id, "7");
        assert_eq!(profile.field("text").as_deref(), Some("great"));
        assert_eq!(profile.field("score").as_deref(), Some("5"));
        assert_eq!(profile.field("note"), None);
        assert_eq!(profile.field("missing"), None);
    }

    #[test]
    fn test_example_without_profile() {
        let json = r#"{"id": "a", "input": "hello"}"#;
        let example: Example = serde_json::from_str(json).unwrap();
        assert!(example.profile.is_empty());
    }

    #[test]
    fn test_join_labels_missing() {
        let examples = vec![Example {
            id: "x".to_string(),
            input: "q".to_string(),
            profile: vec![],
        }];
        let labels = HashMap::new();
        let err = join_labels(examples, &labels).unwrap_err();
        assert!(err.to_string().contains("'x'"));
    }

    #[test]
    fn test_layout_paths() {
        let layout = DataLayout::new("data");
        assert_eq!(
            layout.questions(Task::LaMP2, "train"),
            PathBuf::from("data/LaMP-2/train_questions.json")
        );
        assert_eq!(
            layout.candidates(Task::LaMP2, "dev"),
            PathBuf::from("data/LaMP-2/dev_candidates.json")
        );
    }
}

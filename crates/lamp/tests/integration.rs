//! Integration tests for the lamp crate: JSON files on disk through to
//! candidate examples, prompts and metrics.

use lamp::{
    evaluate_task, load_labeled, write_examples, DataLayout, Example, Profile, PromptBuilder,
    QueryCorpusBuilder, Task, WordCounter,
};
use tempfile::TempDir;

fn write_dataset(dir: &std::path::Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let layout = DataLayout::new(dir);
    let questions = layout.questions(Task::LaMP3, "train");
    let outputs = layout.outputs(Task::LaMP3, "train");
    std::fs::create_dir_all(questions.parent().unwrap()).unwrap();

    std::fs::write(
        &questions,
        r#"[
            {"id": "100", "input": "What is the score of the following review? review: Solid blender.",
             "profile": [
                {"id": "1", "text": "Broke after a week", "score": "1"},
                {"id": "2", "text": "Love this blender", "score": 5}
             ]},
            {"id": 101, "input": "What is the score of the following review? review: Meh.", "profile": []}
        ]"#,
    )
    .unwrap();
    std::fs::write(
        &outputs,
        r#"{"task": "LaMP_3", "golds": [{"id": "100", "output": "4"}, {"id": "101", "output": "3"}]}"#,
    )
    .unwrap();
    (questions, outputs)
}

#[test]
fn test_load_join_and_build_candidates() {
    let tmp = TempDir::new().unwrap();
    let (questions, outputs) = write_dataset(tmp.path());

    let labeled = load_labeled(&questions, &outputs).unwrap();
    assert_eq!(labeled.len(), 2);
    assert_eq!(labeled[0].target, "4");
    assert_eq!(labeled[1].example.id, "101");

    let builder = QueryCorpusBuilder::new(Task::LaMP3);
    let cand = builder.candidate_example(&labeled[0]);
    assert_eq!(cand.query, "Solid blender.");
    assert_eq!(cand.corpus, vec!["Broke after a week", "Love this blender"]);
    assert_eq!(cand.profiles.len(), cand.corpus.len());

    let empty = builder.candidate_example(&labeled[1]);
    assert!(empty.corpus.is_empty());
}

#[test]
fn test_write_then_load_candidates_file() {
    let tmp = TempDir::new().unwrap();
    let layout = DataLayout::new(tmp.path());
    let path = layout.candidates(Task::LaMP7, "dev");
    let examples = vec![Example {
        id: "9".to_string(),
        input: "Paraphrase the following tweet without any explanation before or after it: hi".to_string(),
        profile: vec![Profile::new("p", &[("text", "hello there")])],
    }];
    write_examples(&path, &examples).unwrap();
    let back = lamp::load_examples(&path).unwrap();
    assert_eq!(back, examples);
}

#[test]
fn test_prompt_and_metric_for_rating_task() {
    let builder = PromptBuilder::new(Task::LaMP3, 1, 256, Box::new(WordCounter));
    let profiles = vec![
        Profile::new("1", &[("text", "Great"), ("score", "5")]),
        Profile::new("2", &[("text", "Bad"), ("score", "1")]),
    ];
    let prompt = builder.build("review: Fine", &profiles);
    assert!(prompt.contains("Review: Great\nScore: 5"));
    assert!(!prompt.contains("Bad"));

    let preds = vec!["5".to_string(), "not a number".to_string()];
    let golds = vec!["4".to_string(), "4".to_string()];
    let metrics = evaluate_task(Task::LaMP3, &preds, &golds).unwrap();
    // |5-4| = 1 and fallback 1 → |1-4| = 3
    assert!((metrics.values["mae"] - 2.0).abs() < 1e-12);
}

//! From a scored batch to prompts, generations and rewards.

use lamp::{PromptBuilder, Task};
use llm::{ChatPrompt, GenerationOutcome};
use scorer::{CollatedBatch, Collator};

use crate::sampling::SelectionPlan;

/// Synchronous generation entry point, e.g.
/// `&|prompts| handle.generate_blocking(prompts)`.
pub type GenerateFn<'a> = dyn Fn(Vec<ChatPrompt>) -> anyhow::Result<Vec<GenerationOutcome>> + 'a;

/// Everything needed to turn candidate examples into generated text.
pub struct Rollout<'a> {
    pub collator: &'a Collator,
    pub prompt_builder: &'a PromptBuilder,
    pub generate: &'a GenerateFn<'a>,
}

impl<'a> Rollout<'a> {
    pub fn new(collator: &'a Collator, prompt_builder: &'a PromptBuilder, generate: &'a GenerateFn<'a>) -> Self {
        Self {
            collator,
            prompt_builder,
            generate,
        }
    }

    pub fn task(&self) -> Task {
        self.prompt_builder.task()
    }

    /// One chat prompt per row, with the selected profiles in plan order.
    pub fn prompts(&self, batch: &CollatedBatch, plan: &SelectionPlan) -> Vec<ChatPrompt> {
        (0..batch.len())
            .map(|b| {
                let profiles: Vec<_> = plan
                    .row(b)
                    .iter()
                    .filter_map(|&slot| batch.profiles[b].get(slot).cloned())
                    .collect();
                let user = self.prompt_builder.build(&batch.sources[b], &profiles);
                ChatPrompt::for_task(self.task(), user)
            })
            .collect()
    }

    /// Generate for every row. Failed rows yield an empty prediction and weight 0.
    pub fn generate(&self, prompts: Vec<ChatPrompt>) -> anyhow::Result<Generations> {
        let n = prompts.len();
        let outcomes = (self.generate)(prompts)?;
        anyhow::ensure!(outcomes.len() == n, "Generator returned {} outcomes for {n} prompts", outcomes.len());

        let mut generations = Generations::default();
        for outcome in outcomes {
            if let GenerationOutcome::Failed { reason } = &outcome {
                tracing::debug!(reason = %reason, "Generation failed, using empty prediction");
                generations.num_failed += 1;
            }
            generations.weights.push(if outcome.is_failed() { 0.0 } else { 1.0 });
            generations.predictions.push(outcome.into_text_or_empty());
        }
        Ok(generations)
    }
}

/// Predictions of one batch, index-aligned with its rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generations {
    pub predictions: Vec<String>,
    /// 1.0 for a completed generation, 0.0 for a failed one.
    pub weights: Vec<f32>,
    pub num_failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use encoder::mocks::WhitespaceTokenizer;
    use lamp::{Example, LabeledExample, Profile, QueryCorpusBuilder, WordCounter};
    use scorer::CollatorConfig;

    fn batch(collator: &Collator) -> CollatedBatch {
        let profiles = vec![
            Profile::new("p0", &[("text", "first review"), ("score", "2")]),
            Profile::new("p1", &[("text", "second review"), ("score", "5")]),
        ];
        let labeled = LabeledExample {
            example: Example {
                id: "1".to_string(),
                input: "What is the score of this review? review: great".to_string(),
                profile: profiles,
            },
            target: "5".to_string(),
        };
        let candidate = QueryCorpusBuilder::new(Task::LaMP3).candidate_example(&labeled);
        collator.collate(vec![candidate]).unwrap()
    }

    #[test]
    fn test_prompts_follow_plan_order() {
        let collator = Collator::new(Arc::new(WhitespaceTokenizer::default()), CollatorConfig::default());
        let builder = PromptBuilder::new(Task::LaMP3, 2, 512, Box::new(WordCounter));
        let generate = |p: Vec<ChatPrompt>| -> anyhow::Result<Vec<GenerationOutcome>> {
            Ok(p.into_iter().map(|_| GenerationOutcome::Completed("5".into())).collect())
        };
        let rollout = Rollout::new(&collator, &builder, &generate);

        let batch = batch(&collator);
        let prompts = rollout.prompts(&batch, &SelectionPlan::from_rows(vec![vec![1, 0]]));
        assert_eq!(prompts.len(), 1);
        let user = &prompts[0].user;
        let second = user.find("second review").unwrap();
        let first = user.find("first review").unwrap();
        assert!(second < first, "{user}");
        assert_eq!(prompts[0].system, Task::LaMP3.system_prompt());
    }

    #[test]
    fn test_failed_generations_get_zero_weight() {
        let collator = Collator::new(Arc::new(WhitespaceTokenizer::default()), CollatorConfig::default());
        let builder = PromptBuilder::new(Task::LaMP3, 1, 512, Box::new(WordCounter));
        let generate = |p: Vec<ChatPrompt>| -> anyhow::Result<Vec<GenerationOutcome>> {
            Ok(p.iter()
                .enumerate()
                .map(|(i, _)| {
                    if i == 0 {
                        GenerationOutcome::failed("timeout")
                    } else {
                        GenerationOutcome::Completed(" 4 ".into())
                    }
                })
                .collect())
        };
        let rollout = Rollout::new(&collator, &builder, &generate);
        let out = rollout
            .generate(vec![ChatPrompt::new("s", "a"), ChatPrompt::new("s", "b")])
            .unwrap();
        assert_eq!(out.predictions, vec!["".to_string(), " 4 ".to_string()]);
        assert_eq!(out.weights, vec![0.0, 1.0]);
        assert_eq!(out.num_failed, 1);
    }

    #[test]
    fn test_wrong_outcome_count_is_error() {
        let collator = Collator::new(Arc::new(WhitespaceTokenizer::default()), CollatorConfig::default());
        let builder = PromptBuilder::new(Task::LaMP3, 1, 512, Box::new(WordCounter));
        let generate = |_: Vec<ChatPrompt>| -> anyhow::Result<Vec<GenerationOutcome>> { Ok(Vec::new()) };
        let rollout = Rollout::new(&collator, &builder, &generate);
        assert!(rollout.generate(vec![ChatPrompt::new("s", "a")]).is_err());
    }
}

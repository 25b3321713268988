//! Greedy evaluation of the scorer with the task metric.

use burn::prelude::*;
use indicatif::{ProgressBar, ProgressStyle};
use lamp::{evaluate_task, CandidateExample, Task, TaskMetrics};
use scorer::ScoreModel;

use crate::sampling::SelectionPlan;
use crate::training::rollout::Rollout;

/// Result of one evaluation pass.
#[derive(Debug, Clone)]
pub struct EvalReport {
    pub metrics: TaskMetrics,
    pub num_examples: usize,
    /// Generations that failed and were scored as empty predictions.
    pub num_failed: usize,
    /// `(example id, prediction)` in dataset order.
    pub predictions: Vec<(String, String)>,
}

impl EvalReport {
    /// Score finished predictions against their targets.
    pub fn from_predictions(
        task: Task,
        ids: Vec<String>,
        predictions: Vec<String>,
        targets: &[String],
        num_failed: usize,
    ) -> anyhow::Result<Self> {
        let metrics = evaluate_task(task, &predictions, targets)?;
        Ok(Self {
            metrics,
            num_examples: targets.len(),
            num_failed,
            predictions: ids.into_iter().zip(predictions).collect(),
        })
    }

    /// JSON summary: metric values plus counts.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "metrics": self.metrics.values,
            "primary": self.metrics.primary,
            "num_examples": self.num_examples,
            "num_failed": self.num_failed,
        })
    }
}

/// Pick the greedy top-`num_retrieve` profiles for every example, generate,
/// and compute the task metric over the whole set.
pub fn evaluate<B: Backend>(
    model: &ScoreModel<B>,
    rollout: &Rollout<'_>,
    examples: &[CandidateExample],
    batch_size: usize,
    num_retrieve: usize,
) -> anyhow::Result<EvalReport> {
    let pb = ProgressBar::new(examples.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("=> "),
    );
    pb.set_message("evaluating");

    let mut ids = Vec::with_capacity(examples.len());
    let mut predictions = Vec::with_capacity(examples.len());
    let mut targets = Vec::with_capacity(examples.len());
    let mut num_failed = 0;

    for chunk in examples.chunks(batch_size.max(1)) {
        let batch = rollout.collator.collate(chunk.to_vec())?;
        let likelihoods = model.likelihoods(&batch)?;
        let plan = SelectionPlan::greedy(&likelihoods, &batch.mask, num_retrieve);
        let generations = rollout.generate(rollout.prompts(&batch, &plan))?;

        num_failed += generations.num_failed;
        ids.extend(batch.ids);
        predictions.extend(generations.predictions);
        targets.extend(batch.targets);
        pb.inc(chunk.len() as u64);
    }
    pb.finish_and_clear();

    let report = EvalReport::from_predictions(rollout.task(), ids, predictions, &targets, num_failed)?;
    if report.num_failed > 0 {
        tracing::warn!(failed = report.num_failed, total = report.num_examples, "Some evaluation generations failed");
    }
    tracing::info!(
        examples = report.num_examples,
        "Evaluation: {}",
        report.metrics.display()
    );
    Ok(report)
}

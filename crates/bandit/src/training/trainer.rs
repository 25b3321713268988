//! Bandit training loop with AdamW on the score head.
//!
//! Ties together the collator, score model, Plackett-Luce sampler, generator
//! and reward into a REINFORCE loop with gradient accumulation and a
//! warmup + cosine learning-rate schedule.

use std::path::Path;
use std::time::Instant;

use burn::grad_clipping::GradientClippingConfig;
use burn::optim::{AdamWConfig, GradientsAccumulator, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use lamp::CandidateExample;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use scorer::{tensor_to_rows, ScoreModel};

use crate::reward::RewardFn;
use crate::sampling::{plackett_luce_log_prob, SelectionPlan};
use crate::training::eval::{evaluate, EvalReport};
use crate::training::loss::{reinforce_baseline, reinforce_loss};
use crate::training::rollout::Rollout;

/// Metadata written next to each saved model.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
pub struct CheckpointMeta {
    pub optimizer_steps: usize,
    pub examples_seen: usize,
    /// Primary metric of the last evaluation, if any ran.
    pub metric: Option<f64>,
}

/// Configuration for bandit training.
#[derive(Config, Debug)]
pub struct BanditTrainingConfig {
    /// Base learning rate for AdamW.
    #[config(default = 1e-4)]
    pub lr: f64,
    #[config(default = 0.01)]
    pub weight_decay: f64,
    /// Maximum gradient norm for clipping.
    #[config(default = 1.0)]
    pub max_grad_norm: f64,
    #[config(default = 1)]
    pub num_epochs: usize,
    /// Examples per forward pass.
    #[config(default = 8)]
    pub batch_size: usize,
    /// Batches per optimizer step.
    #[config(default = 1)]
    pub gradient_accumulation_steps: usize,
    /// Training examples between evaluations; 0 disables evaluation.
    /// Must be a multiple of `batch_size * gradient_accumulation_steps`.
    #[config(default = 512)]
    pub eval_every: usize,
    /// Profiles placed in each prompt.
    #[config(default = 1)]
    pub num_retrieve: usize,
    #[config(default = 0)]
    pub warmup_steps: usize,
    /// Optimizer steps between log lines.
    #[config(default = 10)]
    pub log_interval: usize,
    #[config(default = "String::from(\"outputs/bandit_pr\")")]
    pub output_dir: String,
    #[config(default = 42)]
    pub seed: u64,
}

/// Round `eval_every` down to a multiple of the effective batch size.
///
/// Returns the corrected value and whether it changed.
pub fn correct_eval_every(eval_every: usize, batch_size: usize, gradient_accumulation_steps: usize) -> (usize, bool) {
    let effective = batch_size * gradient_accumulation_steps;
    if effective == 0 {
        return (eval_every, false);
    }
    let remainder = eval_every % effective;
    (eval_every - remainder, remainder != 0)
}

/// Learning rate at an optimizer step: linear warmup then cosine decay to 0.
pub fn lr_schedule(base_lr: f64, warmup_steps: usize, total_steps: usize, step: usize) -> f64 {
    if warmup_steps > 0 && step < warmup_steps {
        base_lr * (step + 1) as f64 / warmup_steps as f64
    } else {
        let decay_steps = total_steps.saturating_sub(warmup_steps).max(1);
        let progress = (step.saturating_sub(warmup_steps) as f64 / decay_steps as f64).min(1.0);
        base_lr * 0.5 * (1.0 + (std::f64::consts::PI * progress).cos())
    }
}

/// Running averages over a logging interval.
#[derive(Default)]
struct RunningAvg {
    loss: f64,
    reward: f64,
    baseline: f64,
    batches: usize,
    failed: usize,
    rows: usize,
}

impl RunningAvg {
    fn update(&mut self, loss: f64, reward: f64, baseline: f64, failed: usize, rows: usize) {
        self.loss += loss;
        self.reward += reward;
        self.baseline += baseline;
        self.batches += 1;
        self.failed += failed;
        self.rows += rows;
    }

    fn display(&self) -> String {
        if self.batches == 0 {
            return "no data".to_string();
        }
        let n = self.batches as f64;
        format!(
            "loss={:.4} reward={:.4} baseline={:.4} failed={}/{}",
            self.loss / n,
            self.reward / n,
            self.baseline / n,
            self.failed,
            self.rows
        )
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// What [`train`] hands back.
pub struct TrainOutcome<B: AutodiffBackend> {
    pub model: ScoreModel<B>,
    pub optimizer_steps: usize,
    /// Best evaluation seen, saved under `{output_dir}/best`.
    pub best: Option<EvalReport>,
}

fn save_checkpoint<B: Backend>(model: &ScoreModel<B>, dir: &Path, meta: &CheckpointMeta) -> anyhow::Result<()> {
    model.save_pretrained(dir)?;
    let meta_path = dir.join("meta.json");
    serde_json::to_writer_pretty(
        std::fs::File::create(&meta_path)
            .map_err(|e| anyhow::anyhow!("Failed to create {}: {e}", meta_path.display()))?,
        meta,
    )?;
    Ok(())
}

/// Run bandit training.
///
/// Every epoch reshuffles `train_set` with `rng`. Each batch is collated and
/// scored; `num_retrieve` profiles are sampled per row; the generator's
/// outputs are rewarded with `reward_fn` and the REINFORCE loss (divided by
/// `gradient_accumulation_steps`) is back-propagated into the head. AdamW
/// steps once every `gradient_accumulation_steps` batches.
///
/// When `eval_every > 0`, the model is evaluated on `eval_set` every
/// `eval_every` training examples and once more at the end. Improvements of
/// the primary metric are saved to `{output_dir}/best`. The final model is
/// always saved to `{output_dir}/final`.
pub fn train<B: AutodiffBackend>(
    config: &BanditTrainingConfig,
    mut model: ScoreModel<B>,
    rollout: &Rollout<'_>,
    reward_fn: RewardFn,
    train_set: &[CandidateExample],
    eval_set: &[CandidateExample],
    rng: &mut StdRng,
) -> anyhow::Result<TrainOutcome<B>> {
    anyhow::ensure!(config.batch_size > 0, "batch_size must be positive");
    anyhow::ensure!(
        config.gradient_accumulation_steps > 0,
        "gradient_accumulation_steps must be positive"
    );
    let output_dir = Path::new(&config.output_dir);
    std::fs::create_dir_all(output_dir)?;

    let mut optimizer = AdamWConfig::new()
        .with_weight_decay(config.weight_decay as f32)
        .with_grad_clipping(Some(GradientClippingConfig::Norm(config.max_grad_norm as f32)))
        .init();
    let mut accumulator = GradientsAccumulator::new();

    let batches_per_epoch = train_set.len().div_ceil(config.batch_size);
    let total_steps = batches_per_epoch.div_ceil(config.gradient_accumulation_steps) * config.num_epochs;
    tracing::info!(
        examples = train_set.len(),
        eval_examples = eval_set.len(),
        total_steps,
        params = model.num_params(),
        "Starting bandit training"
    );

    let mut running = RunningAvg::default();
    let mut best: Option<EvalReport> = None;
    let mut optimizer_steps = 0usize;
    let mut examples_seen = 0usize;
    let mut pending_batches = 0usize;
    let mut next_eval = config.eval_every;
    let mut last_eval_at = None;
    let train_start = Instant::now();

    let run_eval = |model: &ScoreModel<B>,
                    examples_seen: usize,
                    optimizer_steps: usize,
                    best: &mut Option<EvalReport>|
     -> anyhow::Result<()> {
        let report = evaluate(&model.valid(), rollout, eval_set, config.batch_size, config.num_retrieve)?;
        if report.metrics.improves_on(best.as_ref().map(|b| &b.metrics)) {
            tracing::info!(
                step = optimizer_steps,
                metric = report.metrics.primary,
                value = report.metrics.primary_value(),
                "New best model"
            );
            save_checkpoint(
                model,
                &output_dir.join("best"),
                &CheckpointMeta {
                    optimizer_steps,
                    examples_seen,
                    metric: Some(report.metrics.primary_value()),
                },
            )?;
            *best = Some(report);
        }
        Ok(())
    };

    let mut order: Vec<usize> = (0..train_set.len()).collect();
    for epoch in 0..config.num_epochs {
        order.shuffle(rng);
        let num_batches = order.len().div_ceil(config.batch_size);

        for (batch_idx, indices) in order.chunks(config.batch_size).enumerate() {
            let examples: Vec<CandidateExample> = indices.iter().map(|&i| train_set[i].clone()).collect();
            let batch = rollout.collator.collate(examples)?;

            let scores = model.forward(&batch)?;
            let [rows, slots] = scores.dims();
            let likelihoods = if slots == 0 {
                vec![Vec::new(); rows]
            } else {
                tensor_to_rows(scores.clone().inner())?
            };
            let plan = SelectionPlan::sample(&likelihoods, &batch.mask, config.num_retrieve, rng)?;

            let generations = rollout.generate(rollout.prompts(&batch, &plan))?;
            let rewards = reward_fn.compute(&generations.predictions, &batch.targets)?;

            let log_probs = plackett_luce_log_prob(scores, &plan, &batch.mask)?;
            let loss = reinforce_loss(log_probs, &rewards, &generations.weights)?
                / config.gradient_accumulation_steps as f32;
            let loss_val: f64 = loss.clone().into_scalar().elem();

            let grads = GradientsParams::from_grads(loss.backward(), model.head());
            accumulator.accumulate(model.head(), grads);
            pending_batches += 1;
            examples_seen += batch.len();

            let mean_reward = rewards.iter().sum::<f32>() as f64 / rewards.len().max(1) as f64;
            let baseline = reinforce_baseline(&rewards, &generations.weights).unwrap_or(0.0) as f64;
            running.update(
                loss_val * config.gradient_accumulation_steps as f64,
                mean_reward,
                baseline,
                generations.num_failed,
                batch.len(),
            );

            let last_batch = batch_idx + 1 == num_batches;
            if pending_batches < config.gradient_accumulation_steps && !last_batch {
                continue;
            }

            let lr = lr_schedule(config.lr, config.warmup_steps, total_steps, optimizer_steps);
            let grads = accumulator.grads();
            model = model.map_head(|head| optimizer.step(lr, head, grads));
            optimizer_steps += 1;
            pending_batches = 0;

            if config.log_interval > 0 && optimizer_steps % config.log_interval == 0 {
                tracing::info!(
                    epoch,
                    step = optimizer_steps,
                    total_steps,
                    lr = %format!("{lr:.2e}"),
                    elapsed_secs = format!("{:.1}", train_start.elapsed().as_secs_f64()),
                    "avg({}) {}",
                    running.batches,
                    running.display()
                );
                running.reset();
            }

            if config.eval_every > 0 && examples_seen >= next_eval {
                run_eval(&model, examples_seen, optimizer_steps, &mut best)?;
                last_eval_at = Some(examples_seen);
                while next_eval <= examples_seen {
                    next_eval += config.eval_every;
                }
            }
        }
    }

    if config.eval_every > 0 && last_eval_at != Some(examples_seen) {
        run_eval(&model, examples_seen, optimizer_steps, &mut best)?;
    }

    save_checkpoint(
        &model,
        &output_dir.join("final"),
        &CheckpointMeta {
            optimizer_steps,
            examples_seen,
            metric: best.as_ref().map(|b| b.metrics.primary_value()),
        },
    )?;
    tracing::info!(
        optimizer_steps,
        examples_seen,
        elapsed_secs = format!("{:.1}", train_start.elapsed().as_secs_f64()),
        best = best.as_ref().map(|b| b.metrics.display()).unwrap_or_else(|| "none".to_string()),
        "Training complete"
    );

    Ok(TrainOutcome {
        model,
        optimizer_steps,
        best,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correct_eval_every() {
        assert_eq!(correct_eval_every(20, 4, 2), (16, true));
        assert_eq!(correct_eval_every(16, 4, 2), (16, false));
        assert_eq!(correct_eval_every(7, 4, 2), (0, true));
        assert_eq!(correct_eval_every(0, 4, 2), (0, false));
        assert_eq!(correct_eval_every(10, 0, 2), (10, false));
    }

    #[test]
    fn test_lr_schedule() {
        let base_lr = 1e-4;
        assert!((lr_schedule(base_lr, 100, 1000, 0) - base_lr / 100.0).abs() < 1e-12);
        assert!((lr_schedule(base_lr, 100, 1000, 99) - base_lr).abs() < 1e-12);
        assert!((lr_schedule(base_lr, 100, 1000, 100) - base_lr).abs() < 1e-12);
        assert!((lr_schedule(base_lr, 100, 1000, 550) - base_lr * 0.5).abs() < 1e-12);
        assert!(lr_schedule(base_lr, 100, 1000, 999) < base_lr * 0.01);
        assert!((lr_schedule(base_lr, 0, 1000, 0) - base_lr).abs() < 1e-12);
        // Single-step run without warmup still trains at the base rate.
        assert!((lr_schedule(base_lr, 0, 1, 0) - base_lr).abs() < 1e-12);
    }

    #[test]
    fn test_config_defaults() {
        let config = BanditTrainingConfig::new();
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.gradient_accumulation_steps, 1);
        assert_eq!(config.num_retrieve, 1);
        assert_eq!(config.output_dir, "outputs/bandit_pr");
    }

    #[test]
    fn test_running_avg_display() {
        let mut avg = RunningAvg::default();
        assert_eq!(avg.display(), "no data");
        avg.update(1.0, 0.5, 0.25, 1, 4);
        avg.update(3.0, 1.5, 0.75, 0, 4);
        assert_eq!(avg.display(), "loss=2.0000 reward=1.0000 baseline=0.5000 failed=1/8");
        avg.reset();
        assert_eq!(avg.batches, 0);
    }
}

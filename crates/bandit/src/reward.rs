//! Per-task rewards computed from generated text and the gold output.

use lamp::{rating_value, rouge1, Task, TaskKind};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RewardError {
    #[error("Got {predictions} predictions for {targets} targets")]
    LengthMismatch { predictions: usize, targets: usize },
    #[error("Target {index} is not a number: '{value}'")]
    UnparsableTarget { index: usize, value: String },
}

/// Reward function of a task family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardFn {
    Classification,
    Regression,
    Generation,
}

impl RewardFn {
    pub fn for_task(task: Task) -> Self {
        match task.kind() {
            TaskKind::Classification => RewardFn::Classification,
            TaskKind::Regression => RewardFn::Regression,
            TaskKind::Generation => RewardFn::Generation,
        }
    }

    /// One reward per `(prediction, target)` pair.
    pub fn compute(&self, predictions: &[String], targets: &[String]) -> Result<Vec<f32>, RewardError> {
        if predictions.len() != targets.len() {
            return Err(RewardError::LengthMismatch {
                predictions: predictions.len(),
                targets: targets.len(),
            });
        }
        match self {
            RewardFn::Classification => Ok(classification_reward(predictions, targets)),
            RewardFn::Regression => regression_reward(predictions, targets),
            RewardFn::Generation => Ok(generation_reward(predictions, targets)),
        }
    }
}

/// `1.0` on an exact match after trimming both ends, else `0.0`. Case-sensitive.
pub fn classification_reward(predictions: &[String], targets: &[String]) -> Vec<f32> {
    predictions
        .iter()
        .zip(targets)
        .map(|(p, t)| if p.trim() == t.trim() { 1.0 } else { 0.0 })
        .collect()
}

/// Negative absolute error on the rating scale.
///
/// An unparsable prediction is replaced by the scale boundary farther from
/// the target (see [`lamp::rating_value`]). An unparsable target is an error.
pub fn regression_reward(predictions: &[String], targets: &[String]) -> Result<Vec<f32>, RewardError> {
    predictions
        .iter()
        .zip(targets)
        .enumerate()
        .map(|(index, (p, t))| {
            let target: f64 = t.trim().parse().map_err(|_| RewardError::UnparsableTarget {
                index,
                value: t.clone(),
            })?;
            Ok(-(rating_value(p, target) - target).abs() as f32)
        })
        .collect()
}

/// ROUGE-1 F-measure of each pair on its own.
pub fn generation_reward(predictions: &[String], targets: &[String]) -> Vec<f32> {
    predictions
        .iter()
        .zip(targets)
        .map(|(p, t)| rouge1(p.trim(), t.trim()) as f32)
        .collect()
}

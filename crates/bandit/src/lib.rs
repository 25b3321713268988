//! Bandit training of the candidate scorer.
//!
//! Each training batch is scored by the [`scorer::ScoreModel`], a subset of
//! `num_retrieve` profiles is sampled per row from the Plackett-Luce
//! distribution over its likelihoods, prompts are built from the sampled
//! profiles, and the generator's output is turned into a scalar reward. The
//! head is updated with REINFORCE using a mean-reward baseline.
//!
//! # Key types
//!
//! - [`RewardFn`]: per-task reward, resolved once from a [`lamp::Task`]
//! - [`SelectionPlan`]: the profiles chosen for every row of a batch
//! - [`BanditTrainingConfig`]: optimizer, batching and evaluation settings
//! - [`Rollout`]: collator, prompt builder and generator bundled for train/eval

pub mod reward;
pub mod sampling;
pub mod training;

pub use reward::{classification_reward, generation_reward, regression_reward, RewardError, RewardFn};
pub use sampling::{
    greedy_top_k, plackett_luce_log_prob, sample_without_replacement, SelectionPlan, SAMPLING_EPSILON,
};
pub use training::eval::{evaluate, EvalReport};
pub use training::loss::{reinforce_baseline, reinforce_loss};
pub use training::rollout::{GenerateFn, Rollout};
pub use training::trainer::{
    correct_eval_every, lr_schedule, train, BanditTrainingConfig, CheckpointMeta, TrainOutcome,
};

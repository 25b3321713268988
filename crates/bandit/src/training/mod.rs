//! Bandit training pipeline: REINFORCE loss, rollouts through the generator,
//! evaluation with the task metric, and the AdamW training loop.

pub mod eval;
pub mod loss;
pub mod rollout;
pub mod trainer;

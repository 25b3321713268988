//! REINFORCE with a mean-reward baseline.

use burn::prelude::*;
use burn::tensor::TensorData;

/// Mean reward over items with positive weight, `None` if there are none.
pub fn reinforce_baseline(rewards: &[f32], weights: &[f32]) -> Option<f32> {
    let (sum, count) = rewards
        .iter()
        .zip(weights)
        .filter(|(_, &w)| w > 0.0)
        .fold((0.0f32, 0usize), |(s, c), (&r, _)| (s + r, c + 1));
    (count > 0).then(|| sum / count as f32)
}

/// Policy-gradient loss `(1,)` for one batch.
///
/// `advantage_i = (reward_i - baseline) * weight_i` and
/// `loss = -Σ advantage_i * log_prob_i / n`, where `n` counts items with
/// positive weight. A failed generation gets weight 0 so it neither moves
/// the baseline nor receives gradient. With no usable item the loss is a
/// zero that still depends on `log_probs`, so `backward` stays valid.
pub fn reinforce_loss<B: Backend>(
    log_probs: Tensor<B, 1>,
    rewards: &[f32],
    weights: &[f32],
) -> anyhow::Result<Tensor<B, 1>> {
    let [n] = log_probs.dims();
    anyhow::ensure!(
        rewards.len() == n && weights.len() == n,
        "Got {n} log-probabilities, {} rewards and {} weights",
        rewards.len(),
        weights.len()
    );

    let Some(baseline) = reinforce_baseline(rewards, weights) else {
        return Ok(log_probs.sum() * 0.0);
    };
    let used = weights.iter().filter(|&&w| w > 0.0).count() as f32;
    let advantages: Vec<f32> = rewards
        .iter()
        .zip(weights)
        .map(|(&r, &w)| (r - baseline) * w)
        .collect();
    let advantages = Tensor::<B, 1>::from_data(TensorData::new(advantages, [n]), &log_probs.device());
    Ok((log_probs * advantages).sum().neg() / used)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_scalar().elem()
    }

    #[test]
    fn test_baseline_skips_failed() {
        assert_eq!(reinforce_baseline(&[1.0, 0.0, 5.0], &[1.0, 1.0, 0.0]), Some(0.5));
        assert_eq!(reinforce_baseline(&[1.0], &[0.0]), None);
        assert_eq!(reinforce_baseline(&[], &[]), None);
    }

    #[test]
    fn test_loss_value() {
        let device = Default::default();
        let lp = Tensor::<TestBackend, 1>::from_floats([-1.0, -2.0], &device);
        // baseline 0.5, advantages [0.5, -0.5]: -(-0.5 + 1.0) / 2
        let loss = reinforce_loss(lp, &[1.0, 0.0], &[1.0, 1.0]).unwrap();
        assert!((scalar(loss) + 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_equal_rewards_give_zero_loss() {
        let device = Default::default();
        let lp = Tensor::<TestBackend, 1>::from_floats([-0.3, -4.0, -1.0], &device);
        let loss = reinforce_loss(lp, &[-2.0, -2.0, -2.0], &[1.0, 1.0, 1.0]).unwrap();
        assert_eq!(scalar(loss), 0.0);
    }

    #[test]
    fn test_all_failed_is_zero() {
        let device = Default::default();
        let lp = Tensor::<TestBackend, 1>::from_floats([-0.3, -4.0], &device);
        let loss = reinforce_loss(lp, &[1.0, 0.0], &[0.0, 0.0]).unwrap();
        assert_eq!(scalar(loss), 0.0);
    }

    #[test]
    fn test_gradient_direction() {
        let device = Default::default();
        let lp = Tensor::<TestAutodiffBackend, 1>::from_floats([-1.0, -2.0, -0.5], &device).require_grad();
        // Third item failed: weight 0, so zero gradient.
        let loss = reinforce_loss(lp.clone(), &[1.0, 0.0, 100.0], &[1.0, 1.0, 0.0]).unwrap();
        let grads = loss.backward();
        let g: Vec<f32> = lp.grad(&grads).unwrap().into_data().to_vec().unwrap();
        assert!((g[0] + 0.25).abs() < 1e-6, "{g:?}");
        assert!((g[1] - 0.25).abs() < 1e-6, "{g:?}");
        assert_eq!(g[2], 0.0);
    }

    #[test]
    fn test_length_mismatch() {
        let device = Default::default();
        let lp = Tensor::<TestBackend, 1>::from_floats([-1.0], &device);
        assert!(reinforce_loss(lp, &[1.0, 2.0], &[1.0, 1.0]).is_err());
    }
}

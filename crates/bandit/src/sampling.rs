//! Subset selection over scored candidates.
//!
//! Training draws an ordered subset from the Plackett-Luce distribution
//! defined by the likelihoods: at every step a remaining valid slot is picked
//! with probability proportional to its weight, then removed. Evaluation
//! takes the greedy top-k instead.

use burn::prelude::*;
use burn::tensor::TensorData;
use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::Rng;
use scorer::ProfileMask;

/// Added to every weight so slots with a vanishing likelihood stay sampleable
/// and their log-probability stays finite.
pub const SAMPLING_EPSILON: f32 = 1e-6;

/// Draw up to `k` distinct valid slots, in draw order.
pub fn sample_without_replacement(
    weights: &[f32],
    valid: &[bool],
    k: usize,
    rng: &mut impl Rng,
) -> anyhow::Result<Vec<usize>> {
    let mut remaining: Vec<usize> = (0..weights.len()).filter(|&i| valid.get(i).copied().unwrap_or(false)).collect();
    let k = k.min(remaining.len());
    let mut picked = Vec::with_capacity(k);
    while picked.len() < k {
        let dist = WeightedIndex::new(remaining.iter().map(|&i| weights[i].max(0.0) + SAMPLING_EPSILON))
            .map_err(|e| anyhow::anyhow!("Invalid sampling weights {weights:?}: {e}"))?;
        let choice = dist.sample(rng);
        picked.push(remaining.remove(choice));
    }
    Ok(picked)
}

/// The `k` valid slots with the highest weight; ties keep slot order.
pub fn greedy_top_k(weights: &[f32], valid: &[bool], k: usize) -> Vec<usize> {
    let mut slots: Vec<usize> = (0..weights.len()).filter(|&i| valid.get(i).copied().unwrap_or(false)).collect();
    slots.sort_by(|&a, &b| weights[b].partial_cmp(&weights[a]).unwrap_or(std::cmp::Ordering::Equal));
    slots.truncate(k);
    slots
}

/// Ordered slot indices selected for every row of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionPlan {
    rows: Vec<Vec<usize>>,
}

impl SelectionPlan {
    pub fn from_rows(rows: Vec<Vec<usize>>) -> Self {
        Self { rows }
    }

    /// Plackett-Luce sample of `k` slots per row.
    pub fn sample(
        likelihoods: &[Vec<f32>],
        mask: &ProfileMask,
        k: usize,
        rng: &mut impl Rng,
    ) -> anyhow::Result<Self> {
        let rows = likelihoods
            .iter()
            .enumerate()
            .map(|(b, row)| sample_without_replacement(row, mask.row(b), k, &mut *rng))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self { rows })
    }

    pub fn greedy(likelihoods: &[Vec<f32>], mask: &ProfileMask, k: usize) -> Self {
        let rows = likelihoods
            .iter()
            .enumerate()
            .map(|(b, row)| greedy_top_k(row, mask.row(b), k))
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<usize>] {
        &self.rows
    }

    pub fn row(&self, b: usize) -> &[usize] {
        &self.rows[b]
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Longest selection over all rows.
    pub fn max_selected(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// Log-probability `(batch,)` of each row's ordered selection under the
/// Plackett-Luce distribution of `likelihoods` `(batch, slots)`:
///
/// ```text
/// log p = Σ_t [ log(w[s_t] + ε) − log Σ_{j ∈ R_t} (w[j] + ε) ]
/// ```
///
/// where `R_t` is the set of valid slots not yet chosen before step `t`.
/// Rows with an empty selection get log-probability 0. Differentiable with
/// respect to `likelihoods`.
pub fn plackett_luce_log_prob<B: Backend>(
    likelihoods: Tensor<B, 2>,
    plan: &SelectionPlan,
    mask: &ProfileMask,
) -> anyhow::Result<Tensor<B, 1>> {
    let [batch, slots] = likelihoods.dims();
    anyhow::ensure!(
        mask.dims() == [batch, slots] && plan.len() == batch,
        "Likelihoods {:?}, mask {:?} and plan of {} rows disagree",
        [batch, slots],
        mask.dims(),
        plan.len()
    );
    let device = likelihoods.device();
    let steps = plan.max_selected();
    if steps == 0 {
        return Ok(Tensor::zeros([batch], &device));
    }

    // Host-side indicator buffers, all (batch, steps, slots) row-major.
    let mut chosen = vec![0f32; batch * steps * slots];
    let mut available = vec![0f32; batch * steps * slots];
    // 1.0 at (b, t) when row b has no step t, so both terms become log(1).
    let mut unused_step = vec![0f32; batch * steps];
    for b in 0..batch {
        let selection = plan.row(b);
        let mut open: Vec<bool> = mask.row(b).to_vec();
        for t in 0..steps {
            let base = (b * steps + t) * slots;
            match selection.get(t) {
                Some(&s) => {
                    anyhow::ensure!(open.get(s).copied().unwrap_or(false), "Row {b} selects slot {s} twice or a padded slot");
                    for (j, &is_open) in open.iter().enumerate() {
                        if is_open {
                            available[base + j] = 1.0;
                        }
                    }
                    chosen[base + s] = 1.0;
                    open[s] = false;
                }
                None => unused_step[b * steps + t] = 1.0,
            }
        }
    }

    let chosen = Tensor::<B, 3>::from_data(TensorData::new(chosen, [batch, steps, slots]), &device);
    let available = Tensor::<B, 3>::from_data(TensorData::new(available, [batch, steps, slots]), &device);
    let unused_step = Tensor::<B, 3>::from_data(TensorData::new(unused_step, [batch, steps, 1]), &device);

    let weights = (likelihoods + SAMPLING_EPSILON).unsqueeze_dim::<3>(1).repeat_dim(1, steps);
    let numerator = (weights.clone() * chosen).sum_dim(2) + unused_step.clone();
    let denominator = (weights * available).sum_dim(2) + unused_step;
    let per_step: Tensor<B, 2> = (numerator.log() - denominator.log()).squeeze::<2>(2);
    Ok(per_step.sum_dim(1).reshape([batch]))
}

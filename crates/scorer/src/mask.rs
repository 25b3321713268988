//! Validity mask over padded candidate slots.
//!
//! [`ProfileMask::valid_slots`] defines the one ordering in which documents are
//! tokenized by the collator and scattered back by the model: row-major,
//! batch first, then slot.

use burn::prelude::*;
use burn::tensor::TensorData;

/// `true` at `(b, p)` iff slot `p` of row `b` holds a real candidate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProfileMask {
    batch: usize,
    slots: usize,
    data: Vec<bool>,
}

impl ProfileMask {
    /// Mask where row `b` has its first `min(lengths[b], slots)` slots valid.
    pub fn from_lengths(lengths: &[usize], slots: usize) -> Self {
        let data = lengths
            .iter()
            .flat_map(|&len| (0..slots).map(move |p| p < len))
            .collect();
        Self {
            batch: lengths.len(),
            slots,
            data,
        }
    }

    /// Mask from explicit rows. All rows must have the same length.
    pub fn from_rows(rows: &[Vec<bool>]) -> anyhow::Result<Self> {
        let slots = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().position(|r| r.len() != slots) {
            anyhow::bail!("Mask row {bad} has {} slots, expected {slots}", rows[bad].len());
        }
        Ok(Self {
            batch: rows.len(),
            slots,
            data: rows.concat(),
        })
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn dims(&self) -> [usize; 2] {
        [self.batch, self.slots]
    }

    pub fn get(&self, b: usize, p: usize) -> bool {
        self.data[b * self.slots + p]
    }

    pub fn row(&self, b: usize) -> &[bool] {
        &self.data[b * self.slots..(b + 1) * self.slots]
    }

    pub fn true_count_per_row(&self) -> Vec<usize> {
        (0..self.batch)
            .map(|b| self.row(b).iter().filter(|&&v| v).count())
            .collect()
    }

    pub fn total_true(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    /// Coordinates of every valid slot in row-major order.
    pub fn valid_slots(&self) -> Vec<(usize, usize)> {
        (0..self.batch)
            .flat_map(|b| (0..self.slots).map(move |p| (b, p)))
            .filter(|&(b, p)| self.get(b, p))
            .collect()
    }

    /// Boolean tensor of shape `(batch, slots)`.
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2, Bool> {
        Tensor::from_bool(TensorData::new(self.data.clone(), [self.batch, self.slots]), device)
    }

    /// Boolean tensor that is `true` on padded slots (the inverse of this mask).
    pub fn padding_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2, Bool> {
        self.to_tensor::<B>(device).bool_not()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_from_lengths() {
        let mask = ProfileMask::from_lengths(&[2, 0, 5], 3);
        assert_eq!(mask.dims(), [3, 3]);
        assert_eq!(mask.row(0), &[true, true, false]);
        assert_eq!(mask.row(1), &[false, false, false]);
        assert_eq!(mask.row(2), &[true, true, true]);
        assert_eq!(mask.true_count_per_row(), vec![2, 0, 3]);
        assert_eq!(mask.total_true(), 5);
    }

    #[test]
    fn test_valid_slots_row_major() {
        let mask = ProfileMask::from_rows(&[vec![true, false, true], vec![false, true, false]]).unwrap();
        assert_eq!(mask.valid_slots(), vec![(0, 0), (0, 2), (1, 1)]);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        assert!(ProfileMask::from_rows(&[vec![true], vec![true, false]]).is_err());
    }

    #[test]
    fn test_tensor_and_padding_tensor() {
        let device = Default::default();
        let mask = ProfileMask::from_lengths(&[1, 2], 2);
        let t: Vec<bool> = mask.to_tensor::<TestBackend>(&device).into_data().to_vec().unwrap();
        assert_eq!(t, vec![true, false, true, true]);
        let pad: Vec<bool> = mask
            .padding_tensor::<TestBackend>(&device)
            .into_data()
            .to_vec()
            .unwrap();
        assert_eq!(pad, vec![false, true, false, false]);
    }
}

//! Conversion between encoder output (`Vec<f32>` rows) and burn tensors.
//!
//! The candle encoder produces host vectors; the head runs on burn. Document
//! embeddings arrive as a flat list in [`ProfileMask::valid_slots`] order and
//! are scattered into a zero-initialized `(batch, slots, hidden)` buffer.

use burn::prelude::*;
use burn::tensor::TensorData;

use crate::mask::ProfileMask;

fn check_dims(embeddings: &[Vec<f32>], hidden: usize) -> anyhow::Result<()> {
    if let Some((i, bad)) = embeddings.iter().enumerate().find(|(_, e)| e.len() != hidden) {
        anyhow::bail!("Embedding {i} has length {}, expected {hidden}", bad.len());
    }
    Ok(())
}

/// Stack embeddings into a `(rows, hidden)` tensor.
pub fn embeddings_to_tensor<B: Backend>(
    embeddings: &[Vec<f32>],
    hidden: usize,
    device: &B::Device,
) -> anyhow::Result<Tensor<B, 2>> {
    check_dims(embeddings, hidden)?;
    let flat: Vec<f32> = embeddings.iter().flat_map(|v| v.iter().copied()).collect();
    Ok(Tensor::from_data(TensorData::new(flat, [embeddings.len(), hidden]), device))
}

/// Place `embeddings[i]` at the `i`-th valid slot of `mask`; every other
/// slot stays zero. Returns `(batch, slots, hidden)`.
pub fn scatter_embeddings<B: Backend>(
    embeddings: &[Vec<f32>],
    mask: &ProfileMask,
    hidden: usize,
    device: &B::Device,
) -> anyhow::Result<Tensor<B, 3>> {
    let slots = mask.valid_slots();
    if slots.len() != embeddings.len() {
        anyhow::bail!(
            "Mask has {} valid slots but {} embeddings were given",
            slots.len(),
            embeddings.len()
        );
    }
    check_dims(embeddings, hidden)?;

    let [batch, width] = mask.dims();
    let mut buffer = vec![0f32; batch * width * hidden];
    for (&(b, p), emb) in slots.iter().zip(embeddings) {
        let start = (b * width + p) * hidden;
        buffer[start..start + hidden].copy_from_slice(emb);
    }
    Ok(Tensor::from_data(TensorData::new(buffer, [batch, width, hidden]), device))
}

/// Rows of a 2D tensor as host vectors.
pub fn tensor_to_rows<B: Backend>(tensor: Tensor<B, 2>) -> anyhow::Result<Vec<Vec<f32>>> {
    let [_, cols] = tensor.dims();
    let flat = tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Failed to read tensor data: {e:?}"))?;
    if cols == 0 {
        return Ok(Vec::new());
    }
    Ok(flat.chunks(cols).map(<[f32]>::to_vec).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_embeddings_to_tensor_shape() {
        let device = Default::default();
        let t = embeddings_to_tensor::<TestBackend>(&[vec![1.0, 2.0], vec![3.0, 4.0]], 2, &device).unwrap();
        assert_eq!(t.dims(), [2, 2]);
        assert_eq!(tensor_to_rows(t).unwrap(), vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    #[test]
    fn test_wrong_dimension_rejected() {
        let device = Default::default();
        let err = embeddings_to_tensor::<TestBackend>(&[vec![1.0, 2.0], vec![3.0]], 2, &device).unwrap_err();
        assert!(err.to_string().contains("Embedding 1"));
    }

    #[test]
    fn test_scatter_places_rows_and_zero_fills() {
        let device = Default::default();
        let mask = ProfileMask::from_rows(&[vec![false, true, true], vec![true, false, false]]).unwrap();
        let embeddings = vec![vec![1.0, 1.0], vec![2.0, 2.0], vec![3.0, 3.0]];

        let t = scatter_embeddings::<TestBackend>(&embeddings, &mask, 2, &device).unwrap();
        assert_eq!(t.dims(), [2, 3, 2]);
        let flat: Vec<f32> = t.into_data().to_vec().unwrap();
        assert_eq!(
            flat,
            vec![
                0.0, 0.0, 1.0, 1.0, 2.0, 2.0, //
                3.0, 3.0, 0.0, 0.0, 0.0, 0.0,
            ]
        );
    }

    #[test]
    fn test_scatter_count_mismatch() {
        let device = Default::default();
        let mask = ProfileMask::from_lengths(&[2], 2);
        assert!(scatter_embeddings::<TestBackend>(&[vec![1.0]], &mask, 1, &device).is_err());
    }

    #[test]
    fn test_scatter_all_padding() {
        let device = Default::default();
        let mask = ProfileMask::from_lengths(&[0, 0], 3);
        let t = scatter_embeddings::<TestBackend>(&[], &mask, 4, &device).unwrap();
        let sum: f32 = t.sum().into_scalar().elem();
        assert_eq!(sum, 0.0);
    }
}

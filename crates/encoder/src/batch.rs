//! Padded, row-major token batch shared by tokenizers and embedders.

/// A batch of token sequences padded to a common length.
///
/// All three buffers are row-major `(rows, seq_len)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenizedBatch {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub token_type_ids: Vec<u32>,
    rows: usize,
    seq_len: usize,
}

impl TokenizedBatch {
    /// Build a batch from per-row sequences of equal length.
    pub fn from_rows(
        ids: Vec<Vec<u32>>,
        mask: Vec<Vec<u32>>,
        type_ids: Vec<Vec<u32>>,
    ) -> anyhow::Result<Self> {
        let rows = ids.len();
        anyhow::ensure!(
            mask.len() == rows && type_ids.len() == rows,
            "Token batch has {rows} id rows but {} mask rows and {} type rows",
            mask.len(),
            type_ids.len()
        );
        let seq_len = ids.first().map(|r| r.len()).unwrap_or(0);
        for (i, ((a, b), c)) in ids.iter().zip(&mask).zip(&type_ids).enumerate() {
            anyhow::ensure!(
                a.len() == seq_len && b.len() == seq_len && c.len() == seq_len,
                "Row {i} is not padded to length {seq_len}"
            );
        }
        Ok(Self {
            input_ids: ids.into_iter().flatten().collect(),
            attention_mask: mask.into_iter().flatten().collect(),
            token_type_ids: type_ids.into_iter().flatten().collect(),
            rows,
            seq_len,
        })
    }

    /// Number of sequences.
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Padded sequence length.
    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    /// Attention mask of one row.
    pub fn mask_row(&self, row: usize) -> &[u32] {
        &self.attention_mask[row * self.seq_len..(row + 1) * self.seq_len]
    }

    /// Ids of one row.
    pub fn ids_row(&self, row: usize) -> &[u32] {
        &self.input_ids[row * self.seq_len..(row + 1) * self.seq_len]
    }

    /// Fails if any row has no unmasked token, which would make mean pooling divide by zero.
    pub fn ensure_non_empty_rows(&self) -> anyhow::Result<()> {
        for row in 0..self.rows {
            if self.mask_row(row).iter().all(|&m| m == 0) {
                anyhow::bail!("Row {row} of the token batch has no unmasked tokens");
            }
        }
        Ok(())
    }
}

//! Deterministic stand-ins for the tokenizer and encoder, for tests without model weights.

use lamp::TokenCounter;

use crate::batch::TokenizedBatch;
use crate::embedder::SentenceEmbedder;
use crate::tokenizer::BatchTokenizer;

/// Id of the leading token every sequence starts with.
pub const CLS_ID: u32 = 1;
/// Id used for padding.
pub const PAD_ID: u32 = 0;

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

fn word_id(word: &str, vocab_size: u32) -> u32 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in word.to_lowercase().bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(0x100_0000_01b3);
    }
    // 0 and 1 are reserved for padding and the leading token.
    2 + (h % (vocab_size as u64 - 2)) as u32
}

/// Splits on whitespace and hashes each word into a fixed vocabulary.
///
/// Every sequence starts with [`CLS_ID`], so even an empty text has one
/// unmasked token.
#[derive(Debug, Clone)]
pub struct WhitespaceTokenizer {
    pub vocab_size: u32,
}

impl Default for WhitespaceTokenizer {
    fn default() -> Self {
        Self { vocab_size: 30_522 }
    }
}

impl BatchTokenizer for WhitespaceTokenizer {
    fn tokenize(&self, texts: &[String], max_length: usize) -> anyhow::Result<TokenizedBatch> {
        let max_length = max_length.max(1);
        let rows: Vec<Vec<u32>> = texts
            .iter()
            .map(|t| {
                std::iter::once(CLS_ID)
                    .chain(t.split_whitespace().map(|w| word_id(w, self.vocab_size)))
                    .take(max_length)
                    .collect()
            })
            .collect();
        let seq_len = rows.iter().map(Vec::len).max().unwrap_or(0);

        let mut ids = Vec::with_capacity(rows.len());
        let mut mask = Vec::with_capacity(rows.len());
        for row in rows {
            let real = row.len();
            let mut padded = row;
            padded.resize(seq_len, PAD_ID);
            let mut m = vec![1u32; real];
            m.resize(seq_len, 0);
            ids.push(padded);
            mask.push(m);
        }
        let types = ids.iter().map(|r| vec![0u32; r.len()]).collect();
        TokenizedBatch::from_rows(ids, mask, types)
    }
}

impl TokenCounter for WhitespaceTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// Embeds each token id as a fixed pseudo-random vector and mean-pools over
/// unmasked positions, mirroring the real pooling.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    model_id: String,
    hidden_size: usize,
}

impl HashEmbedder {
    pub fn new(model_id: impl Into<String>, hidden_size: usize) -> Self {
        Self {
            model_id: model_id.into(),
            hidden_size,
        }
    }

    fn token_vector(&self, id: u32) -> impl Iterator<Item = f32> + '_ {
        (0..self.hidden_size).map(move |d| {
            let h = splitmix64(((id as u64) << 32) | d as u64);
            // Uniform in [-1, 1).
            (h >> 40) as f32 / (1u64 << 23) as f32 - 1.0
        })
    }
}

impl SentenceEmbedder for HashEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    fn embed(&self, batch: &TokenizedBatch) -> anyhow::Result<Vec<Vec<f32>>> {
        batch.ensure_non_empty_rows()?;
        let mut out = Vec::with_capacity(batch.len());
        for row in 0..batch.len() {
            let mut acc = vec![0f32; self.hidden_size];
            let mut count = 0f32;
            for (&id, &m) in batch.ids_row(row).iter().zip(batch.mask_row(row)) {
                if m == 0 {
                    continue;
                }
                count += 1.0;
                for (a, v) in acc.iter_mut().zip(self.token_vector(id)) {
                    *a += v;
                }
            }
            acc.iter_mut().for_each(|a| *a /= count);
            out.push(acc);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_tokenizer_pads_and_truncates() {
        let tok = WhitespaceTokenizer::default();
        let texts = vec!["a b c d".to_string(), "".to_string()];
        let batch = tok.tokenize(&texts, 3).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.seq_len(), 3);
        assert_eq!(batch.mask_row(0), &[1, 1, 1]);
        assert_eq!(batch.mask_row(1), &[1, 0, 0]);
        assert_eq!(batch.ids_row(1)[0], CLS_ID);
    }

    #[test]
    fn test_hash_embedder_deterministic_and_padding_invariant() {
        let tok = WhitespaceTokenizer::default();
        let emb = HashEmbedder::new("mock", 8);

        let alone = tok.tokenize(&["hello world".to_string()], 16).unwrap();
        let padded = tok
            .tokenize(&["hello world".to_string(), "a much longer sentence here".to_string()], 16)
            .unwrap();

        let a = emb.embed(&alone).unwrap();
        let b = emb.embed(&padded).unwrap();
        assert_eq!(a[0].len(), 8);
        for (x, y) in a[0].iter().zip(&b[0]) {
            assert!((x - y).abs() < 1e-6);
        }
        assert_ne!(b[0], b[1]);
    }

    #[test]
    fn test_values_in_range() {
        let emb = HashEmbedder::new("mock", 64);
        for v in emb.token_vector(12345) {
            assert!((-1.0..1.0).contains(&v));
        }
    }
}

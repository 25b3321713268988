//! Okapi BM25 over whitespace-tokenized documents.
//!
//! ```text
//! score(D, Q) = Σ IDF(q) * f(q, D) * (k1 + 1) / (f(q, D) + k1 * (1 - b + b * |D| / avgdl))
//! IDF(q)      = ln((N - n(q) + 0.5) / (n(q) + 0.5))
//! ```
//!
//! Terms that occur in more than half the corpus get a negative IDF; those
//! are floored to `epsilon * average_idf`. Repeated query terms contribute
//! once per occurrence.

use std::collections::HashMap;

/// BM25 scoring parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    /// Term frequency saturation.
    pub k1: f64,
    /// Document length normalization, 0 disables it.
    pub b: f64,
    /// Floor for negative IDFs, as a fraction of the average IDF.
    pub epsilon: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            epsilon: 0.25,
        }
    }
}

/// Split on whitespace, the only tokenization BM25 retrieval applies.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

/// Inverse document frequency before the negative-IDF floor.
#[inline]
pub fn idf(num_docs: usize, doc_freq: usize) -> f64 {
    let n = num_docs as f64;
    let df = doc_freq as f64;
    ((n - df + 0.5) / (df + 0.5)).ln()
}

/// Score contribution of one query term to one document.
#[inline]
pub fn term_score(term_freq: usize, doc_len: usize, avg_doc_len: f64, idf_value: f64, params: &Bm25Params) -> f64 {
    let tf = term_freq as f64;
    let len_ratio = if avg_doc_len > 0.0 {
        doc_len as f64 / avg_doc_len
    } else {
        0.0
    };
    let norm = params.k1 * (1.0 - params.b + params.b * len_ratio);
    idf_value * tf * (params.k1 + 1.0) / (tf + norm)
}

/// An in-memory BM25 index over one small corpus.
#[derive(Debug, Clone)]
pub struct Bm25Okapi {
    params: Bm25Params,
    doc_freqs: Vec<HashMap<String, usize>>,
    doc_lens: Vec<usize>,
    avg_doc_len: f64,
    idf: HashMap<String, f64>,
}

impl Bm25Okapi {
    pub fn new(corpus: &[Vec<String>]) -> Self {
        Self::with_params(corpus, Bm25Params::default())
    }

    pub fn with_params(corpus: &[Vec<String>], params: Bm25Params) -> Self {
        let mut doc_freqs = Vec::with_capacity(corpus.len());
        let mut doc_lens = Vec::with_capacity(corpus.len());
        let mut containing: HashMap<String, usize> = HashMap::new();

        for doc in corpus {
            let mut freqs: HashMap<String, usize> = HashMap::new();
            for token in doc {
                *freqs.entry(token.clone()).or_default() += 1;
            }
            for term in freqs.keys() {
                *containing.entry(term.clone()).or_default() += 1;
            }
            doc_lens.push(doc.len());
            doc_freqs.push(freqs);
        }

        let total_len: usize = doc_lens.iter().sum();
        let avg_doc_len = if corpus.is_empty() {
            0.0
        } else {
            total_len as f64 / corpus.len() as f64
        };

        let mut idf_map: HashMap<String, f64> = containing
            .iter()
            .map(|(term, &n)| (term.clone(), idf(corpus.len(), n)))
            .collect();
        if !idf_map.is_empty() {
            let average = idf_map.values().sum::<f64>() / idf_map.len() as f64;
            let floor = params.epsilon * average;
            for value in idf_map.values_mut() {
                if *value < 0.0 {
                    *value = floor;
                }
            }
        }

        Self {
            params,
            doc_freqs,
            doc_lens,
            avg_doc_len,
            idf: idf_map,
        }
    }

    pub fn len(&self) -> usize {
        self.doc_lens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lens.is_empty()
    }

    pub fn idf_of(&self, term: &str) -> Option<f64> {
        self.idf.get(term).copied()
    }

    /// Score every document against the query tokens. Unknown terms add 0.
    pub fn scores(&self, query: &[String]) -> Vec<f64> {
        let mut scores = vec![0.0; self.len()];
        for term in query {
            let Some(&term_idf) = self.idf.get(term) else {
                continue;
            };
            for (d, score) in scores.iter_mut().enumerate() {
                let tf = self.doc_freqs[d].get(term).copied().unwrap_or(0);
                *score += term_score(tf, self.doc_lens[d], self.avg_doc_len, term_idf, &self.params);
            }
        }
        scores
    }

    /// Indices of the `n` best documents, highest score first. Equal scores
    /// keep corpus order.
    pub fn top_n(&self, query: &[String], n: usize) -> Vec<usize> {
        top_indices(&self.scores(query), n)
    }
}

/// Stable descending arg-sort truncated to `n`.
pub(crate) fn top_indices<T: PartialOrd + Copy>(scores: &[T], n: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order.truncate(n);
    order
}

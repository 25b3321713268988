//! Candidate-pool construction over a whole dataset.
//!
//! Each example is independent, so examples run on tokio's blocking pool with
//! a bounded number in flight. Every example gets its own RNG seed drawn from
//! the caller's stream before anything is dispatched, which keeps the random
//! strategy reproducible whatever order the tasks finish in.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use lamp::{Example, QueryCorpusBuilder};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::retriever::Retriever;

/// Replace every example's profile pool with its top `num_candidates`
/// profiles under `retriever`. Output order matches input order.
pub async fn build_candidate_pools(
    examples: Vec<Example>,
    retriever: Arc<Retriever>,
    num_candidates: usize,
    builder: QueryCorpusBuilder,
    concurrency: usize,
    rng: &mut StdRng,
) -> anyhow::Result<Vec<Example>> {
    let total = examples.len();
    tracing::info!(
        examples = total,
        num_candidates,
        strategy = %retriever.kind(),
        concurrency,
        "Building candidate pools"
    );

    let seeded: Vec<(usize, u64, Example)> = examples
        .into_iter()
        .enumerate()
        .map(|(i, ex)| (i, rng.gen::<u64>(), ex))
        .collect();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("=> "),
    );

    let mut results: Vec<(usize, Example)> = Vec::with_capacity(total);
    let mut tasks = stream::iter(seeded)
        .map(|(i, seed, example)| {
            let retriever = Arc::clone(&retriever);
            tokio::task::spawn_blocking(move || -> anyhow::Result<(usize, Example)> {
                let mut local_rng = StdRng::seed_from_u64(seed);
                let candidates = retriever.retrieve(
                    &example.input,
                    &example.profile,
                    num_candidates,
                    &builder,
                    &mut local_rng,
                )?;
                Ok((
                    i,
                    Example {
                        profile: candidates,
                        ..example
                    },
                ))
            })
        })
        .buffer_unordered(concurrency.max(1));

    while let Some(joined) = tasks.next().await {
        let (i, example) = joined.map_err(|e| anyhow::anyhow!("Retrieval task panicked: {e}"))??;
        pb.set_message(example.id.clone());
        tracing::debug!(id = example.id, candidates = example.profile.len(), "Retrieved");
        results.push((i, example));
        pb.inc(1);
    }
    pb.finish_with_message("done");

    results.sort_by_key(|(i, _)| *i);
    Ok(results.into_iter().map(|(_, ex)| ex).collect())
}

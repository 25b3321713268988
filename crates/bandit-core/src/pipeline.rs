//! Candidate retrieval, bandit training and baseline evaluation pipelines.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use bandit::{correct_eval_every, train, EvalReport, RewardFn, Rollout};
use burn::backend::ndarray::{NdArray, NdArrayDevice};
use burn::backend::Autodiff;
use burn::config::Config;
use burn::tensor::backend::Backend;
use encoder::{BatchTokenizer, CandleEmbedder, HfTokenizer, SentenceEmbedder};
use indicatif::{ProgressBar, ProgressStyle};
use lamp::{
    load_examples, load_labeled, write_examples, CandidateExample, DataLayout, LabeledExample, PromptBuilder,
    QueryCorpusBuilder, Task, TokenCounter, WordCounter,
};
use llm::{ChatPrompt, GenerationHandle, GenerationOutcome};
use rand::rngs::StdRng;
use rand::SeedableRng;
use retrieval::{build_candidate_pools, Retriever, RetrieverKind};
use scorer::{Collator, ScoreModel, ScoreModelRecord};

use crate::config::{load_config, CliOverrides, EncoderSection};

/// Backend the score head is trained on.
pub type TrainBackend = Autodiff<NdArray<f32>>;

/// Tokenizer and embedder of one frozen encoder.
pub type EncoderPair = (Arc<dyn BatchTokenizer>, Arc<dyn SentenceEmbedder>);

/// Arguments for the `retrieve` subcommand.
#[derive(Debug)]
pub struct RetrieveArgs {
    /// Task identifier, e.g. `LaMP-3`.
    pub task: String,
    /// Dataset root holding `{task}/{split}_questions.json`.
    pub data_dir: PathBuf,
    pub split: String,
    /// `random`, `bm25` or `dense` (`contriever`).
    pub retriever: String,
    /// Profiles kept per example.
    pub num_candidates: usize,
    /// Encoder identifier for dense retrieval.
    pub encoder: String,
    /// Local directory searched for encoders before the hub.
    pub models_dir: PathBuf,
    /// Examples retrieved in parallel.
    pub concurrency: usize,
    pub seed: u64,
    /// Output path; `{data_dir}/{task}/{split}_candidates.json` by default.
    pub output: Option<PathBuf>,
}

/// Arguments for the `train` subcommand.
#[derive(Debug)]
pub struct TrainArgs {
    /// Path to the run config TOML file.
    pub config: PathBuf,
    pub overrides: CliOverrides,
}

/// Arguments for the `baseline` subcommand.
#[derive(Debug)]
pub struct BaselineArgs {
    /// Path to the run config TOML file.
    pub config: PathBuf,
    /// Non-learned strategy placing `num_retrieve` profiles in each prompt.
    pub retriever: String,
    /// Split to evaluate; the task's labelled evaluation split by default.
    pub split: Option<String>,
    /// Truncate the split to this many examples.
    pub max_examples: Option<usize>,
    /// Path to write the JSON report.
    pub output: Option<PathBuf>,
    pub seed: Option<u64>,
}

fn progress_bar(len: usize) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("=> "),
    );
    Ok(pb)
}

/// Resolve and load a frozen encoder with its tokenizer.
pub fn load_encoder(section: &EncoderSection, model_id: &str) -> anyhow::Result<EncoderPair> {
    let resolver = section.resolver();
    let files = resolver.resolve(model_id)?;
    let device = section.device.to_candle_device()?;
    let tokenizer: Arc<dyn BatchTokenizer> = Arc::new(HfTokenizer::from_file(&files.tokenizer)?);
    let embedder: Arc<dyn SentenceEmbedder> = Arc::new(CandleEmbedder::load(model_id, &files, &device)?);
    Ok((tokenizer, embedder))
}

/// Token counter for the prompt budget.
pub fn prompt_counter(tokenizer: Option<&Path>) -> anyhow::Result<Box<dyn TokenCounter>> {
    match tokenizer {
        Some(path) => {
            tracing::info!(path = %path.display(), "Counting prompt tokens with tokenizer");
            Ok(Box::new(HfTokenizer::from_file(path)?))
        }
        None => {
            tracing::info!("No prompt tokenizer configured, counting whitespace words");
            Ok(Box::new(WordCounter))
        }
    }
}

/// Load a split's candidates file joined with its gold outputs.
///
/// Profile pools longer than `num_candidates` are cut to their first
/// `num_candidates` entries.
pub fn load_candidate_split(
    layout: &DataLayout,
    task: Task,
    split: &str,
    num_candidates: usize,
) -> anyhow::Result<Vec<CandidateExample>> {
    let mut labeled = load_labeled(&layout.candidates(task, split), &layout.outputs(task, split))?;
    let mut truncated = 0usize;
    for example in &mut labeled {
        if example.example.profile.len() > num_candidates {
            example.example.profile.truncate(num_candidates);
            truncated += 1;
        }
    }
    if truncated > 0 {
        tracing::warn!(
            split,
            truncated,
            num_candidates,
            "Candidate pools longer than num_candidates were truncated"
        );
    }
    let builder = QueryCorpusBuilder::new(task);
    Ok(labeled.iter().map(|l| builder.candidate_example(l)).collect())
}

/// Retrieve with a fixed strategy, generate, and score against the targets.
///
/// Prompts are generated `batch_size` at a time.
pub async fn evaluate_retriever(
    examples: &[LabeledExample],
    retriever: &Retriever,
    prompt_builder: &PromptBuilder,
    handle: &GenerationHandle,
    batch_size: usize,
    rng: &mut StdRng,
) -> anyhow::Result<EvalReport> {
    let task = prompt_builder.task();
    let builder = QueryCorpusBuilder::new(task);

    let pb = progress_bar(examples.len())?;
    pb.set_message("retrieving");
    let mut prompts = Vec::with_capacity(examples.len());
    for labeled in examples {
        let example = &labeled.example;
        let retrieved = retriever.retrieve(
            &example.input,
            &example.profile,
            prompt_builder.num_retrieve(),
            &builder,
            rng,
        )?;
        prompts.push(ChatPrompt::for_task(task, prompt_builder.build(&example.input, &retrieved)));
        pb.inc(1);
    }
    pb.finish_with_message("retrieved");

    let pb = progress_bar(prompts.len())?;
    pb.set_message("generating");
    let mut outcomes: Vec<GenerationOutcome> = Vec::with_capacity(prompts.len());
    for chunk in prompts.chunks(batch_size.max(1)) {
        outcomes.extend(handle.generate(chunk.to_vec()).await?);
        pb.inc(chunk.len() as u64);
    }
    pb.finish_with_message("done");

    let num_failed = outcomes.iter().filter(|o| o.is_failed()).count();
    if num_failed > 0 {
        tracing::warn!(num_failed, "Failed generations scored as empty predictions");
    }
    let predictions = outcomes.into_iter().map(GenerationOutcome::into_text_or_empty).collect();
    let ids = examples.iter().map(|l| l.example.id.clone()).collect();
    let targets: Vec<String> = examples.iter().map(|l| l.target.clone()).collect();
    EvalReport::from_predictions(task, ids, predictions, &targets, num_failed)
}

/// Build candidate pools for one split and write them next to the dataset.
pub async fn run_retrieve(args: RetrieveArgs) -> anyhow::Result<()> {
    let start = Instant::now();

    // 1. Resolve task and strategy
    let task: Task = args.task.parse()?;
    let kind: RetrieverKind = args.retriever.parse()?;

    // 2. Load encoder for dense retrieval
    let encoder = match kind {
        RetrieverKind::Dense => {
            let section = EncoderSection {
                models_dir: args.models_dir.clone(),
                ..EncoderSection::default()
            };
            Some(load_encoder(&section, &args.encoder)?)
        }
        RetrieverKind::Random | RetrieverKind::Bm25 => None,
    };
    let retriever = Arc::new(Retriever::from_kind(kind, encoder)?);

    // 3. Load split
    let layout = DataLayout::new(&args.data_dir);
    let examples = load_examples(&layout.questions(task, &args.split))?;
    let total = examples.len();

    // 4. Build pools
    let mut rng = StdRng::seed_from_u64(args.seed);
    let pools = build_candidate_pools(
        examples,
        retriever,
        args.num_candidates,
        QueryCorpusBuilder::new(task),
        args.concurrency,
        &mut rng,
    )
    .await?;

    // 5. Write candidates
    let output = args.output.unwrap_or_else(|| layout.candidates(task, &args.split));
    write_examples(&output, &pools)?;

    // 6. Print summary
    let mean_pool = if pools.is_empty() {
        0.0
    } else {
        pools.iter().map(|e| e.profile.len()).sum::<usize>() as f64 / pools.len() as f64
    };
    println!("\n--- Retrieval Summary ---");
    println!("Task: {task} ({})", args.split);
    println!("Strategy: {kind}");
    println!("Examples: {total}");
    println!("Mean candidates: {mean_pool:.1}");
    println!("Output: {}", output.display());
    println!("Elapsed: {:.1}s", start.elapsed().as_secs_f64());

    Ok(())
}

/// Train the score model with bandit feedback from the configured generator.
pub async fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    let start = Instant::now();

    // 1. Load and validate config
    let mut raw = load_config(&args.config)?;
    raw.apply_overrides(&args.overrides);
    let mut config = raw.validate()?;
    let task = config.task;

    // 2. Correct evaluation interval
    let requested = config.training.eval_every;
    let (eval_every, changed) = correct_eval_every(
        requested,
        config.training.batch_size,
        config.training.gradient_accumulation_steps,
    );
    if changed {
        tracing::warn!(
            requested,
            eval_every,
            "eval_every changed to be divisible by effective batch size"
        );
        config.training.eval_every = eval_every;
    }

    // 3. Seed
    let seed = config.training.seed;
    let mut rng = StdRng::seed_from_u64(seed);
    TrainBackend::seed(seed);

    // 4. Load frozen encoder (the saved model's, when resuming)
    let record = match &config.from_pretrained {
        Some(dir) => {
            let saved = ScoreModelRecord::load(dir.join("config.json"))
                .map_err(|e| anyhow::anyhow!("Failed to read {}/config.json: {e}", dir.display()))?;
            if saved.encoder_model != config.score_model.encoder_model {
                tracing::warn!(
                    configured = config.score_model.encoder_model,
                    saved = saved.encoder_model,
                    "Using the encoder recorded with the pretrained model"
                );
            }
            saved
        }
        None => config.score_model.clone(),
    };
    let (tokenizer, embedder) = load_encoder(&config.encoder, &record.encoder_model)?;

    // 5. Build score model
    let device = NdArrayDevice::default();
    let model = match &config.from_pretrained {
        Some(dir) => {
            tracing::info!(path = %dir.display(), "Resuming score model");
            let shared = Arc::clone(&embedder);
            let resolve = move |_: &str| -> anyhow::Result<Arc<dyn SentenceEmbedder>> { Ok(Arc::clone(&shared)) };
            ScoreModel::<TrainBackend>::from_pretrained(dir, &resolve, &device)?
        }
        None => ScoreModel::<TrainBackend>::new(record, embedder, &device)?,
    };

    // 6. Build generator
    let handle = GenerationHandle::new(config.llm.build_generator().await?);
    tracing::info!(generator = handle.name(), "Generator ready");
    let generate = |prompts: Vec<ChatPrompt>| handle.generate_blocking(prompts);

    // 7. Load datasets
    let layout = DataLayout::new(&config.data_dir);
    let train_set = load_candidate_split(&layout, task, "train", config.num_candidates)?;
    let eval_set = load_candidate_split(&layout, task, task.eval_split(), config.num_candidates)?;
    tracing::info!(train = train_set.len(), eval = eval_set.len(), "Loaded datasets");

    // 8. Collator and prompt builder
    let collator = Collator::new(tokenizer, config.collator.clone());
    let prompt_builder = PromptBuilder::new(
        task,
        config.training.num_retrieve,
        config.prompt_max_length,
        prompt_counter(config.prompt_tokenizer.as_deref())?,
    );

    // 9. Record the effective training config
    let output_dir = PathBuf::from(&config.training.output_dir);
    std::fs::create_dir_all(&output_dir)
        .map_err(|e| anyhow::anyhow!("Failed to create {}: {e}", output_dir.display()))?;
    config.training.save(output_dir.join("training_config.json"))?;

    // 10. Train
    let rollout = Rollout::new(&collator, &prompt_builder, &generate);
    let outcome = train(
        &config.training,
        model,
        &rollout,
        RewardFn::for_task(task),
        &train_set,
        &eval_set,
        &mut rng,
    )?;

    // 11. Print summary
    println!("\n--- Training Summary ---");
    println!("Task: {task}");
    println!("Optimizer steps: {}", outcome.optimizer_steps);
    match &outcome.best {
        Some(best) => println!("Best: {} (failed {}/{})", best.metrics.display(), best.num_failed, best.num_examples),
        None => println!("Best: no evaluation ran"),
    }
    println!("Output: {}", output_dir.display());
    println!("Elapsed: {:.1}s", start.elapsed().as_secs_f64());

    Ok(())
}

/// Evaluate a non-learned retriever end to end.
pub async fn run_baseline(args: BaselineArgs) -> anyhow::Result<()> {
    let start = Instant::now();

    // 1. Load and validate config
    let mut raw = load_config(&args.config)?;
    raw.apply_overrides(&CliOverrides {
        seed: args.seed,
        ..CliOverrides::default()
    });
    let config = raw.validate()?;
    let task = config.task;

    // 2. Build retriever
    let kind: RetrieverKind = args.retriever.parse()?;
    let encoder = match kind {
        RetrieverKind::Dense => Some(load_encoder(&config.encoder, &config.score_model.encoder_model)?),
        RetrieverKind::Random | RetrieverKind::Bm25 => None,
    };
    let retriever = Retriever::from_kind(kind, encoder)?;

    // 3. Load split with full profiles
    let split = args.split.unwrap_or_else(|| task.eval_split().to_string());
    let layout = DataLayout::new(&config.data_dir);
    let mut examples = load_labeled(&layout.questions(task, &split), &layout.outputs(task, &split))?;
    if let Some(max) = args.max_examples {
        examples.truncate(max);
    }

    // 4. Build generator and prompt builder
    let handle = GenerationHandle::new(config.llm.build_generator().await?);
    let prompt_builder = PromptBuilder::new(
        task,
        config.training.num_retrieve,
        config.prompt_max_length,
        prompt_counter(config.prompt_tokenizer.as_deref())?,
    );

    // 5. Evaluate
    let mut rng = StdRng::seed_from_u64(config.training.seed);
    let report = evaluate_retriever(
        &examples,
        &retriever,
        &prompt_builder,
        &handle,
        config.training.batch_size,
        &mut rng,
    )
    .await?;

    // 6. Write report
    if let Some(path) = &args.output {
        let file = std::fs::File::create(path)
            .map_err(|e| anyhow::anyhow!("Failed to create {}: {e}", path.display()))?;
        serde_json::to_writer_pretty(file, &report.to_json())?;
        tracing::info!(path = %path.display(), "Wrote baseline report");
    }

    // 7. Print summary
    println!("\n--- Baseline Summary ---");
    println!("Task: {task} ({split})");
    println!("Strategy: {kind}, num_retrieve={}", config.training.num_retrieve);
    println!("Examples: {}", report.num_examples);
    println!("Failed generations: {}", report.num_failed);
    println!("Metrics: {}", report.metrics.display());
    println!("Elapsed: {:.1}s", start.elapsed().as_secs_f64());

    Ok(())
}

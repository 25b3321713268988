use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bandit_core::pipeline::{self, BaselineArgs, RetrieveArgs, TrainArgs};
use bandit_core::CliOverrides;

/// bandit-pr: profile retrieval for personalized LLMs, trained from generator feedback.
#[derive(Parser)]
#[command(name = "bandit-pr", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands for candidate retrieval, training and baselines.
#[derive(Subcommand)]
enum Command {
    /// Build candidate pools for a dataset split with a fixed retriever.
    Retrieve {
        /// Task identifier (e.g., LaMP-3, LongLaMP-2).
        #[arg(long)]
        task: String,
        /// Dataset root holding {task}/{split}_questions.json.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
        /// Dataset split to process.
        #[arg(long, default_value = "train")]
        split: String,
        /// Retrieval strategy: random, bm25, dense (contriever).
        #[arg(long, default_value = "bm25")]
        retriever: String,
        /// Profiles kept per example.
        #[arg(long, default_value_t = 20)]
        num_candidates: usize,
        /// Encoder identifier for dense retrieval.
        #[arg(long, default_value = "facebook/contriever")]
        encoder: String,
        /// Local directory searched for encoders before the hub.
        #[arg(long, default_value = "models")]
        models_dir: PathBuf,
        /// Number of examples retrieved in parallel.
        #[arg(long, default_value_t = 8)]
        concurrency: usize,
        /// Seed for the random retriever.
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Output candidates file (defaults to {data_dir}/{task}/{split}_candidates.json).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Train the score model with bandit feedback from the generator.
    Train {
        /// Path to the run config TOML file.
        #[arg(long, default_value = "configs/bandit_pr.toml")]
        config: PathBuf,
        /// Override the random seed.
        #[arg(long)]
        seed: Option<u64>,
        /// Override the output directory for checkpoints.
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Resume from a saved score model directory.
        #[arg(long)]
        from_pretrained: Option<PathBuf>,
    },
    /// Evaluate a fixed retriever end to end with the configured generator.
    Baseline {
        /// Path to the run config TOML file.
        #[arg(long, default_value = "configs/bandit_pr.toml")]
        config: PathBuf,
        /// Retrieval strategy: random, bm25, dense (contriever).
        #[arg(long, default_value = "bm25")]
        retriever: String,
        /// Split to evaluate (defaults to the task's labelled evaluation split).
        #[arg(long)]
        split: Option<String>,
        /// Maximum number of examples to evaluate (truncates the split).
        #[arg(long)]
        max_examples: Option<usize>,
        /// Path to write the JSON report.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Override the random seed.
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Retrieve {
            task,
            data_dir,
            split,
            retriever,
            num_candidates,
            encoder,
            models_dir,
            concurrency,
            seed,
            output,
        } => {
            pipeline::run_retrieve(RetrieveArgs {
                task,
                data_dir,
                split,
                retriever,
                num_candidates,
                encoder,
                models_dir,
                concurrency,
                seed,
                output,
            })
            .await
        }
        Command::Train {
            config,
            seed,
            output_dir,
            from_pretrained,
        } => {
            pipeline::run_train(TrainArgs {
                config,
                overrides: CliOverrides {
                    seed,
                    output_dir,
                    from_pretrained,
                },
            })
            .await
        }
        Command::Baseline {
            config,
            retriever,
            split,
            max_examples,
            output,
            seed,
        } => {
            pipeline::run_baseline(BaselineArgs {
                config,
                retriever,
                split,
                max_examples,
                output,
                seed,
            })
            .await
        }
    }
}

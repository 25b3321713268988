//! TOML config loading for the `bandit-pr` CLI.
//!
//! Deserializes `configs/bandit_pr.toml` into a [`RawConfig`] in which every
//! required value is still an `Option`. CLI overrides are applied on top, then
//! [`RawConfig::validate`] reports all missing keys at once and produces the
//! typed [`BanditPrConfig`].
//!
//! Priority chain: built-in defaults < TOML values < CLI flags.

use std::path::{Path, PathBuf};

use bandit::BanditTrainingConfig;
use encoder::{DeviceConfig, ModelResolver};
use lamp::{Task, TaskError};
use llm::{ChatTemplate, GenerateParams, LlmConfig, ProviderError};
use scorer::{CollatorConfig, ScoreModelRecord};
use serde::Deserialize;

/// Environment flag that disables every hub download.
pub const OFFLINE_ENV: &str = "HF_EVALUATE_OFFLINE";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing keys in config: {}", .0.join(", "))]
    MissingKeys(Vec<String>),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Top-level structure matching `configs/bandit_pr.toml`.
#[derive(Debug, Deserialize)]
pub struct RawConfig {
    /// Task identifier, e.g. `"LaMP-3"`.
    pub task: Option<String>,
    pub seed: Option<u64>,
    /// Candidates kept per example when loading a candidates file.
    pub num_candidates: Option<usize>,
    /// Profiles placed in each prompt.
    pub num_retrieve: Option<usize>,
    pub batch_size: Option<usize>,
    pub gradient_accumulation_steps: Option<usize>,
    /// Training examples between evaluations.
    pub eval_every: Option<usize>,
    #[serde(default = "default_num_epochs")]
    pub num_epochs: usize,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Saved score model to resume from.
    #[serde(default)]
    pub from_pretrained: Option<PathBuf>,
    #[serde(default)]
    pub optimizer: OptimizerSection,
    #[serde(default)]
    pub score_model: ScoreModelSection,
    #[serde(default)]
    pub collator: CollatorConfig,
    #[serde(default)]
    pub prompt: PromptSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub encoder: EncoderSection,
}

fn default_num_epochs() -> usize {
    1
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs/bandit_pr")
}

/// `[optimizer]`: AdamW and schedule settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OptimizerSection {
    #[serde(default = "default_lr")]
    pub lr: f64,
    #[serde(default = "default_weight_decay")]
    pub weight_decay: f64,
    #[serde(default = "default_max_grad_norm")]
    pub max_grad_norm: f64,
    #[serde(default)]
    pub warmup_steps: usize,
    #[serde(default = "default_log_interval")]
    pub log_interval: usize,
}

fn default_lr() -> f64 {
    1e-4
}
fn default_weight_decay() -> f64 {
    0.01
}
fn default_max_grad_norm() -> f64 {
    1.0
}
fn default_log_interval() -> usize {
    10
}

impl Default for OptimizerSection {
    fn default() -> Self {
        Self {
            lr: default_lr(),
            weight_decay: default_weight_decay(),
            max_grad_norm: default_max_grad_norm(),
            warmup_steps: 0,
            log_interval: default_log_interval(),
        }
    }
}

/// `[score_model]`: encoder identifier and head shape.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoreModelSection {
    pub encoder_model: Option<String>,
    #[serde(default = "default_num_heads")]
    pub num_heads: usize,
    #[serde(default = "default_decoder_hidden_size")]
    pub decoder_hidden_size: usize,
}

fn default_num_heads() -> usize {
    8
}
fn default_decoder_hidden_size() -> usize {
    256
}

impl Default for ScoreModelSection {
    fn default() -> Self {
        Self {
            encoder_model: None,
            num_heads: default_num_heads(),
            decoder_hidden_size: default_decoder_hidden_size(),
        }
    }
}

/// `[prompt]`: user-message budget.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptSection {
    /// Token budget of the user message.
    pub max_length: Option<usize>,
    /// `tokenizer.json` used to count prompt tokens; whitespace words otherwise.
    pub tokenizer: Option<PathBuf>,
}

/// `[llm]`: provider selection and generation parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmSection {
    /// `"local"` or `"openai"`.
    pub provider: Option<String>,
    pub model: Option<String>,
    pub server_url: Option<String>,
    #[serde(default)]
    pub chat_template: ChatTemplate,
    #[serde(default)]
    pub generate: GenerateParams,
}

/// `[encoder]`: where the frozen encoder is found and run.
#[derive(Debug, Clone, Deserialize)]
pub struct EncoderSection {
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
    /// Hub cache directory; `$HF_HOME/hub` when unset.
    #[serde(default)]
    pub hub_cache: Option<PathBuf>,
    #[serde(default)]
    pub device: DeviceConfig,
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

impl Default for EncoderSection {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            hub_cache: None,
            device: DeviceConfig::default(),
        }
    }
}

impl EncoderSection {
    /// Resolver honouring `HF_EVALUATE_OFFLINE=1`.
    pub fn resolver(&self) -> ModelResolver {
        let offline = std::env::var(OFFLINE_ENV).map(|v| v == "1").unwrap_or(false);
        let resolver = ModelResolver::new(&self.models_dir, offline);
        match &self.hub_cache {
            Some(dir) => resolver.with_hub_cache(dir),
            None => resolver,
        }
    }
}

/// CLI flags that take priority over the TOML file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub seed: Option<u64>,
    pub output_dir: Option<PathBuf>,
    pub from_pretrained: Option<PathBuf>,
}

/// Validated run configuration.
#[derive(Debug)]
pub struct BanditPrConfig {
    pub task: Task,
    pub data_dir: PathBuf,
    pub num_candidates: usize,
    pub from_pretrained: Option<PathBuf>,
    pub training: BanditTrainingConfig,
    pub score_model: ScoreModelRecord,
    pub collator: CollatorConfig,
    pub prompt_max_length: usize,
    pub prompt_tokenizer: Option<PathBuf>,
    pub llm: LlmConfig,
    pub encoder: EncoderSection,
}

/// Load and deserialize a [`RawConfig`] from a TOML file.
pub fn load_config(path: &Path) -> anyhow::Result<RawConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {}: {e}", path.display()))?;
    let config: RawConfig = toml::from_str(&contents)?;
    tracing::info!(path = %path.display(), "Loaded config");
    Ok(config)
}

fn require<T>(value: Option<T>, key: &str, missing: &mut Vec<String>) -> Option<T> {
    if value.is_none() {
        missing.push(key.to_string());
    }
    value
}

impl RawConfig {
    pub fn apply_overrides(&mut self, overrides: &CliOverrides) {
        if let Some(seed) = overrides.seed {
            self.seed = Some(seed);
        }
        if let Some(dir) = &overrides.output_dir {
            self.output_dir = dir.clone();
        }
        if let Some(dir) = &overrides.from_pretrained {
            self.from_pretrained = Some(dir.clone());
        }
    }

    /// Check every required key, then parse identifiers.
    ///
    /// Missing keys are reported together, in file order, before the task or
    /// provider identifiers are looked at.
    pub fn validate(self) -> Result<BanditPrConfig, ConfigError> {
        let mut missing = Vec::new();
        let task = require(self.task, "task", &mut missing);
        let seed = require(self.seed, "seed", &mut missing);
        let num_candidates = require(self.num_candidates, "num_candidates", &mut missing);
        let num_retrieve = require(self.num_retrieve, "num_retrieve", &mut missing);
        let batch_size = require(self.batch_size, "batch_size", &mut missing);
        let accumulation = require(
            self.gradient_accumulation_steps,
            "gradient_accumulation_steps",
            &mut missing,
        );
        let eval_every = require(self.eval_every, "eval_every", &mut missing);
        let encoder_model = require(self.score_model.encoder_model, "score_model.encoder_model", &mut missing);
        let max_length = require(self.prompt.max_length, "prompt.max_length", &mut missing);
        let provider = require(self.llm.provider, "llm.provider", &mut missing);
        let model = require(self.llm.model, "llm.model", &mut missing);

        let (
            Some(task),
            Some(seed),
            Some(num_candidates),
            Some(num_retrieve),
            Some(batch_size),
            Some(accumulation),
            Some(eval_every),
            Some(encoder_model),
            Some(max_length),
            Some(provider),
            Some(model),
        ) = (
            task,
            seed,
            num_candidates,
            num_retrieve,
            batch_size,
            accumulation,
            eval_every,
            encoder_model,
            max_length,
            provider,
            model,
        )
        else {
            return Err(ConfigError::MissingKeys(missing));
        };

        let task: Task = task.parse()?;
        let mut llm = LlmConfig::new(provider, model);
        llm.provider()?;
        if let Some(url) = self.llm.server_url {
            llm.server_url = url;
        }
        llm.chat_template = self.llm.chat_template;
        llm.generate = self.llm.generate;

        let training = BanditTrainingConfig::new()
            .with_lr(self.optimizer.lr)
            .with_weight_decay(self.optimizer.weight_decay)
            .with_max_grad_norm(self.optimizer.max_grad_norm)
            .with_warmup_steps(self.optimizer.warmup_steps)
            .with_log_interval(self.optimizer.log_interval)
            .with_num_epochs(self.num_epochs)
            .with_batch_size(batch_size)
            .with_gradient_accumulation_steps(accumulation)
            .with_eval_every(eval_every)
            .with_num_retrieve(num_retrieve)
            .with_output_dir(self.output_dir.display().to_string())
            .with_seed(seed);

        let score_model = ScoreModelRecord::new(encoder_model)
            .with_num_heads(self.score_model.num_heads)
            .with_decoder_hidden_size(self.score_model.decoder_hidden_size);

        Ok(BanditPrConfig {
            task,
            data_dir: self.data_dir,
            num_candidates,
            from_pretrained: self.from_pretrained,
            training,
            score_model,
            collator: self.collator,
            prompt_max_length: max_length,
            prompt_tokenizer: self.prompt.tokenizer,
            llm,
            encoder: self.encoder,
        })
    }
}

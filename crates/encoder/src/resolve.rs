//! Resolution of an encoder identifier to files on disk.
//!
//! Lookup order:
//! 1. the identifier itself as a local directory
//! 2. `{models_dir}/{identifier}`
//! 3. the local HuggingFace hub cache
//! 4. a hub download (skipped when offline)

use std::path::{Path, PathBuf};

use hf_hub::api::sync::ApiBuilder;
use hf_hub::Cache;

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHTS_FILE: &str = "model.safetensors";

/// Errors from [`ModelResolver::resolve`].
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Encoder '{id}' not found (tried: {})", tried.join(", "))]
    NotFound { id: String, tried: Vec<String> },
    #[error("Failed to download encoder '{id}' from the hub: {reason}")]
    Download { id: String, reason: String },
}

/// Paths of the three files an encoder needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
}

impl ModelFiles {
    /// Files in a plain directory, if all three exist.
    pub fn in_dir(dir: &Path) -> Option<Self> {
        let files = Self {
            config: dir.join(CONFIG_FILE),
            tokenizer: dir.join(TOKENIZER_FILE),
            weights: dir.join(WEIGHTS_FILE),
        };
        (files.config.is_file() && files.tokenizer.is_file() && files.weights.is_file())
            .then_some(files)
    }
}

/// Finds encoder files by identifier.
#[derive(Debug, Clone)]
pub struct ModelResolver {
    models_dir: PathBuf,
    hub_cache: Option<PathBuf>,
    offline: bool,
}

impl ModelResolver {
    /// `offline` disables hub downloads; local lookups still apply.
    pub fn new(models_dir: impl Into<PathBuf>, offline: bool) -> Self {
        Self {
            models_dir: models_dir.into(),
            hub_cache: None,
            offline,
        }
    }

    /// Use an explicit hub cache directory instead of `$HF_HOME/hub`.
    pub fn with_hub_cache(mut self, dir: impl Into<PathBuf>) -> Self {
        self.hub_cache = Some(dir.into());
        self
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    fn cache(&self) -> Cache {
        match &self.hub_cache {
            Some(dir) => Cache::new(dir.clone()),
            None => Cache::from_env(),
        }
    }

    pub fn resolve(&self, id: &str) -> Result<ModelFiles, ResolveError> {
        let mut tried = Vec::new();

        let direct = Path::new(id);
        if let Some(files) = ModelFiles::in_dir(direct) {
            return Ok(files);
        }
        tried.push(direct.display().to_string());

        let under_models = self.models_dir.join(id);
        if let Some(files) = ModelFiles::in_dir(&under_models) {
            return Ok(files);
        }
        tried.push(under_models.display().to_string());

        let cache = self.cache();
        let cached = cache.model(id.to_string());
        if let (Some(config), Some(tokenizer), Some(weights)) = (
            cached.get(CONFIG_FILE),
            cached.get(TOKENIZER_FILE),
            cached.get(WEIGHTS_FILE),
        ) {
            tracing::debug!(model = id, "Encoder found in hub cache");
            return Ok(ModelFiles { config, tokenizer, weights });
        }
        tried.push(format!("hub cache {}", cache.path().display()));

        if self.offline {
            tracing::warn!(model = id, "Offline mode: not downloading encoder");
            return Err(ResolveError::NotFound { id: id.to_string(), tried });
        }

        tracing::info!(model = id, "Downloading encoder from the hub");
        let download_err = |e: hf_hub::api::sync::ApiError| ResolveError::Download {
            id: id.to_string(),
            reason: e.to_string(),
        };
        let api = ApiBuilder::from_cache(cache)
            .with_progress(false)
            .build()
            .map_err(download_err)?;
        let repo = api.model(id.to_string());
        Ok(ModelFiles {
            config: repo.get(CONFIG_FILE).map_err(download_err)?,
            tokenizer: repo.get(TOKENIZER_FILE).map_err(download_err)?,
            weights: repo.get(WEIGHTS_FILE).map_err(download_err)?,
        })
    }
}

//! `bandit-pr` command-line pipelines.
//!
//! - [`config`]: TOML loading, CLI overrides and missing-key validation
//! - [`pipeline`]: the `retrieve`, `train` and `baseline` subcommands

pub mod config;
pub mod pipeline;

pub use config::{load_config, BanditPrConfig, CliOverrides, ConfigError, RawConfig};

//! CLI command implementations.

pub(crate) mod check;
pub(crate) mod render;

pub(crate) use check::CheckArgs;
pub(crate) use render::RenderArgs;

use std::path::PathBuf;

use clap::Args;
use vw_config::{CliSettings, Config};

use crate::error::CliError;

/// Options shared by every command.
#[derive(Args, Debug, Default)]
pub(crate) struct ConfigArgs {
    /// Path to configuration file (default: auto-discover vw.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Template root directory (overrides config).
    #[arg(short = 'r', long, env = "VW_TEMPLATE_ROOT")]
    template_root: Option<PathBuf>,

    /// Views directory (overrides config).
    #[arg(long)]
    views_dir: Option<PathBuf>,

    /// Compiled output directory (overrides config).
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

impl ConfigArgs {
    /// Load configuration with these overrides applied.
    pub(crate) fn load(self, force_recompile: Option<bool>) -> Result<Config, CliError> {
        let cli_settings = CliSettings {
            template_root: self.template_root.map(absolute).transpose()?,
            views_dir: self.views_dir.map(absolute).transpose()?,
            cache_dir: self.cache_dir.map(absolute).transpose()?,
            force_recompile,
        };
        Ok(Config::load(self.config.as_deref(), Some(&cli_settings))?)
    }
}

/// Resolve a path against the current directory without touching the
/// filesystem.
pub(crate) fn absolute(path: PathBuf) -> Result<PathBuf, CliError> {
    Ok(std::path::absolute(path)?)
}

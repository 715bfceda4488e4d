//! `vw render` command implementation.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use vw_config::Config;
use vw_pipeline::{Host, PipelineBuilder};

use super::{ConfigArgs, absolute};
use crate::error::CliError;
use crate::host::WriterHost;
use crate::output::Output;

/// Arguments for the render command.
#[derive(Args)]
pub(crate) struct RenderArgs {
    /// Template file to render.
    candidate: PathBuf,

    #[command(flatten)]
    config: ConfigArgs,

    /// Refresh the cached copy even if it is up to date.
    #[arg(short, long)]
    force: bool,

    /// Enable verbose output (cache and controller logs).
    #[arg(short, long)]
    pub verbose: bool,
}

impl RenderArgs {
    /// Execute the render command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the candidate cannot be
    /// rendered.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let force = self.force.then_some(true);
        let config = self.config.load(force)?;

        let candidate = absolute(self.candidate)?;
        let candidate = candidate.to_str().ok_or_else(|| {
            CliError::Validation(format!(
                "Template path is not valid UTF-8: {}",
                candidate.display()
            ))
        })?;

        let host: Arc<dyn Host> = Arc::new(WriterHost::new(config.engine.active, io::stdout()));
        let rest = render(&config, host, candidate)?;

        if !rest.is_empty() {
            output.warning(&format!(
                "Not rendered: {rest} is outside {} or the engine is inactive",
                config.templates_resolved.root.display()
            ));
        }
        Ok(())
    }
}

/// Run one candidate through a pipeline built from `config`.
fn render(config: &Config, host: Arc<dyn Host>, candidate: &str) -> Result<String, CliError> {
    let pipeline = PipelineBuilder::from_config(config)?.build(host)?;
    Ok(pipeline.handle(candidate)?)
}

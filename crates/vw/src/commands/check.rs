//! `vw check` command implementation.

use std::io;
use std::sync::Arc;

use clap::Args;
use vw_pipeline::PipelineBuilder;

use super::ConfigArgs;
use crate::error::CliError;
use crate::host::WriterHost;
use crate::output::Output;

/// Arguments for the check command.
#[derive(Args)]
pub(crate) struct CheckArgs {
    /// View name relative to the views directory (e.g. `cache/home`).
    view: String,

    #[command(flatten)]
    config: ConfigArgs,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CheckArgs {
    /// Execute the check command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the view does not compile.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let config = self.config.load(None)?;

        output.info(&format!(
            "Views directory: {}",
            config.templates_resolved.views_dir.display()
        ));

        let pipeline = PipelineBuilder::from_config(&config)?
            .build(Arc::new(WriterHost::new(false, io::sink())))?;

        if pipeline.exists(&self.view) {
            output.success(&format!("View {} compiles", self.view));
            Ok(())
        } else {
            Err(CliError::Validation(format!(
                "View {} is missing or does not compile",
                self.view
            )))
        }
    }
}

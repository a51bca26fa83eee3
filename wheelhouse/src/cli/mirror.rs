// wheelhouse/src/cli/mirror.rs

use clap::Args;
use tracing::instrument;
use wheelhouse_common::config::Config;
use wheelhouse_common::error::Result;

use crate::pipeline::runner::{self, PipelineFlags};

/// Provision the publish root, then build and publish the full mirror
#[derive(Debug, Args)]
pub struct MirrorArgs {
    /// Adopt a non-empty publish root that carries no mirror marker
    #[arg(long)]
    force: bool,
}

impl MirrorArgs {
    #[instrument(skip(self, config))]
    pub async fn run(&self, config: &Config) -> Result<()> {
        let flags = PipelineFlags {
            provision: true,
            force: self.force,
        };
        runner::run_pipeline(config, &flags).await
    }
}

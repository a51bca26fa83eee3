// wheelhouse/src/cli/refresh.rs

use clap::Args;
use tracing::instrument;
use wheelhouse_common::config::Config;
use wheelhouse_common::error::Result;

use crate::pipeline::runner::{self, PipelineFlags};

/// Rebuild and republish the mirror against an already provisioned root
#[derive(Debug, Args)]
pub struct RefreshArgs;

impl RefreshArgs {
    #[instrument(skip(self, config))]
    pub async fn run(&self, config: &Config) -> Result<()> {
        let flags = PipelineFlags {
            provision: false,
            force: false,
        };
        runner::run_pipeline(config, &flags).await
    }
}

// wheelhouse/src/cli/index.rs
//! Contains the logic for the standalone `index` command.

use clap::Args;
use colored::Colorize;
use wheelhouse_common::config::Config;
use wheelhouse_common::error::Result;
use wheelhouse_core::{build_index, scan_pool};

/// Regenerate the static index from the existing pool, without refetching
#[derive(Debug, Args)]
pub struct IndexArgs;

impl IndexArgs {
    pub async fn run(&self, config: &Config) -> Result<()> {
        println!(
            "{}{}",
            "==> ".bold().blue(),
            "Rebuilding package index...".bold()
        );

        let pool = scan_pool(config)?;
        tracing::debug!(
            "Scanned {} artifact(s) from {}",
            pool.len(),
            config.pool_dir().display()
        );

        let report = build_index(config, &pool)?;
        println!(
            "Indexed {} artifact(s) across {} package(s) under {}",
            report.artifacts,
            report.packages,
            config.index_simple_dir().display()
        );
        Ok(())
    }
}

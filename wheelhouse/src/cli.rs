// wheelhouse/src/cli.rs
//! Defines the command-line argument structure using clap.
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use wheelhouse_common::config::{Config, Overrides};
use wheelhouse_common::error::Result;

// Module declarations
pub mod index;
pub mod mirror;
pub mod refresh;
pub mod status;
pub mod verify;

use crate::cli::index::IndexArgs;
use crate::cli::mirror::MirrorArgs;
use crate::cli::refresh::RefreshArgs;
use crate::cli::verify::VerifyArgs;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "wheelhouse", bin_name = "wheelhouse")]
#[command(propagate_version = true)]
pub struct CliArgs {
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Requirement list driving the mirror (name==version lines)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub requirements: Option<PathBuf>,

    /// Local work area holding staging, pool, index and logs
    #[arg(long, global = true, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Directory tree the mirror is published into
    #[arg(long, global = true, value_name = "DIR")]
    pub publish_root: Option<PathBuf>,

    /// Base URL of the upstream release metadata API
    #[arg(long, global = true, value_name = "URL")]
    pub upstream_api: Option<String>,

    /// Concurrent acquisition workers
    #[arg(short, long, global = true, value_name = "N")]
    pub jobs: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

impl CliArgs {
    /// Maps the global flags onto configuration overrides; anything left
    /// unset falls back to `WHEELHOUSE_*` environment values and defaults.
    pub fn overrides(&self) -> Overrides {
        Overrides {
            requirements_file: self.requirements.clone(),
            work_dir: self.work_dir.clone(),
            publish_root: self.publish_root.clone(),
            upstream_api: self.upstream_api.clone(),
            jobs: self.jobs,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Mirror(MirrorArgs),
    Refresh(RefreshArgs),
    Index(IndexArgs),
    Verify(VerifyArgs),
}

impl Command {
    pub async fn run(&self, config: &Config) -> Result<()> {
        match self {
            Self::Mirror(command) => command.run(config).await,
            Self::Refresh(command) => command.run(config).await,
            Self::Index(command) => command.run(config).await,
            Self::Verify(command) => command.run(config).await,
        }
    }
}

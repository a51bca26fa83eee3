// wheelhouse/src/cli/verify.rs
//! Contains the logic for the standalone `verify` command.
//!
//! Unlike the verification stage embedded in a pipeline run, this command
//! exits non-zero when the pool leaves requirements unsatisfied, so it can
//! gate an external deploy step.

use std::process;

use clap::Args;
use colored::Colorize;
use wheelhouse_common::config::Config;
use wheelhouse_common::error::Result;
use wheelhouse_common::model::load_requirements;
use wheelhouse_core::{scan_pool, verify};

/// Check the existing pool against the requirement list
#[derive(Debug, Args)]
pub struct VerifyArgs;

impl VerifyArgs {
    pub async fn run(&self, config: &Config) -> Result<()> {
        println!(
            "{}{}",
            "==> ".bold().blue(),
            "Verifying mirror coverage...".bold()
        );

        let requirements = load_requirements(&config.requirements_file)?;
        let pool = scan_pool(config)?;
        let report = verify(&requirements, &pool);

        if report.all_satisfied() {
            println!(
                "All {} requirement(s) present in mirror.",
                report.checks.len()
            );
            return Ok(());
        }

        println!(
            "{} {}/{} requirement(s):",
            "MISSING".red().bold(),
            report.unsatisfied_count(),
            report.checks.len()
        );
        for check in report.unsatisfied() {
            println!("  - {}", check.requirement.raw);
        }
        process::exit(1);
    }
}

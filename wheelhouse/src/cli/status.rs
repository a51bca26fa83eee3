// wheelhouse/src/cli/status.rs
//! Renders pipeline events as colored console lines.
//!
//! The stages broadcast events without caring whether anyone listens; this
//! task is the only consumer and owns all user-facing progress output.

use std::time::{Duration, Instant};

use colored::*;
use tokio::sync::broadcast;
use wheelhouse_common::pipeline::{PipelineEvent, Stage};

fn stage_banner(stage: Stage) -> &'static str {
    match stage {
        Stage::Acquire => "Acquiring wheels...",
        Stage::Consolidate => "Consolidating staged artifacts...",
        Stage::Index => "Generating package index...",
        Stage::Publish => "Publishing mirror...",
        Stage::Verify => "Verifying coverage...",
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "kB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit_idx = 0;

    while value >= 1000.0 && unit_idx < UNITS.len() - 1 {
        value /= 1000.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{bytes}B")
    } else {
        format!("{:.1}{}", value, UNITS[unit_idx])
    }
}

pub async fn handle_events(mut event_rx: broadcast::Receiver<PipelineEvent>) {
    let start_time = Instant::now();
    let mut fetched_bytes: u64 = 0;

    loop {
        match event_rx.recv().await {
            Ok(event) => match event {
                PipelineEvent::PipelineStarted {
                    requirements,
                    targets,
                    total_tasks,
                } => {
                    println!(
                        "{} requirement(s) across {} target(s): {} acquisition task(s)",
                        requirements, targets, total_tasks
                    );
                }
                PipelineEvent::StageStarted { stage } => {
                    println!("{}{}", "==> ".bold().blue(), stage_banner(stage).bold());
                }
                PipelineEvent::DownloadStarted {
                    filename,
                    target,
                    size_bytes,
                } => {
                    if let Some(bytes) = size_bytes {
                        fetched_bytes += bytes;
                    }
                    let size = size_bytes.map_or_else(|| "?".to_string(), format_bytes);
                    println!(
                        "  {} {} [{}] {}",
                        "↓".yellow(),
                        filename.cyan(),
                        target,
                        size.dimmed()
                    );
                }
                PipelineEvent::ArtifactStaged { filename, target } => {
                    println!("  {} {} [{}]", "✓".green(), filename.cyan(), target);
                }
                PipelineEvent::NoMatchingWheel { .. } => {
                    // Expected outcome; surfaced through the per-target summary.
                }
                PipelineEvent::AcquireFailed {
                    requirement,
                    target,
                    error,
                } => {
                    println!(
                        "  {} {} [{}]: {}",
                        "✗".red().bold(),
                        requirement.cyan(),
                        target,
                        error.red()
                    );
                }
                PipelineEvent::TargetFinished { summary } => {
                    println!(
                        "  {} {}: {}/{} fetched, {} without a compatible wheel, {} failed",
                        "·".dimmed(),
                        summary.target.bold(),
                        summary.succeeded,
                        summary.attempted,
                        summary.no_match,
                        summary.failed - summary.no_match
                    );
                }
                PipelineEvent::PoolConsolidated {
                    pooled,
                    duplicates,
                    absorbed,
                } => {
                    println!(
                        "Pool holds {} artifact(s) ({} duplicate filename(s) skipped, {} absorbed from earlier runs)",
                        pooled, duplicates, absorbed
                    );
                }
                PipelineEvent::IndexWritten {
                    packages,
                    artifacts,
                } => {
                    println!(
                        "Wrote listings for {} package(s) covering {} artifact(s)",
                        packages, artifacts
                    );
                }
                PipelineEvent::BlobsSynced { uploaded, skipped } => {
                    println!(
                        "Blobs: {} uploaded, {} already current",
                        uploaded, skipped
                    );
                }
                PipelineEvent::IndexSynced { uploaded, deleted } => {
                    println!("Index: {} uploaded, {} stale removed", uploaded, deleted);
                }
                PipelineEvent::Warning { message } => {
                    println!("{} {}", "Warning:".yellow().bold(), message.yellow());
                }
                PipelineEvent::VerifyFinished {
                    satisfied,
                    unsatisfied,
                } => {
                    if unsatisfied == 0 {
                        println!(
                            "{}",
                            format!("All {satisfied} requirement(s) satisfied by the pool.")
                                .green()
                        );
                    } else {
                        println!(
                            "{}",
                            format!(
                                "{unsatisfied} of {} requirement(s) have no pooled artifact.",
                                satisfied + unsatisfied
                            )
                            .yellow()
                            .bold()
                        );
                    }
                }
                PipelineEvent::PipelineFinished {
                    succeeded,
                    failed,
                    unsatisfied,
                } => {
                    let elapsed = Duration::from_secs(start_time.elapsed().as_secs());
                    println!();
                    println!(
                        "{} in {} ({} wheel(s) fetched, {} task(s) failed, {} requirement(s) unsatisfied)",
                        "Pipeline finished".bold(),
                        humantime::format_duration(elapsed),
                        succeeded,
                        failed,
                        unsatisfied
                    );
                    if fetched_bytes > 0 {
                        println!("{}: {}", "Downloaded".bold(), format_bytes(fetched_bytes));
                    }
                    break;
                }
            },
            Err(broadcast::error::RecvError::Closed) => {
                break;
            }
            Err(broadcast::error::RecvError::Lagged(_)) => {
                // Ignore lag for now
            }
        }
    }
}

// wheelhouse/src/pipeline/runner.rs
//! Drives one mirror build end to end: acquire, consolidate, index,
//! publish, verify. Stage progress is broadcast as events and rendered by
//! the status task; the runner itself only decides what is fatal.

use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{debug, instrument, warn};
use wheelhouse_common::config::Config;
use wheelhouse_common::error::{Error, Result};
use wheelhouse_common::model::{load_requirements, Requirement, BUILTIN_TARGETS};
use wheelhouse_common::pipeline::{PipelineEvent, Stage};
use wheelhouse_core::{acquire_all, build_index, consolidate, provision, publish, verify, FsStore};

const EVENT_CHANNEL_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct PipelineFlags {
    /// Provision the publish root (skeleton + marker) before building.
    pub provision: bool,
    /// Adopt a non-empty unmarked publish root instead of refusing it.
    pub force: bool,
}

/// Filled in stage order as the run progresses, so an aborting stage
/// leaves the counts of everything that already happened intact.
#[derive(Default)]
struct StageTotals {
    succeeded: usize,
    failed: usize,
    unsatisfied: usize,
    /// A store failure is held back until after verification reporting,
    /// then becomes the run's result.
    publish_failure: Option<Error>,
}

#[instrument(skip_all, fields(requirements_file = %config.requirements_file.display()))]
pub async fn run_pipeline(config: &Config, flags: &PipelineFlags) -> Result<()> {
    let start_time = Instant::now();

    // An empty or missing requirement list is fatal before any network or
    // storage activity.
    let requirements = load_requirements(&config.requirements_file)?;

    let config = if flags.provision {
        provision(config, flags.force)?
    } else {
        config.clone()
    };

    let (event_tx, status_event_rx) = broadcast::channel::<PipelineEvent>(EVENT_CHANNEL_SIZE);
    let status_handle = tokio::spawn(crate::cli::status::handle_events(status_event_rx));

    let total_tasks = requirements.len() * BUILTIN_TARGETS.len();
    event_tx
        .send(PipelineEvent::PipelineStarted {
            requirements: requirements.len(),
            targets: BUILTIN_TARGETS.len(),
            total_tasks,
        })
        .ok();

    let mut totals = StageTotals::default();
    let result = run_stages(&config, &requirements, &event_tx, &mut totals).await;

    event_tx
        .send(PipelineEvent::PipelineFinished {
            succeeded: totals.succeeded,
            failed: totals.failed,
            unsatisfied: totals.unsatisfied,
        })
        .ok();

    drop(event_tx);
    if let Err(e) = status_handle.await {
        warn!("Status handler task failed or panicked: {}", e);
    }

    debug!(
        "Pipeline run finished in {:.2}s",
        start_time.elapsed().as_secs_f64()
    );

    match result {
        Ok(()) => match totals.publish_failure {
            Some(error) => Err(error),
            None => Ok(()),
        },
        Err(error) => Err(error),
    }
}

async fn run_stages(
    config: &Config,
    requirements: &[Requirement],
    event_tx: &broadcast::Sender<PipelineEvent>,
    totals: &mut StageTotals,
) -> Result<()> {
    event_tx
        .send(PipelineEvent::StageStarted {
            stage: Stage::Acquire,
        })
        .ok();
    let summaries = acquire_all(config, requirements, event_tx).await?;
    totals.succeeded = summaries.iter().map(|s| s.succeeded).sum();
    totals.failed = summaries.iter().map(|s| s.failed).sum();

    event_tx
        .send(PipelineEvent::StageStarted {
            stage: Stage::Consolidate,
        })
        .ok();
    let (pool, merge) = consolidate(config)?;
    event_tx
        .send(PipelineEvent::PoolConsolidated {
            pooled: merge.pooled,
            duplicates: merge.duplicates,
            absorbed: merge.absorbed,
        })
        .ok();

    event_tx
        .send(PipelineEvent::StageStarted {
            stage: Stage::Index,
        })
        .ok();
    let index_report = build_index(config, &pool)?;
    event_tx
        .send(PipelineEvent::IndexWritten {
            packages: index_report.packages,
            artifacts: index_report.artifacts,
        })
        .ok();

    event_tx
        .send(PipelineEvent::StageStarted {
            stage: Stage::Publish,
        })
        .ok();
    let store = FsStore::new(config);
    totals.publish_failure = match publish(&store, &pool, config) {
        Ok(report) => {
            event_tx
                .send(PipelineEvent::BlobsSynced {
                    uploaded: report.blobs.uploaded,
                    skipped: report.blobs.skipped,
                })
                .ok();
            event_tx
                .send(PipelineEvent::IndexSynced {
                    uploaded: report.index.uploaded,
                    deleted: report.index.deleted,
                })
                .ok();
            if report.blobs.failed + report.index.failed > 0 {
                event_tx
                    .send(PipelineEvent::Warning {
                        message: format!(
                            "{} file(s) failed to publish; uploaded content stays in place and the next run retries the rest",
                            report.blobs.failed + report.index.failed
                        ),
                    })
                    .ok();
            }
            None
        }
        Err(e) => {
            warn!("Publish failed: {e}");
            event_tx
                .send(PipelineEvent::Warning {
                    message: format!(
                        "Publish failed ({e}); the previously published mirror is untouched"
                    ),
                })
                .ok();
            Some(e)
        }
    };

    event_tx
        .send(PipelineEvent::StageStarted {
            stage: Stage::Verify,
        })
        .ok();
    let verification = verify(requirements, &pool);
    for check in verification.unsatisfied() {
        event_tx
            .send(PipelineEvent::Warning {
                message: format!("No pooled artifact satisfies {}", check.requirement.raw),
            })
            .ok();
    }
    event_tx
        .send(PipelineEvent::VerifyFinished {
            satisfied: verification.satisfied_count(),
            unsatisfied: verification.unsatisfied_count(),
        })
        .ok();
    totals.unsatisfied = verification.unsatisfied_count();

    Ok(())
}

// wheelhouse-core/src/acquire.rs
//! Wheel acquisition across the (requirement × platform target) matrix.
//!
//! Every pair is one independent task: it resolves release metadata, picks
//! the best compatible wheel for the target, and stages the file. A pair
//! with no compatible wheel is a counted outcome, never a batch failure.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use reqwest::Client;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};
use wheelhouse_common::config::Config;
use wheelhouse_common::error::Result;
use wheelhouse_common::model::{
    Artifact, DistFilename, PlatformTarget, Requirement, VersionPin, WheelFilename,
    BUILTIN_TARGETS,
};
use wheelhouse_common::pipeline::{FetchOutcome, PipelineEvent, TargetSummary};
use wheelhouse_net::api::{ReleaseClient, ReleaseFile};
use wheelhouse_net::http::{build_http_client, download_wheel};

pub(crate) fn get_panic_message(e: Box<dyn std::any::Any + Send>) -> String {
    match e.downcast_ref::<&'static str>() {
        Some(s) => (*s).to_string(),
        None => match e.downcast_ref::<String>() {
            Some(s) => s.clone(),
            None => "Unknown panic payload".to_string(),
        },
    }
}

/// Picks the wheel to mirror for one target out of a release's file list.
/// Candidates are ranked by the target's platform tag order, with
/// universal wheels as the fallback; ties keep upstream listing order.
/// Yanked files and sdists are never candidates.
pub fn select_wheel<'a>(
    files: &'a [ReleaseFile],
    requirement: &Requirement,
    target: &PlatformTarget,
) -> Option<(&'a ReleaseFile, WheelFilename)> {
    let wanted = requirement.normalized_name();
    let mut best: Option<(usize, &ReleaseFile, WheelFilename)> = None;
    for file in files {
        if file.yanked || !file.is_wheel() {
            continue;
        }
        let parsed = match WheelFilename::parse(&file.filename) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Ignoring unparseable wheel filename '{}': {}", file.filename, e);
                continue;
            }
        };
        if parsed.normalized_name() != wanted || !requirement.matches_version(&parsed.version) {
            continue;
        }
        let Some(rank) = target.preference(&parsed) else {
            continue;
        };
        if best.as_ref().is_none_or(|(b, ..)| rank < *b) {
            best = Some((rank, file, parsed));
        }
    }
    best.map(|(_, file, parsed)| (file, parsed))
}

async fn fetch_one(
    release_client: &ReleaseClient,
    http_client: &Client,
    config: &Config,
    requirement: &Requirement,
    target: &'static PlatformTarget,
    event_tx: &broadcast::Sender<PipelineEvent>,
) -> FetchOutcome {
    let pinned_version = match &requirement.pin {
        VersionPin::Exact(v) => Some(v.as_str()),
        VersionPin::Any => None,
    };

    let files = match release_client
        .release_files(&requirement.name, pinned_version)
        .await
    {
        Ok(files) => files,
        Err(error) => {
            event_tx
                .send(PipelineEvent::AcquireFailed {
                    requirement: requirement.raw.clone(),
                    target: target.label.to_string(),
                    error: error.to_string(),
                })
                .ok();
            return FetchOutcome::Failed {
                requirement: requirement.raw.clone(),
                target: target.label,
                error,
            };
        }
    };

    let Some((file, parsed)) = select_wheel(&files, requirement, target) else {
        debug!(
            "No compatible wheel for {} on {} ({} release files)",
            requirement.raw,
            target.label,
            files.len()
        );
        event_tx
            .send(PipelineEvent::NoMatchingWheel {
                requirement: requirement.raw.clone(),
                target: target.label.to_string(),
            })
            .ok();
        return FetchOutcome::NoMatchingWheel {
            requirement: requirement.raw.clone(),
            target: target.label,
        };
    };

    event_tx
        .send(PipelineEvent::DownloadStarted {
            filename: file.filename.clone(),
            target: target.label.to_string(),
            size_bytes: file.size,
        })
        .ok();

    let staging_dir = config.target_staging_dir(target.label);
    match download_wheel(
        http_client,
        &file.url,
        &staging_dir,
        &file.filename,
        file.digests.sha256.as_deref(),
    )
    .await
    {
        Ok(staged) => {
            event_tx
                .send(PipelineEvent::ArtifactStaged {
                    filename: file.filename.clone(),
                    target: target.label.to_string(),
                })
                .ok();
            FetchOutcome::Fetched(Artifact {
                filename: DistFilename::Wheel(parsed),
                path: staged.path,
                size_bytes: staged.size_bytes,
                sha256: Some(staged.sha256),
                source_target: Some(target.label),
            })
        }
        Err(error) => {
            warn!(
                "Download failed for {} on {}: {}",
                file.filename, target.label, error
            );
            event_tx
                .send(PipelineEvent::AcquireFailed {
                    requirement: requirement.raw.clone(),
                    target: target.label.to_string(),
                    error: error.to_string(),
                })
                .ok();
            FetchOutcome::Failed {
                requirement: requirement.raw.clone(),
                target: target.label,
                error,
            }
        }
    }
}

/// Removes `.{filename}.{seq}.download` leftovers from interrupted runs.
/// Runs before any task spawns, so it can never hit a live temp file.
fn sweep_stale_temps(staging_dir: &Path) {
    let Ok(entries) = fs::read_dir(staging_dir) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') && name.ends_with(".download") {
            debug!("Removing stale temp file {}", entry.path().display());
            if let Err(e) = fs::remove_file(entry.path()) {
                warn!(
                    "Could not remove stale temp file {}: {}",
                    entry.path().display(),
                    e
                );
            }
        }
    }
}

/// Runs the full acquisition matrix with a bounded worker pool and returns
/// per-target summaries in catalog order. Individual outcomes flow back
/// over a channel and are absorbed into counters; nothing here aborts the
/// batch.
pub async fn acquire_all(
    config: &Config,
    requirements: &[Requirement],
    event_tx: &broadcast::Sender<PipelineEvent>,
) -> Result<Vec<TargetSummary>> {
    let release_client = Arc::new(ReleaseClient::new(config)?);
    let http_client = Arc::new(build_http_client()?);
    let semaphore = Arc::new(Semaphore::new(config.jobs));
    let (outcome_tx, mut outcome_rx) = mpsc::channel::<FetchOutcome>(64);
    let mut tasks = JoinSet::new();

    debug!(
        "Spawning {} acquisition tasks across {} targets ({} workers)",
        requirements.len() * BUILTIN_TARGETS.len(),
        BUILTIN_TARGETS.len(),
        config.jobs
    );

    for target in BUILTIN_TARGETS {
        sweep_stale_temps(&config.target_staging_dir(target.label));
    }

    for target in BUILTIN_TARGETS {
        for requirement in requirements {
            let task_release = Arc::clone(&release_client);
            let task_http = Arc::clone(&http_client);
            let task_config = config.clone();
            let task_event_tx = event_tx.clone();
            let task_outcome_tx = outcome_tx.clone();
            let task_semaphore = Arc::clone(&semaphore);
            let requirement = requirement.clone();

            tasks.spawn(async move {
                let _permit = match task_semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                let outcome = fetch_one(
                    &task_release,
                    &task_http,
                    &task_config,
                    &requirement,
                    target,
                    &task_event_tx,
                )
                .await;
                if task_outcome_tx.send(outcome).await.is_err() {
                    error!(
                        "Failed to send fetch outcome for {}: receiver dropped.",
                        requirement.raw
                    );
                }
            });
        }
    }
    drop(outcome_tx);

    let mut summaries: Vec<TargetSummary> = BUILTIN_TARGETS
        .iter()
        .map(|t| TargetSummary::new(t.label))
        .collect();
    while let Some(outcome) = outcome_rx.recv().await {
        let label = match &outcome {
            FetchOutcome::Fetched(artifact) => artifact.source_target.unwrap_or_default(),
            FetchOutcome::NoMatchingWheel { target, .. }
            | FetchOutcome::Failed { target, .. } => target,
        };
        if let Some(i) = BUILTIN_TARGETS.iter().position(|t| t.label == label) {
            summaries[i].absorb(&outcome);
        }
    }

    while let Some(result) = tasks.join_next().await {
        if let Err(join_error) = result {
            if join_error.is_panic() {
                let panic_message = get_panic_message(join_error.into_panic());
                error!("Acquisition task panicked: {}", panic_message);
            }
        }
    }

    for summary in &summaries {
        event_tx
            .send(PipelineEvent::TargetFinished {
                summary: summary.clone(),
            })
            .ok();
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use wheelhouse_net::api::Digests;

    use super::*;

    fn release_file(filename: &str) -> ReleaseFile {
        ReleaseFile {
            filename: filename.to_string(),
            url: format!("https://files.example.org/{filename}"),
            size: Some(1024),
            digests: Digests::default(),
            packagetype: if filename.ends_with(".whl") {
                "bdist_wheel".into()
            } else {
                "sdist".into()
            },
            yanked: false,
        }
    }

    fn target(label: &str) -> &'static PlatformTarget {
        BUILTIN_TARGETS.iter().find(|t| t.label == label).unwrap()
    }

    #[test]
    fn selects_most_specific_platform_wheel() {
        let files = vec![
            release_file("cryptography-41.0.0.tar.gz"),
            release_file("cryptography-41.0.0-cp37-abi3-manylinux_2_17_x86_64.manylinux2014_x86_64.whl"),
            release_file("cryptography-41.0.0-cp37-abi3-manylinux2014_x86_64.whl"),
            release_file("cryptography-41.0.0-cp37-abi3-win_amd64.whl"),
        ];
        let requirement = Requirement::parse("cryptography==41.0.0").unwrap();
        let (chosen, _) = select_wheel(&files, &requirement, target("linux-amd64")).unwrap();
        assert!(chosen.filename.contains("manylinux_2_17_x86_64"));
        let (chosen_win, _) = select_wheel(&files, &requirement, target("win-amd64")).unwrap();
        assert_eq!(chosen_win.filename, "cryptography-41.0.0-cp37-abi3-win_amd64.whl");
    }

    #[test]
    fn falls_back_to_pure_wheel_for_binary_targets() {
        let files = vec![
            release_file("flask-2.3.0.tar.gz"),
            release_file("flask-2.3.0-py3-none-any.whl"),
        ];
        let requirement = Requirement::parse("Flask==2.3.0").unwrap();
        for t in BUILTIN_TARGETS {
            let (chosen, _) = select_wheel(&files, &requirement, t).unwrap();
            assert_eq!(chosen.filename, "flask-2.3.0-py3-none-any.whl");
        }
    }

    #[test]
    fn no_candidate_when_only_sdist_exists() {
        let files = vec![release_file("uwsgi-2.0.23.tar.gz")];
        let requirement = Requirement::parse("uwsgi==2.0.23").unwrap();
        assert!(select_wheel(&files, &requirement, target("linux-amd64")).is_none());
    }

    #[test]
    fn yanked_files_are_skipped() {
        let mut yanked = release_file("flask-2.3.0-py3-none-any.whl");
        yanked.yanked = true;
        let requirement = Requirement::parse("flask==2.3.0").unwrap();
        assert!(select_wheel(&[yanked], &requirement, target("noarch")).is_none());
    }

    #[test]
    fn version_mismatches_are_not_candidates() {
        let files = vec![release_file("flask-2.3.1-py3-none-any.whl")];
        let requirement = Requirement::parse("flask==2.3.0").unwrap();
        assert!(select_wheel(&files, &requirement, target("noarch")).is_none());
    }

    // Port 9 is unassigned; connection attempts fail immediately.
    fn offline_config(root: &Path) -> Config {
        Config {
            requirements_file: root.join("requirements.txt"),
            work_dir: root.join("work"),
            publish_root: root.join("publish"),
            upstream_api: "http://127.0.0.1:9/pypi".to_string(),
            jobs: 8,
        }
    }

    #[tokio::test]
    async fn stale_download_temps_are_swept_before_spawning() {
        let tmp = tempfile::tempdir().unwrap();
        let config = offline_config(tmp.path());
        let staging = config.target_staging_dir("linux-amd64");
        fs::create_dir_all(&staging).unwrap();
        let stale = staging.join(".flask-2.3.0-py3-none-any.whl.0.download");
        fs::write(&stale, b"partial bytes").unwrap();
        fs::write(staging.join("flask-2.3.0-py3-none-any.whl"), b"staged wheel").unwrap();

        let requirements = vec![Requirement::parse("flask==2.3.0").unwrap()];
        let (event_tx, _event_rx) = broadcast::channel(100);
        let summaries = acquire_all(&config, &requirements, &event_tx).await.unwrap();

        assert!(!stale.exists());
        assert!(staging.join("flask-2.3.0-py3-none-any.whl").exists());
        assert_eq!(summaries.len(), BUILTIN_TARGETS.len());
    }

    #[tokio::test]
    async fn duplicate_requirement_lines_get_their_own_outcomes() {
        let tmp = tempfile::tempdir().unwrap();
        let config = offline_config(tmp.path());
        let requirements = vec![
            Requirement::parse("Flask==2.3.0").unwrap(),
            Requirement::parse("flask==2.3.0").unwrap(),
        ];
        let (event_tx, _event_rx) = broadcast::channel(100);
        let summaries = acquire_all(&config, &requirements, &event_tx).await.unwrap();

        for summary in &summaries {
            assert_eq!(summary.attempted, 2, "target {}", summary.target);
            assert_eq!(summary.failed, 2);
            assert_eq!(summary.succeeded, 0);
        }
    }
}

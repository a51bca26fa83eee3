// wheelhouse-core/src/consolidate.rs
//! Merges per-target staging areas into the canonical artifact pool.
//!
//! Pure dedup-by-filename: no content inspection beyond parsing the name.
//! Same filename is assumed to be same content, so the first target in
//! catalog order to contribute a filename wins and later copies are
//! counted as duplicates.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use wheelhouse_common::config::Config;
use wheelhouse_common::error::{Error, Result};
use wheelhouse_common::model::{Artifact, ArtifactPool, DistFilename, BUILTIN_TARGETS};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Files newly copied into the pool this run.
    pub pooled: usize,
    /// Staged files skipped because their filename was already pooled.
    pub duplicates: usize,
    /// Files already present in the pool before this run.
    pub absorbed: usize,
}

/// Rebuilds the pool model from whatever the pool directory currently
/// holds. Used both to seed consolidation (re-runs against a non-empty
/// pool stay idempotent) and to drive index or verify runs on their own.
pub fn scan_pool(config: &Config) -> Result<ArtifactPool> {
    let pool_dir = config.pool_dir();
    let mut pool = ArtifactPool::new(pool_dir.clone());
    if !pool_dir.is_dir() {
        return Ok(pool);
    }
    for path in sorted_files(&pool_dir)? {
        let filename = file_name_string(&path);
        let Some(dist) = DistFilename::parse(&filename) else {
            warn!("Ignoring unrecognized file in pool: {}", filename);
            continue;
        };
        let size_bytes = fs::metadata(&path)?.len();
        pool.insert_if_absent(Artifact {
            filename: dist,
            path,
            size_bytes,
            sha256: None,
            source_target: None,
        });
    }
    Ok(pool)
}

/// Consolidates every target's staging area into the pool directory, in
/// catalog order, and returns the resulting pool plus merge counts.
pub fn consolidate(config: &Config) -> Result<(ArtifactPool, MergeStats)> {
    let pool_dir = config.pool_dir();
    fs::create_dir_all(&pool_dir).map_err(|e| {
        Error::IoError(format!(
            "Failed to create pool directory {}: {}",
            pool_dir.display(),
            e
        ))
    })?;

    let mut pool = scan_pool(config)?;
    let mut stats = MergeStats {
        absorbed: pool.len(),
        ..Default::default()
    };

    for target in BUILTIN_TARGETS {
        let staging = config.target_staging_dir(target.label);
        if !staging.is_dir() {
            debug!("No staging directory for {}, skipping", target.label);
            continue;
        }
        for path in sorted_files(&staging)? {
            let filename = file_name_string(&path);
            let Some(dist) = DistFilename::parse(&filename) else {
                warn!(
                    "Ignoring unrecognized file in {} staging: {}",
                    target.label, filename
                );
                continue;
            };
            if pool.contains(&filename) {
                stats.duplicates += 1;
                continue;
            }
            let dest = pool_dir.join(&filename);
            fs::copy(&path, &dest).map_err(|e| {
                Error::IoError(format!(
                    "Failed to copy {} into pool: {}",
                    path.display(),
                    e
                ))
            })?;
            let size_bytes = fs::metadata(&dest)?.len();
            pool.insert_if_absent(Artifact {
                filename: dist,
                path: dest,
                size_bytes,
                sha256: None,
                source_target: Some(target.label),
            });
            stats.pooled += 1;
        }
    }

    debug!(
        "Pool consolidated: {} pooled, {} duplicates, {} absorbed",
        stats.pooled, stats.duplicates, stats.absorbed
    );
    Ok((pool, stats))
}

/// Regular files in `dir`, sorted by name. Dotfiles (in-flight download
/// temps and editor droppings) are excluded.
fn sorted_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if file_name_string(&path).starts_with('.') {
            continue;
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}

fn file_name_string(path: &Path) -> String {
    path.file_name().unwrap_or_default().to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(root: &Path) -> Config {
        Config {
            requirements_file: root.join("requirements.txt"),
            work_dir: root.join("work"),
            publish_root: root.join("publish"),
            upstream_api: "https://pypi.org/pypi".to_string(),
            jobs: 8,
        }
    }

    fn stage(config: &Config, target: &str, filename: &str, content: &[u8]) {
        let dir = config.target_staging_dir(target);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(filename), content).unwrap();
    }

    #[test]
    fn earlier_target_wins_for_shared_filenames() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        stage(&config, "linux-amd64", "six-1.16.0-py2.py3-none-any.whl", b"linux copy");
        stage(&config, "noarch", "six-1.16.0-py2.py3-none-any.whl", b"noarch copy");

        let (pool, stats) = consolidate(&config).unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(stats.pooled, 1);
        assert_eq!(stats.duplicates, 1);
        let pooled = fs::read(config.pool_dir().join("six-1.16.0-py2.py3-none-any.whl")).unwrap();
        assert_eq!(pooled, b"linux copy");
        assert_eq!(
            pool.get("six-1.16.0-py2.py3-none-any.whl")
                .and_then(|a| a.source_target),
            Some("linux-amd64")
        );
    }

    #[test]
    fn rerun_is_an_idempotent_union() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        stage(&config, "linux-amd64", "flask-2.3.0-py3-none-any.whl", b"wheel bytes");
        stage(&config, "win-amd64", "click-8.1.7-py3-none-any.whl", b"other bytes");

        let (first_pool, first_stats) = consolidate(&config).unwrap();
        assert_eq!(first_stats.pooled, 2);
        assert_eq!(first_stats.absorbed, 0);

        let (second_pool, second_stats) = consolidate(&config).unwrap();
        assert_eq!(second_stats.pooled, 0);
        assert_eq!(second_stats.duplicates, 2);
        assert_eq!(second_stats.absorbed, 2);
        let first: Vec<String> = first_pool.filenames().map(str::to_string).collect();
        let second: Vec<String> = second_pool.filenames().map(str::to_string).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn unrecognized_staging_files_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        stage(&config, "noarch", "flask-2.3.0-py3-none-any.whl", b"wheel");
        stage(&config, "noarch", "notes.txt", b"not an artifact");
        stage(&config, "noarch", ".flask-2.3.0-py3-none-any.whl.4.download", b"partial");

        let (pool, stats) = consolidate(&config).unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(stats.pooled, 1);
        assert!(!config.pool_dir().join("notes.txt").exists());
    }

    #[test]
    fn missing_staging_directories_are_tolerated() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        let (pool, stats) = consolidate(&config).unwrap();
        assert!(pool.is_empty());
        assert_eq!(stats, MergeStats::default());
        assert_eq!(pool.dir(), config.pool_dir().as_path());
    }
}

// wheelhouse-core/src/publish.rs
//! Publication boundary: syncing the pool and index into a durable store.
//!
//! The store is an external collaborator; the pipeline only relies on
//! blob sync, index sync, and an index-scoped cache invalidation. The
//! bundled `FsStore` serves a directory tree, which is enough for rsync-
//! or nginx-backed mirrors and for exercising the pipeline end to end.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;
use wheelhouse_common::config::Config;
use wheelhouse_common::error::{Error, Result};
use wheelhouse_common::model::ArtifactPool;
use wheelhouse_net::validation::file_sha256;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCounts {
    pub uploaded: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub blobs: SyncCounts,
    pub index: SyncCounts,
}

/// A durable key-value blob store the mirror is published into.
pub trait BlobStore {
    /// Uploads pool files that are absent or changed remotely. Identical
    /// content is never re-uploaded; per-blob failures are counted and
    /// reported, not fatal.
    fn sync_blobs(&self, pool: &ArtifactPool) -> Result<SyncCounts>;

    /// Mirrors the local index tree exactly, removing remote entries that
    /// no longer exist locally.
    fn sync_index(&self, local_simple_dir: &Path) -> Result<SyncCounts>;

    /// Invalidates any edge cache for the index prefix. Artifacts are
    /// content-addressed by filename and never need invalidation.
    fn invalidate_index(&self) -> Result<()>;
}

/// Runs the publish stage against any store implementation.
pub fn publish<S: BlobStore>(
    store: &S,
    pool: &ArtifactPool,
    config: &Config,
) -> Result<PublishReport> {
    let blobs = store.sync_blobs(pool)?;
    let index = store.sync_index(&config.index_simple_dir())?;
    store.invalidate_index()?;
    Ok(PublishReport { blobs, index })
}

/// Prepares the publish root for first use: the directory skeleton plus a
/// marker identifying it as a mirror root. A non-empty directory that
/// carries no marker is refused unless `force` is set. Returns a fresh
/// configuration snapshot pointing at the canonicalized root; the input
/// snapshot is not touched.
pub fn provision(config: &Config, force: bool) -> Result<Config> {
    let root = config.publish_root();
    if !force && root.is_dir() && !config.mirror_marker_path().exists() {
        let occupied = fs::read_dir(root)
            .map_err(|e| Error::Publish(format!("Cannot inspect {}: {}", root.display(), e)))?
            .next()
            .is_some();
        if occupied {
            return Err(Error::Publish(format!(
                "Refusing to provision {}: directory is not empty and carries no mirror marker",
                root.display()
            )));
        }
    }

    for dir in [
        root.to_path_buf(),
        config.publish_packages_dir(),
        config.publish_simple_dir(),
    ] {
        fs::create_dir_all(&dir).map_err(|e| {
            Error::Publish(format!("Failed to create {}: {}", dir.display(), e))
        })?;
    }

    let marker = config.mirror_marker_path();
    if !marker.exists() {
        fs::write(&marker, b"").map_err(|e| {
            Error::Publish(format!("Failed to write marker {}: {}", marker.display(), e))
        })?;
        debug!("Provisioned mirror root at {}", root.display());
    }

    let canonical = fs::canonicalize(root)
        .map_err(|e| Error::Publish(format!("Cannot canonicalize {}: {}", root.display(), e)))?;
    Ok(config.with_publish_root(canonical))
}

/// Store backed by a plain directory tree under the publish root.
#[derive(Debug, Clone)]
pub struct FsStore {
    packages_dir: PathBuf,
    simple_dir: PathBuf,
}

impl FsStore {
    pub fn new(config: &Config) -> Self {
        Self {
            packages_dir: config.publish_packages_dir(),
            simple_dir: config.publish_simple_dir(),
        }
    }
}

impl BlobStore for FsStore {
    fn sync_blobs(&self, pool: &ArtifactPool) -> Result<SyncCounts> {
        fs::create_dir_all(&self.packages_dir).map_err(|e| {
            Error::Publish(format!(
                "Failed to create {}: {}",
                self.packages_dir.display(),
                e
            ))
        })?;

        let mut counts = SyncCounts::default();
        for artifact in pool.artifacts() {
            let dest = self.packages_dir.join(artifact.filename_str());
            // Filenames are content-addressed, so a size match means the
            // blob is already there.
            let unchanged = dest
                .metadata()
                .map(|m| m.len() == artifact.size_bytes)
                .unwrap_or(false);
            if unchanged {
                counts.skipped += 1;
                continue;
            }
            match fs::copy(&artifact.path, &dest) {
                Ok(_) => counts.uploaded += 1,
                Err(e) => {
                    warn!(
                        "Failed to publish blob {}: {}",
                        artifact.filename_str(),
                        e
                    );
                    counts.failed += 1;
                }
            }
        }
        Ok(counts)
    }

    fn sync_index(&self, local_simple_dir: &Path) -> Result<SyncCounts> {
        fs::create_dir_all(&self.simple_dir).map_err(|e| {
            Error::Publish(format!(
                "Failed to create {}: {}",
                self.simple_dir.display(),
                e
            ))
        })?;

        let mut counts = SyncCounts::default();

        for entry in WalkDir::new(local_simple_dir).min_depth(1) {
            let entry = entry.map_err(|e| {
                Error::Publish(format!("Failed to walk local index tree: {e}"))
            })?;
            let rel = entry
                .path()
                .strip_prefix(local_simple_dir)
                .expect("walked path is under its root");
            let dest = self.simple_dir.join(rel);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&dest).map_err(|e| {
                    Error::Publish(format!("Failed to create {}: {}", dest.display(), e))
                })?;
                continue;
            }
            let unchanged = dest.is_file()
                && matches!(
                    (file_sha256(entry.path()), file_sha256(&dest)),
                    (Ok(local), Ok(remote)) if local == remote
                );
            if unchanged {
                counts.skipped += 1;
                continue;
            }
            match fs::copy(entry.path(), &dest) {
                Ok(_) => counts.uploaded += 1,
                Err(e) => {
                    warn!("Failed to publish index file {}: {}", rel.display(), e);
                    counts.failed += 1;
                }
            }
        }

        // Full mirror semantics: anything remote without a local
        // counterpart is stale and gets removed.
        let mut stale_dirs = Vec::new();
        for entry in WalkDir::new(&self.simple_dir).min_depth(1) {
            let entry = entry.map_err(|e| {
                Error::Publish(format!("Failed to walk published index tree: {e}"))
            })?;
            let rel = entry
                .path()
                .strip_prefix(&self.simple_dir)
                .expect("walked path is under its root");
            if local_simple_dir.join(rel).exists() {
                continue;
            }
            if entry.file_type().is_dir() {
                stale_dirs.push(entry.path().to_path_buf());
            } else {
                match fs::remove_file(entry.path()) {
                    Ok(()) => counts.deleted += 1,
                    Err(e) => {
                        warn!("Failed to remove stale index file {}: {}", rel.display(), e);
                        counts.failed += 1;
                    }
                }
            }
        }
        for dir in stale_dirs.into_iter().rev() {
            if let Err(e) = fs::remove_dir(&dir) {
                debug!("Could not remove stale index directory {}: {}", dir.display(), e);
            }
        }

        Ok(counts)
    }

    fn invalidate_index(&self) -> Result<()> {
        // A plain directory tree has no edge cache in front of it.
        debug!("No cache to invalidate for filesystem store");
        Ok(())
    }
}

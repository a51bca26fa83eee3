// wheelhouse-common/src/model/artifact.rs
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::model::wheel::DistFilename;

/// One concrete artifact file in a staging area or the canonical pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub filename: DistFilename,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Digest of the local bytes, computed after download or on a pool
    /// scan. Upstream-reported digests are never stored here.
    pub sha256: Option<String>,
    /// Label of the platform target whose staging area contributed the
    /// file, when known.
    pub source_target: Option<&'static str>,
}

impl Artifact {
    pub fn filename_str(&self) -> &str {
        self.filename.raw()
    }

    pub fn normalized_name(&self) -> String {
        self.filename.normalized_name()
    }

    pub fn version(&self) -> &str {
        self.filename.version()
    }
}

/// The canonical deduplicated pool: `filename → Artifact`. Same filename
/// is treated as same content; the first writer for a filename wins and
/// is never replaced.
#[derive(Debug, Default)]
pub struct ArtifactPool {
    dir: PathBuf,
    entries: BTreeMap<String, Artifact>,
}

impl ArtifactPool {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            entries: BTreeMap::new(),
        }
    }

    /// Directory the pooled files live in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.entries.contains_key(filename)
    }

    pub fn get(&self, filename: &str) -> Option<&Artifact> {
        self.entries.get(filename)
    }

    /// Inserts unless the filename is already present. Returns whether the
    /// artifact was inserted.
    pub fn insert_if_absent(&mut self, artifact: Artifact) -> bool {
        match self.entries.entry(artifact.filename_str().to_string()) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(artifact);
                true
            }
        }
    }

    /// Artifacts in filename order.
    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.entries.values()
    }

    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

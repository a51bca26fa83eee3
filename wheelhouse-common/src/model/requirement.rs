// wheelhouse-common/src/model/requirement.rs

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::wheel::{normalize_name, versions_equal};

/// Version constraint carried by a requirement line. Locked exports pin
/// exact versions; a bare name is accepted and matches any version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionPin {
    Exact(String),
    Any,
}

/// One entry of the resolved requirement set, immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub name: String,
    pub pin: VersionPin,
    /// The source line as written, kept for reporting.
    pub raw: String,
}

impl Requirement {
    /// Parses a single requirements line. Returns `None` for lines that
    /// carry no requirement: blanks, `#` comments, and `-`-prefixed
    /// installer flags (`-r`, `--hash=...` continuations, `-e`).
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
            return None;
        }

        let token_end = line
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '[' | ']')))
            .unwrap_or(line.len());
        let token = &line[..token_end];
        // Extras select optional features of the same distribution; they
        // never change which artifact satisfies the requirement.
        let name = token.split('[').next().unwrap_or(token);
        if name.is_empty() {
            return None;
        }

        let rest = line[token_end..].trim_start();
        let pin = match rest.strip_prefix("==") {
            Some(spec) => {
                // `name == version` is legal; whitespace after the operator
                // must not leave an empty leading segment.
                let version: &str = spec
                    .trim_start()
                    .split([';', '#', ',', ' ', '\t'])
                    .next()
                    .unwrap_or("")
                    .trim();
                if version.is_empty() {
                    VersionPin::Any
                } else {
                    VersionPin::Exact(version.to_string())
                }
            }
            None => VersionPin::Any,
        };

        Some(Self {
            name: name.to_string(),
            pin,
            raw: line.to_string(),
        })
    }

    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }

    /// Whether an artifact encoding `version` satisfies this requirement.
    pub fn matches_version(&self, version: &str) -> bool {
        match &self.pin {
            VersionPin::Exact(pinned) => versions_equal(pinned, version),
            VersionPin::Any => true,
        }
    }
}

/// Parses a full requirements document. Duplicate names are preserved:
/// a lock export may legitimately pin the same distribution at several
/// versions for different environments.
pub fn parse_requirements(text: &str) -> Vec<Requirement> {
    text.lines().filter_map(Requirement::parse).collect()
}

/// Loads the requirement set from disk. A missing, unreadable, or
/// effectively empty file is fatal: nothing else may run without input.
pub fn load_requirements(path: &Path) -> Result<Vec<Requirement>> {
    let text = fs::read_to_string(path).map_err(|e| {
        Error::Input(format!(
            "cannot read requirements file '{}': {}",
            path.display(),
            e
        ))
    })?;
    let requirements = parse_requirements(&text);
    if requirements.is_empty() {
        return Err(Error::Input(format!(
            "requirements file '{}' contains no requirements",
            path.display()
        )));
    }
    Ok(requirements)
}

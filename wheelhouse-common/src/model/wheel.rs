// wheelhouse-common/src/model/wheel.rs
//! Structured parsing of distribution artifact filenames.
//!
//! Every downstream stage (acquisition, consolidation, indexing,
//! verification) keys off the information encoded in a wheel's filename, so
//! all of that string handling is concentrated here behind typed records.

use crate::error::{Error, Result};

/// Canonical form of a project name: lowercased, with any run of `-`, `_`
/// and `.` collapsed to a single `-`. Two names normalizing to the same
/// string are the same package for indexing purposes.
pub fn normalize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_run = false;
    for ch in raw.chars() {
        if matches!(ch, '-' | '_' | '.') {
            in_run = true;
            continue;
        }
        if in_run {
            out.push('-');
            in_run = false;
        }
        out.push(ch.to_ascii_lowercase());
    }
    if in_run {
        out.push('-');
    }
    out
}

/// Version equality under wheel filename escaping: `-` is stored as `_`
/// inside filename segments, and comparisons are case-insensitive.
pub fn versions_equal(a: &str, b: &str) -> bool {
    fn canon(v: &str) -> String {
        v.chars()
            .map(|c| if c == '_' { '-' } else { c.to_ascii_lowercase() })
            .collect()
    }
    canon(a) == canon(b)
}

/// A parsed `.whl` filename:
/// `{name}-{version}(-{build})?-{python}-{abi}-{platform}.whl`, where each
/// tag segment may carry several dot-compressed tags
/// (e.g. `py2.py3-none-any`, `...-manylinux_2_17_x86_64.manylinux2014_x86_64`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelFilename {
    pub raw: String,
    pub name: String,
    pub version: String,
    pub build: Option<String>,
    pub python_tags: Vec<String>,
    pub abi_tags: Vec<String>,
    pub platform_tags: Vec<String>,
}

impl WheelFilename {
    pub fn parse(filename: &str) -> Result<Self> {
        let stem = filename.strip_suffix(".whl").ok_or_else(|| {
            Error::Parse("wheel filename", format!("missing .whl suffix: {filename}"))
        })?;

        let parts: Vec<&str> = stem.split('-').collect();
        let (name, version, build, python, abi, platform) = match parts.len() {
            5 => (parts[0], parts[1], None, parts[2], parts[3], parts[4]),
            6 => (parts[0], parts[1], Some(parts[2]), parts[3], parts[4], parts[5]),
            n => {
                return Err(Error::Parse(
                    "wheel filename",
                    format!("expected 5 or 6 dash-separated segments, found {n}: {filename}"),
                ))
            }
        };

        if name.is_empty() || version.is_empty() {
            return Err(Error::Parse(
                "wheel filename",
                format!("empty name or version segment: {filename}"),
            ));
        }
        // Versions in wheel filenames are normalized and always lead with a
        // digit; anything else means the name carried an unescaped dash.
        if !version.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            return Err(Error::Parse(
                "wheel filename",
                format!("version must start with a digit: {filename}"),
            ));
        }
        if let Some(build_tag) = build {
            // Build tags are required to start with a digit.
            if !build_tag.chars().next().is_some_and(|c| c.is_ascii_digit()) {
                return Err(Error::Parse(
                    "wheel filename",
                    format!("build tag must start with a digit: {filename}"),
                ));
            }
        }

        let split_tags = |segment: &str, what: &'static str| -> Result<Vec<String>> {
            let tags: Vec<String> = segment
                .split('.')
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            if tags.is_empty() {
                return Err(Error::Parse(
                    "wheel filename",
                    format!("empty {what} tag segment: {filename}"),
                ));
            }
            Ok(tags)
        };

        Ok(Self {
            raw: filename.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            build: build.map(str::to_string),
            python_tags: split_tags(python, "python")?,
            abi_tags: split_tags(abi, "abi")?,
            platform_tags: split_tags(platform, "platform")?,
        })
    }

    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }

    /// True for universal pure-interpreter wheels (`*-none-any`).
    pub fn is_pure(&self) -> bool {
        self.abi_tags.iter().all(|t| t == "none")
            && self.platform_tags.iter().all(|t| t == "any")
    }

    /// Expands the compressed tag segments into every (python, abi,
    /// platform) combination this wheel claims to support.
    pub fn tag_triples(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.python_tags.iter().flat_map(move |py| {
            self.abi_tags.iter().flat_map(move |abi| {
                self.platform_tags
                    .iter()
                    .map(move |plat| (py.as_str(), abi.as_str(), plat.as_str()))
            })
        })
    }
}

/// Any artifact filename the pool may contain. The acquirer only ever
/// produces wheels; sdist names are recognized so that files dropped into
/// the pool by hand still get indexed under the right project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistFilename {
    Wheel(WheelFilename),
    Sdist {
        raw: String,
        name: String,
        version: String,
    },
}

impl DistFilename {
    /// Returns `None` for filenames that are not a recognizable
    /// distribution artifact.
    pub fn parse(filename: &str) -> Option<Self> {
        if filename.ends_with(".whl") {
            return WheelFilename::parse(filename).ok().map(DistFilename::Wheel);
        }
        let stem = filename
            .strip_suffix(".tar.gz")
            .or_else(|| filename.strip_suffix(".zip"))?;
        let (name, version) = split_sdist_stem(stem)?;
        Some(DistFilename::Sdist {
            raw: filename.to_string(),
            name: name.to_string(),
            version: version.to_string(),
        })
    }

    pub fn raw(&self) -> &str {
        match self {
            DistFilename::Wheel(w) => &w.raw,
            DistFilename::Sdist { raw, .. } => raw,
        }
    }

    pub fn normalized_name(&self) -> String {
        match self {
            DistFilename::Wheel(w) => w.normalized_name(),
            DistFilename::Sdist { name, .. } => normalize_name(name),
        }
    }

    pub fn version(&self) -> &str {
        match self {
            DistFilename::Wheel(w) => &w.version,
            DistFilename::Sdist { version, .. } => version,
        }
    }
}

/// An sdist stem is `{name}-{version}`; the name ends at the first `-`
/// that is immediately followed by a digit.
fn split_sdist_stem(stem: &str) -> Option<(&str, &str)> {
    let bytes = stem.as_bytes();
    for i in 0..bytes.len().saturating_sub(1) {
        if bytes[i] == b'-' && bytes[i + 1].is_ascii_digit() {
            if i == 0 {
                return None;
            }
            return Some((&stem[..i], &stem[i + 1..]));
        }
    }
    None
}

// wheelhouse-core/src/index.rs
//! Static simple-repository index generation over the canonical pool.
//!
//! Every run rebuilds the whole tree: digests are recomputed from the
//! pooled bytes, listing pages are rewritten atomically, and package
//! directories with no surviving artifacts are removed. Output is
//! byte-for-byte reproducible for an unchanged pool.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use threadpool::ThreadPool;
use tracing::debug;
use wheelhouse_common::config::Config;
use wheelhouse_common::error::{Error, Result};
use wheelhouse_common::model::ArtifactPool;
use wheelhouse_net::validation::file_sha256;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub packages: usize,
    pub artifacts: usize,
}

/// Builds the two-level index under `index/simple/`: a root listing of
/// normalized package names, and one listing per package linking each
/// artifact as `../../packages/{filename}#sha256={digest}`.
pub fn build_index(config: &Config, pool: &ArtifactPool) -> Result<IndexReport> {
    let digests = hash_pool(pool)?;

    let mut groups: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
    for artifact in pool.artifacts() {
        let filename = artifact.filename_str();
        let digest = digests.get(filename).cloned().ok_or_else(|| {
            Error::IndexWrite(format!("No digest computed for pooled file {filename}"))
        })?;
        groups
            .entry(artifact.normalized_name())
            .or_default()
            .push((filename.to_string(), digest));
    }

    let simple_dir = config.index_simple_dir();
    fs::create_dir_all(&simple_dir).map_err(|e| {
        Error::IndexWrite(format!(
            "Failed to create index directory {}: {}",
            simple_dir.display(),
            e
        ))
    })?;

    write_atomic(
        &simple_dir.join("index.html"),
        &render_root_page(groups.keys().map(String::as_str)),
    )?;

    for (name, files) in &groups {
        let pkg_dir = simple_dir.join(name);
        fs::create_dir_all(&pkg_dir).map_err(|e| {
            Error::IndexWrite(format!(
                "Failed to create package index directory {}: {}",
                pkg_dir.display(),
                e
            ))
        })?;
        write_atomic(&pkg_dir.join("index.html"), &render_package_page(name, files))?;
    }

    remove_stale_package_dirs(&simple_dir, &groups)?;

    let report = IndexReport {
        packages: groups.len(),
        artifacts: pool.len(),
    };
    debug!(
        "Generated index: {} packages, {} files",
        report.packages, report.artifacts
    );
    Ok(report)
}

/// Recomputes every pooled file's digest on a small worker pool. Digests
/// stored from earlier stages are deliberately not reused here; hashing
/// the bytes being served is what catches silent corruption.
fn hash_pool(pool: &ArtifactPool) -> Result<BTreeMap<String, String>> {
    let num_workers = std::cmp::max(1, num_cpus::get_physical().saturating_sub(1)).min(6);
    let workers = ThreadPool::new(num_workers);
    let (tx, rx) = crossbeam_channel::unbounded();

    for artifact in pool.artifacts() {
        let tx = tx.clone();
        let path = artifact.path.clone();
        let filename = artifact.filename_str().to_string();
        workers.execute(move || {
            let result = file_sha256(&path);
            let _ = tx.send((filename, result));
        });
    }
    drop(tx);

    let mut digests = BTreeMap::new();
    for (filename, result) in rx.iter() {
        let digest = result.map_err(|e| {
            Error::IoError(format!("Failed to hash pooled file {filename}: {e}"))
        })?;
        digests.insert(filename, digest);
    }
    workers.join();
    Ok(digests)
}

fn render_root_page<'a>(names: impl Iterator<Item = &'a str>) -> String {
    let links: Vec<String> = names
        .map(|name| format!("    <a href=\"{name}/\">{name}</a>"))
        .collect();
    format!(
        "<!DOCTYPE html>\n<html><head><title>Simple Index</title>\
         <meta name=\"api-version\" value=\"2\"/></head>\n\
         <body>\n{}\n</body></html>",
        links.join("\n")
    )
}

fn render_package_page(name: &str, files: &[(String, String)]) -> String {
    let links: Vec<String> = files
        .iter()
        .map(|(filename, sha)| {
            format!("    <a href=\"../../packages/{filename}#sha256={sha}\">{filename}</a>")
        })
        .collect();
    format!(
        "<!DOCTYPE html>\n<html><head><title>{name}</title>\
         <meta name=\"api-version\" value=\"2\"/></head>\n\
         <body>\n{}\n</body></html>",
        links.join("\n")
    )
}

/// Listing files land under their final name only after the full content
/// is on disk; a crash mid-write must not leave a truncated page.
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let file_name = path.file_name().unwrap_or_default().to_string_lossy();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    fs::write(&tmp, content).map_err(|e| {
        Error::IndexWrite(format!("Failed to write {}: {}", tmp.display(), e))
    })?;
    fs::rename(&tmp, path).map_err(|e| {
        Error::IndexWrite(format!(
            "Failed to move {} into place at {}: {}",
            tmp.display(),
            path.display(),
            e
        ))
    })?;
    Ok(())
}

fn remove_stale_package_dirs(
    simple_dir: &Path,
    groups: &BTreeMap<String, Vec<(String, String)>>,
) -> Result<()> {
    for entry in fs::read_dir(simple_dir)
        .map_err(|e| Error::IndexWrite(format!("Failed to list {}: {}", simple_dir.display(), e)))?
    {
        let entry = entry
            .map_err(|e| Error::IndexWrite(format!("Failed to list index entry: {e}")))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if !groups.contains_key(&name) {
            debug!("Removing stale package listing: {}", name);
            fs::remove_dir_all(&path).map_err(|e| {
                Error::IndexWrite(format!(
                    "Failed to remove stale listing {}: {}",
                    path.display(),
                    e
                ))
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::consolidate::scan_pool;

    fn test_config(root: &Path) -> Config {
        Config {
            requirements_file: root.join("requirements.txt"),
            work_dir: root.join("work"),
            publish_root: root.join("publish"),
            upstream_api: "https://pypi.org/pypi".to_string(),
            jobs: 8,
        }
    }

    fn pool_file(config: &Config, filename: &str, content: &[u8]) -> PathBuf {
        let dir = config.pool_dir();
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(filename);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn package_page_matches_expected_markup_exactly() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        pool_file(&config, "flask-2.3.0-py3-none-any.whl", b"abc");

        let pool = scan_pool(&config).unwrap();
        let report = build_index(&config, &pool).unwrap();
        assert_eq!(report, IndexReport { packages: 1, artifacts: 1 });

        let page =
            fs::read_to_string(config.index_simple_dir().join("flask").join("index.html")).unwrap();
        assert_eq!(
            page,
            "<!DOCTYPE html>\n\
             <html><head><title>flask</title><meta name=\"api-version\" value=\"2\"/></head>\n\
             <body>\n    <a href=\"../../packages/flask-2.3.0-py3-none-any.whl#sha256=\
             ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad\">\
             flask-2.3.0-py3-none-any.whl</a>\n</body></html>"
        );

        let root = fs::read_to_string(config.index_simple_dir().join("index.html")).unwrap();
        assert_eq!(
            root,
            "<!DOCTYPE html>\n\
             <html><head><title>Simple Index</title><meta name=\"api-version\" value=\"2\"/></head>\n\
             <body>\n    <a href=\"flask/\">flask</a>\n</body></html>"
        );
    }

    #[test]
    fn rebuilds_are_byte_identical() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        pool_file(&config, "click-8.1.7-py3-none-any.whl", b"click bytes");
        pool_file(
            &config,
            "cryptography-41.0.0-cp37-abi3-manylinux_2_17_x86_64.whl",
            b"crypto bytes",
        );

        let pool = scan_pool(&config).unwrap();
        build_index(&config, &pool).unwrap();
        let root_first = fs::read(config.index_simple_dir().join("index.html")).unwrap();
        let page_first =
            fs::read(config.index_simple_dir().join("click").join("index.html")).unwrap();

        build_index(&config, &pool).unwrap();
        let root_second = fs::read(config.index_simple_dir().join("index.html")).unwrap();
        let page_second =
            fs::read(config.index_simple_dir().join("click").join("index.html")).unwrap();

        assert_eq!(root_first, root_second);
        assert_eq!(page_first, page_second);
    }

    #[test]
    fn mixed_spellings_group_under_one_normalized_name() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        pool_file(&config, "Flask_Login-0.6.3-py3-none-any.whl", b"a");
        pool_file(&config, "flask.login-0.6.2.tar.gz", b"b");

        let pool = scan_pool(&config).unwrap();
        let report = build_index(&config, &pool).unwrap();
        assert_eq!(report.packages, 1);
        assert_eq!(report.artifacts, 2);

        let page = fs::read_to_string(
            config
                .index_simple_dir()
                .join("flask-login")
                .join("index.html"),
        )
        .unwrap();
        assert!(page.contains("Flask_Login-0.6.3-py3-none-any.whl"));
        assert!(page.contains("flask.login-0.6.2.tar.gz"));
    }

    #[test]
    fn stale_package_listings_are_removed_on_rebuild() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        let removed = pool_file(&config, "six-1.16.0-py2.py3-none-any.whl", b"six");
        pool_file(&config, "click-8.1.7-py3-none-any.whl", b"click");

        let pool = scan_pool(&config).unwrap();
        build_index(&config, &pool).unwrap();
        assert!(config.index_simple_dir().join("six").is_dir());

        fs::remove_file(removed).unwrap();
        let pool = scan_pool(&config).unwrap();
        build_index(&config, &pool).unwrap();
        assert!(!config.index_simple_dir().join("six").exists());
        let root = fs::read_to_string(config.index_simple_dir().join("index.html")).unwrap();
        assert!(!root.contains("six"));
        assert!(root.contains("click"));
    }

    #[test]
    fn empty_pool_still_writes_a_root_listing() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        let pool = scan_pool(&config).unwrap();
        let report = build_index(&config, &pool).unwrap();
        assert_eq!(report, IndexReport::default());
        let root = fs::read_to_string(config.index_simple_dir().join("index.html")).unwrap();
        assert!(root.contains("<title>Simple Index</title>"));
    }
}

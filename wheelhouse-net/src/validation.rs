// wheelhouse-net/src/validation.rs
use std::fs::File;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};
use url::Url;
use wheelhouse_common::error::{Error, Result};

/// Computes the hex sha256 digest of a file's bytes.
pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let bytes_copied = io::copy(&mut file, &mut hasher)?;
    let digest = hex::encode(hasher.finalize());
    tracing::debug!(
        "Calculated SHA256: {} ({} bytes read) for {}",
        digest,
        bytes_copied,
        path.display()
    );
    Ok(digest)
}

pub fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
    tracing::debug!("Verifying checksum for: {}", path.display());
    let actual = file_sha256(path)?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(Error::ChecksumMismatch(format!(
            "Checksum mismatch for {}: expected {}, got {}",
            path.display(),
            expected,
            actual
        )))
    }
}

/// Verifies that the detected content type of the file matches the expected
/// extension. Wheels are zip containers, so downloads are checked against
/// "zip" before being staged.
pub fn verify_content_type(path: &Path, expected_ext: &str) -> Result<()> {
    let kind_opt = infer::get_from_path(path)?;
    if let Some(kind) = kind_opt {
        let actual_ext = kind.extension();
        if actual_ext.eq_ignore_ascii_case(expected_ext) {
            Ok(())
        } else {
            Err(Error::Generic(format!(
                "Content type mismatch for {}: expected extension '{}', but detected '{}'",
                path.display(),
                expected_ext,
                actual_ext
            )))
        }
    } else {
        Err(Error::Generic(format!(
            "Could not determine content type for {}",
            path.display()
        )))
    }
}

/// Validates a URL, ensuring it uses the HTTPS scheme.
pub fn validate_url(url_str: &str) -> Result<()> {
    let url = Url::parse(url_str)
        .map_err(|e| Error::Generic(format!("Failed to parse URL '{url_str}': {e}")))?;
    if url.scheme() == "https" {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "Invalid URL scheme for '{}': Must be https, but got '{}'",
            url_str,
            url.scheme()
        )))
    }
}

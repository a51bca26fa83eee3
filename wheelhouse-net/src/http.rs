// wheelhouse-net/src/http.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use reqwest::header::{HeaderMap, ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};
use tokio::fs::File as TokioFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, warn};
use wheelhouse_common::error::{Error, Result};

use crate::validation::{file_sha256, validate_url, verify_content_type};

const DOWNLOAD_TIMEOUT_SECS: u64 = 300;
const CONNECT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT_STRING: &str =
    "wheelhouse mirror builder (Rust; +https://github.com/wheelhouse/wheelhouse)";

// Requirement lines that collapse to the same distribution resolve to the
// same filename in the same staging directory. Each call gets its own temp
// path so concurrent tasks never write through or rename each other's file.
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

fn next_temp_path(final_path: &Path, filename: &str) -> PathBuf {
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    final_path.with_file_name(format!(".{filename}.{seq}.download"))
}

pub fn build_http_client() -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, USER_AGENT_STRING.parse().unwrap());
    headers.insert(ACCEPT, "*/*".parse().unwrap());
    Client::builder()
        .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| Error::HttpError(format!("Failed to build HTTP client: {e}")))
}

/// A file materialized in a staging area, with the digest of the bytes as
/// they were written locally.
#[derive(Debug, Clone)]
pub struct StagedDownload {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub sha256: String,
}

enum AttemptError {
    Transient(Error),
    Fatal(Error),
}

/// Downloads `url` into `dest_dir/filename`, hashing the stream as it
/// arrives. An already-staged file whose digest matches the upstream
/// report is reused without a network round trip. Transient failures get
/// a bounded backoff retry; everything else is terminal for this artifact.
pub async fn download_wheel(
    client: &Client,
    url: &str,
    dest_dir: &Path,
    filename: &str,
    upstream_sha256: Option<&str>,
) -> Result<StagedDownload> {
    validate_url(url)?;
    fs::create_dir_all(dest_dir).map_err(|e| {
        Error::IoError(format!(
            "Failed to create staging directory {}: {}",
            dest_dir.display(),
            e
        ))
    })?;
    let final_path = dest_dir.join(filename);

    if final_path.is_file() {
        match file_sha256(&final_path) {
            Ok(local)
                if upstream_sha256.is_none_or(|expected| local.eq_ignore_ascii_case(expected)) =>
            {
                debug!("Reusing staged file: {}", final_path.display());
                let size_bytes = fs::metadata(&final_path)?.len();
                return Ok(StagedDownload {
                    path: final_path,
                    size_bytes,
                    sha256: local,
                });
            }
            Ok(_) => {
                debug!(
                    "Staged file digest mismatch ({}), redownloading",
                    final_path.display()
                );
                remove_quietly(&final_path);
            }
            Err(e) => {
                debug!(
                    "Could not hash staged file {}: {}. Redownloading.",
                    final_path.display(),
                    e
                );
                remove_quietly(&final_path);
            }
        }
    }

    const MAX_RETRIES: u8 = 2; // three attempts total
    let base_delay = Duration::from_millis(500);
    let mut delay = base_delay;
    let mut rng = SmallRng::from_os_rng();
    let temp_path = next_temp_path(&final_path, filename);

    for attempt in 0..=MAX_RETRIES {
        debug!(
            "Download attempt {}/{} for {}",
            attempt + 1,
            MAX_RETRIES + 1,
            url
        );
        match try_download(client, url, &final_path, &temp_path, filename, upstream_sha256).await {
            Ok(staged) => return Ok(staged),
            Err(AttemptError::Fatal(e)) => return Err(e),
            Err(AttemptError::Transient(e)) => {
                error!("Download attempt {} failed for {}: {}", attempt + 1, url, e);
                if attempt == MAX_RETRIES {
                    return Err(e);
                }
            }
        }
        let jitter = rng.random_range(0..(base_delay.as_millis() as u64 / 2));
        tokio::time::sleep(delay + Duration::from_millis(jitter)).await;
        delay *= 2;
    }

    Err(Error::Download(
        filename.to_string(),
        url.to_string(),
        "All download attempts failed.".to_string(),
    ))
}

async fn try_download(
    client: &Client,
    url: &str,
    final_path: &Path,
    temp_path: &Path,
    filename: &str,
    upstream_sha256: Option<&str>,
) -> std::result::Result<StagedDownload, AttemptError> {
    // Attempts within one call run serially, so this only ever removes this
    // call's own leftover from the previous attempt.
    if temp_path.exists() {
        if let Err(e) = fs::remove_file(temp_path) {
            warn!(
                "Could not remove existing temporary file {}: {}",
                temp_path.display(),
                e
            );
        }
    }

    let response = client.get(url).send().await.map_err(|e| {
        debug!("HTTP request failed for {url}: {e}");
        AttemptError::Transient(e.into())
    })?;
    let status = response.status();
    debug!("Received HTTP status: {} for {}", status, url);

    if !status.is_success() {
        let err = match status {
            StatusCode::NOT_FOUND => AttemptError::Fatal(Error::Download(
                filename.to_string(),
                url.to_string(),
                "Resource not found (404)".to_string(),
            )),
            StatusCode::FORBIDDEN => AttemptError::Fatal(Error::Download(
                filename.to_string(),
                url.to_string(),
                "Access forbidden (403)".to_string(),
            )),
            s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
                AttemptError::Transient(Error::HttpError(format!("HTTP error {s} for URL {url}")))
            }
            s => AttemptError::Fatal(Error::HttpError(format!("HTTP error {s} for URL {url}"))),
        };
        return Err(err);
    }

    let mut out = TokioFile::create(temp_path).await.map_err(|e| {
        AttemptError::Fatal(Error::IoError(format!(
            "Failed to create temp file {}: {}",
            temp_path.display(),
            e
        )))
    })?;
    let mut hasher = Sha256::new();
    let mut size_bytes: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let bytes = chunk.map_err(|e| AttemptError::Transient(e.into()))?;
        hasher.update(&bytes);
        out.write_all(&bytes).await.map_err(|e| {
            AttemptError::Fatal(Error::IoError(format!(
                "Failed to write download stream to {}: {}",
                temp_path.display(),
                e
            )))
        })?;
        size_bytes += bytes.len() as u64;
    }
    // The last buffered write may still be in flight until the flush.
    out.flush().await.map_err(|e| {
        AttemptError::Fatal(Error::IoError(format!(
            "Failed to flush {}: {}",
            temp_path.display(),
            e
        )))
    })?;
    drop(out);

    let local_sha256 = hex::encode(hasher.finalize());
    if let Some(expected) = upstream_sha256 {
        if !local_sha256.eq_ignore_ascii_case(expected) {
            remove_quietly(temp_path);
            // A corrupt transfer can complete with a success status; give
            // it the same bounded retry as a dropped connection.
            return Err(AttemptError::Transient(Error::ChecksumMismatch(format!(
                "Downloaded {} does not match upstream digest: expected {}, got {}",
                filename, expected, local_sha256
            ))));
        }
    }
    if filename.ends_with(".whl") {
        if let Err(e) = verify_content_type(temp_path, "zip") {
            remove_quietly(temp_path);
            return Err(AttemptError::Fatal(e));
        }
    }

    fs::rename(temp_path, final_path).map_err(|e| {
        AttemptError::Fatal(Error::IoError(format!(
            "Failed to move temp file {} to {}: {}",
            temp_path.display(),
            final_path.display(),
            e
        )))
    })?;
    debug!("Staged verified file at {}", final_path.display());

    Ok(StagedDownload {
        path: final_path.to_path_buf(),
        size_bytes,
        sha256: local_sha256,
    })
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        debug!("Failed to remove {}: {}", path.display(), e);
    }
}

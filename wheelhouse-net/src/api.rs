// wheelhouse-net/src/api.rs
//! Client for the upstream repository's per-release JSON metadata.

use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, error};
use wheelhouse_common::config::Config;
use wheelhouse_common::error::{Error, Result};

use crate::http::build_http_client;

/// One downloadable file of a release, as reported by the upstream
/// metadata endpoint.
#[derive(Deserialize, Debug, Clone)]
pub struct ReleaseFile {
    pub filename: String,
    pub url: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub digests: Digests,
    #[serde(default)]
    pub packagetype: String,
    #[serde(default)]
    pub yanked: bool,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Digests {
    #[serde(default)]
    pub sha256: Option<String>,
}

impl ReleaseFile {
    pub fn is_wheel(&self) -> bool {
        self.packagetype == "bdist_wheel" || self.filename.ends_with(".whl")
    }
}

#[derive(Deserialize, Debug)]
struct ReleaseMetadata {
    #[serde(default)]
    urls: Vec<ReleaseFile>,
}

/// Fetches release metadata from the upstream JSON API at
/// `{base}/{name}/{version}/json`.
#[derive(Debug, Clone)]
pub struct ReleaseClient {
    client: Client,
    base: String,
}

impl ReleaseClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
            base: config.upstream_api.trim_end_matches('/').to_string(),
        })
    }

    /// Lists the files published for one release; `None` asks for the
    /// project's latest release. A missing release is a typed `NotFound`;
    /// server errors and connectivity failures are retried with backoff
    /// before giving up.
    pub async fn release_files(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<Vec<ReleaseFile>> {
        let url = match version {
            Some(v) => format!("{}/{}/{}/json", self.base, name, v),
            None => format!("{}/{}/json", self.base, name),
        };
        let release_label = version.unwrap_or("latest");

        const MAX_RETRIES: u8 = 2; // three attempts total
        let base_delay = Duration::from_millis(200);
        let mut delay = base_delay;
        let mut rng = SmallRng::from_os_rng();

        for attempt in 0..=MAX_RETRIES {
            debug!(
                "Release metadata attempt {}/{} from {}",
                attempt + 1,
                MAX_RETRIES + 1,
                url
            );

            match self.client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    let meta: ReleaseMetadata = resp.json().await.map_err(|e| {
                        Error::Api(format!("Malformed release metadata from {url}: {e}"))
                    })?;
                    return Ok(meta.urls);
                }
                Ok(resp) if resp.status() == StatusCode::NOT_FOUND => {
                    return Err(Error::NotFound(format!(
                        "{name} {release_label} has no release upstream"
                    )));
                }
                Ok(resp) => {
                    let code = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    error!("Metadata fetch {}: {} - {}", attempt + 1, code, body);
                    if !is_retryable_status(code) || attempt == MAX_RETRIES {
                        return Err(Error::Api(format!(
                            "Upstream metadata endpoint {code} for {name} {release_label}"
                        )));
                    }
                }
                Err(e) => {
                    error!("Network error on metadata fetch {}: {}", attempt + 1, e);
                    if attempt == MAX_RETRIES {
                        return Err(Error::Http(std::sync::Arc::new(e)));
                    }
                }
            }

            let jitter = rng.random_range(0..(base_delay.as_millis() as u64 / 2));
            tokio::time::sleep(delay + Duration::from_millis(jitter)).await;
            delay *= 2;
        }

        Err(Error::Api(format!(
            "Failed to fetch release metadata for {name} {release_label} after {} attempts",
            MAX_RETRIES + 1
        )))
    }
}

fn is_retryable_status(code: StatusCode) -> bool {
    code.is_server_error() || code == StatusCode::TOO_MANY_REQUESTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_release_metadata_document() {
        let doc = r#"{
            "info": {"name": "flask", "version": "2.3.0"},
            "urls": [
                {
                    "filename": "flask-2.3.0-py3-none-any.whl",
                    "url": "https://files.example.org/flask-2.3.0-py3-none-any.whl",
                    "size": 96112,
                    "digests": {"md5": "aa", "sha256": "deadbeef"},
                    "packagetype": "bdist_wheel",
                    "yanked": false
                },
                {
                    "filename": "flask-2.3.0.tar.gz",
                    "url": "https://files.example.org/flask-2.3.0.tar.gz",
                    "digests": {},
                    "packagetype": "sdist"
                }
            ]
        }"#;
        let meta: ReleaseMetadata = serde_json::from_str(doc).unwrap();
        assert_eq!(meta.urls.len(), 2);
        let wheel = &meta.urls[0];
        assert!(wheel.is_wheel());
        assert_eq!(wheel.size, Some(96112));
        assert_eq!(wheel.digests.sha256.as_deref(), Some("deadbeef"));
        let sdist = &meta.urls[1];
        assert!(!sdist.is_wheel());
        assert_eq!(sdist.size, None);
        assert!(!sdist.yanked);
    }

    #[test]
    fn tolerates_missing_urls_array() {
        let meta: ReleaseMetadata = serde_json::from_str(r#"{"info": {}}"#).unwrap();
        assert!(meta.urls.is_empty());
    }
}

// wheelhouse-net/src/lib.rs
pub mod api;
pub mod http;
pub mod validation;

pub use api::{ReleaseClient, ReleaseFile};
pub use http::{build_http_client, download_wheel, StagedDownload};
pub use validation::{file_sha256, validate_url, verify_checksum, verify_content_type};

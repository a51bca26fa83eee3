// wheelhouse-common/src/model/mod.rs
pub mod artifact;
pub mod requirement;
pub mod target;
pub mod wheel;

pub use artifact::{Artifact, ArtifactPool};
pub use requirement::{load_requirements, parse_requirements, Requirement, VersionPin};
pub use target::{PlatformTarget, BUILTIN_TARGETS};
pub use wheel::{normalize_name, versions_equal, DistFilename, WheelFilename};

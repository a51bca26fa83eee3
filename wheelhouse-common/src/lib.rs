// wheelhouse-common/src/lib.rs
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;

pub use config::Config;
pub use error::{Error, Result};
pub use model::{Artifact, ArtifactPool, PlatformTarget, Requirement, BUILTIN_TARGETS};
pub use pipeline::{FetchOutcome, PipelineEvent, Stage, TargetSummary};

// wheelhouse-core/src/lib.rs
pub mod acquire;
pub mod consolidate;
pub mod index;
pub mod publish;
pub mod verify;

pub use acquire::{acquire_all, select_wheel};
pub use consolidate::{consolidate, scan_pool, MergeStats};
pub use index::{build_index, IndexReport};
pub use publish::{provision, publish, BlobStore, FsStore, PublishReport, SyncCounts};
pub use verify::{verify, RequirementCheck, VerificationReport};

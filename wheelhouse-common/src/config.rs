// wheelhouse-common/src/config.rs
use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::{Error, Result};

const DEFAULT_UPSTREAM_API: &str = "https://pypi.org/pypi";
const DEFAULT_WORK_DIR_NAME: &str = "wheelhouse";
const MIRROR_MARKER_FILENAME: &str = ".wheelhouse_mirror_v1";

/// Values a caller (the CLI) may pin before the configuration is built.
/// Anything left `None` falls back to the environment and then to defaults.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub requirements_file: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    pub publish_root: Option<PathBuf>,
    pub upstream_api: Option<String>,
    pub jobs: Option<usize>,
}

/// Immutable snapshot of one run's configuration. Built once in `main` and
/// passed by reference into every stage; infra-derived values are applied by
/// constructing a new snapshot (`with_publish_root`), never by mutating or
/// writing anything back.
#[derive(Debug, Clone)]
pub struct Config {
    pub requirements_file: PathBuf,
    pub work_dir: PathBuf,
    pub publish_root: PathBuf,
    pub upstream_api: String,
    pub jobs: usize,
}

impl Config {
    pub fn load(overrides: &Overrides) -> Result<Self> {
        debug!("Loading wheelhouse configuration");

        // A malformed WHEELHOUSE_JOBS falls back to the default, but an
        // explicit zero on the command line is refused.
        if overrides.jobs == Some(0) {
            return Err(Error::Config("jobs must be at least 1".to_string()));
        }

        let requirements_file = overrides
            .requirements_file
            .clone()
            .or_else(|| env_path("WHEELHOUSE_REQUIREMENTS"))
            .unwrap_or_else(|| PathBuf::from("requirements.txt"));

        let work_dir = overrides
            .work_dir
            .clone()
            .or_else(|| env_path("WHEELHOUSE_WORK_DIR"))
            .unwrap_or_else(default_work_dir);

        let publish_root = overrides
            .publish_root
            .clone()
            .or_else(|| env_path("WHEELHOUSE_PUBLISH_ROOT"))
            .unwrap_or_else(|| work_dir.join("mirror"));

        let upstream_api = overrides
            .upstream_api
            .clone()
            .or_else(|| env::var("WHEELHOUSE_UPSTREAM_API").ok().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| DEFAULT_UPSTREAM_API.to_string());

        let jobs = overrides
            .jobs
            .or_else(|| {
                env::var("WHEELHOUSE_JOBS")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
            })
            .filter(|j| *j > 0)
            .unwrap_or_else(default_jobs);

        let config = Self {
            requirements_file,
            work_dir,
            publish_root,
            upstream_api,
            jobs,
        };
        debug!(
            "Configuration loaded: work_dir={}, publish_root={}, upstream={}, jobs={}",
            config.work_dir.display(),
            config.publish_root.display(),
            config.upstream_api,
            config.jobs
        );
        Ok(config)
    }

    /// Returns a new snapshot with the publish root replaced by an
    /// infra-derived value (e.g. the canonicalized path reported back by
    /// store provisioning). The original snapshot is left untouched.
    pub fn with_publish_root(&self, publish_root: PathBuf) -> Self {
        Self {
            publish_root,
            ..self.clone()
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.work_dir.join("staging")
    }

    pub fn target_staging_dir(&self, target_label: &str) -> PathBuf {
        self.staging_dir().join(target_label)
    }

    pub fn pool_dir(&self) -> PathBuf {
        self.work_dir.join("pool")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.work_dir.join("index")
    }

    pub fn index_simple_dir(&self) -> PathBuf {
        self.index_dir().join("simple")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.work_dir.join("logs")
    }

    pub fn publish_root(&self) -> &Path {
        &self.publish_root
    }

    pub fn publish_packages_dir(&self) -> PathBuf {
        self.publish_root.join("packages")
    }

    pub fn publish_simple_dir(&self) -> PathBuf {
        self.publish_root.join("simple")
    }

    pub fn mirror_marker_path(&self) -> PathBuf {
        self.publish_root.join(MIRROR_MARKER_FILENAME)
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    env::var(var)
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

fn default_work_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join(DEFAULT_WORK_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(format!(".{DEFAULT_WORK_DIR_NAME}")))
}

/// Modest default for the acquisition worker pool.
fn default_jobs() -> usize {
    num_cpus::get().clamp(8, 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            requirements_file: PathBuf::from("/tmp/requirements.txt"),
            work_dir: PathBuf::from("/tmp/work"),
            publish_root: PathBuf::from("/tmp/publish"),
            upstream_api: DEFAULT_UPSTREAM_API.to_string(),
            jobs: 8,
        }
    }

    #[test]
    fn path_helpers_derive_from_work_dir() {
        let config = test_config();
        assert_eq!(config.staging_dir(), PathBuf::from("/tmp/work/staging"));
        assert_eq!(
            config.target_staging_dir("linux-amd64"),
            PathBuf::from("/tmp/work/staging/linux-amd64")
        );
        assert_eq!(config.pool_dir(), PathBuf::from("/tmp/work/pool"));
        assert_eq!(
            config.index_simple_dir(),
            PathBuf::from("/tmp/work/index/simple")
        );
    }

    #[test]
    fn publish_paths_derive_from_publish_root() {
        let config = test_config();
        assert_eq!(
            config.publish_packages_dir(),
            PathBuf::from("/tmp/publish/packages")
        );
        assert_eq!(
            config.publish_simple_dir(),
            PathBuf::from("/tmp/publish/simple")
        );
        assert_eq!(
            config.mirror_marker_path(),
            PathBuf::from("/tmp/publish/.wheelhouse_mirror_v1")
        );
    }

    #[test]
    fn explicit_zero_jobs_is_rejected() {
        let overrides = Overrides {
            jobs: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            Config::load(&overrides),
            Err(crate::error::Error::Config(_))
        ));
    }

    #[test]
    fn with_publish_root_returns_new_snapshot() {
        let config = test_config();
        let updated = config.with_publish_root(PathBuf::from("/srv/mirror"));
        assert_eq!(updated.publish_root(), Path::new("/srv/mirror"));
        assert_eq!(updated.work_dir(), config.work_dir());
        // original untouched
        assert_eq!(config.publish_root(), Path::new("/tmp/publish"));
    }
}

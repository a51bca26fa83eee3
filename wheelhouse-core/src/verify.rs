// wheelhouse-core/src/verify.rs
//! Cross-checks the canonical pool against the requirement set.
//!
//! A gap is an actionable warning, not a pipeline failure: a requirement
//! with no pooled artifact usually means no binary exists for a rare
//! platform, and one artifact of any kind satisfies the requirement for
//! every target.

use std::collections::BTreeMap;

use tracing::debug;
use wheelhouse_common::model::{Artifact, ArtifactPool, Requirement};

#[derive(Debug, Clone)]
pub struct RequirementCheck {
    pub requirement: Requirement,
    pub satisfied: bool,
    pub matching_artifacts: usize,
}

#[derive(Debug, Clone, Default)]
pub struct VerificationReport {
    pub checks: Vec<RequirementCheck>,
}

impl VerificationReport {
    pub fn satisfied_count(&self) -> usize {
        self.checks.iter().filter(|c| c.satisfied).count()
    }

    pub fn unsatisfied_count(&self) -> usize {
        self.checks.len() - self.satisfied_count()
    }

    pub fn unsatisfied(&self) -> impl Iterator<Item = &RequirementCheck> {
        self.checks.iter().filter(|c| !c.satisfied)
    }

    pub fn all_satisfied(&self) -> bool {
        self.unsatisfied_count() == 0
    }
}

/// A requirement is satisfied when at least one pooled artifact carries a
/// matching normalized name and a version accepted by its pin.
pub fn verify(requirements: &[Requirement], pool: &ArtifactPool) -> VerificationReport {
    let mut by_name: BTreeMap<String, Vec<&Artifact>> = BTreeMap::new();
    for artifact in pool.artifacts() {
        by_name
            .entry(artifact.normalized_name())
            .or_default()
            .push(artifact);
    }

    let checks = requirements
        .iter()
        .map(|requirement| {
            let matching_artifacts = by_name
                .get(&requirement.normalized_name())
                .map_or(0, |artifacts| {
                    artifacts
                        .iter()
                        .filter(|a| requirement.matches_version(a.version()))
                        .count()
                });
            if matching_artifacts == 0 {
                debug!("Unsatisfied requirement: {}", requirement.raw);
            }
            RequirementCheck {
                requirement: requirement.clone(),
                satisfied: matching_artifacts > 0,
                matching_artifacts,
            }
        })
        .collect();

    VerificationReport { checks }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use wheelhouse_common::model::{parse_requirements, DistFilename};

    use super::*;

    fn pool_with(filenames: &[&str]) -> ArtifactPool {
        let mut pool = ArtifactPool::new(PathBuf::from("/pool"));
        for filename in filenames {
            pool.insert_if_absent(Artifact {
                filename: DistFilename::parse(filename).unwrap(),
                path: PathBuf::from(filename),
                size_bytes: 1,
                sha256: None,
                source_target: None,
            });
        }
        pool
    }

    #[test]
    fn satisfied_iff_name_and_version_match() {
        let requirements = parse_requirements("Flask==2.3.0\nclick==8.1.7\nmissing==1.0\n");
        let pool = pool_with(&[
            "flask-2.3.0-py3-none-any.whl",
            "click-8.1.6-py3-none-any.whl",
        ]);
        let report = verify(&requirements, &pool);

        assert_eq!(report.checks.len(), 3);
        assert!(report.checks[0].satisfied);
        assert_eq!(report.checks[0].matching_artifacts, 1);
        // right name, wrong version
        assert!(!report.checks[1].satisfied);
        assert!(!report.checks[2].satisfied);
        assert_eq!(report.satisfied_count(), 1);
        assert_eq!(report.unsatisfied_count(), 2);
        assert!(!report.all_satisfied());
    }

    #[test]
    fn one_pure_artifact_satisfies_a_platform_heavy_requirement() {
        let requirements = parse_requirements("cryptography==41.0.0\n");
        let pool = pool_with(&[
            "cryptography-41.0.0-cp37-abi3-manylinux_2_17_x86_64.whl",
        ]);
        assert!(verify(&requirements, &pool).all_satisfied());
    }

    #[test]
    fn separator_and_case_differences_still_match() {
        let requirements = parse_requirements("Typing_Extensions==4.8.0\n");
        let pool = pool_with(&["typing.extensions-4.8.0-py3-none-any.whl"]);
        let report = verify(&requirements, &pool);
        assert!(report.all_satisfied());
    }

    #[test]
    fn sdists_in_the_pool_count_as_matches() {
        let requirements = parse_requirements("uwsgi==2.0.23\n");
        let pool = pool_with(&["uwsgi-2.0.23.tar.gz"]);
        assert!(verify(&requirements, &pool).all_satisfied());
    }

    #[test]
    fn multiple_artifacts_are_all_counted() {
        let requirements = parse_requirements("numpy==1.24.0\n");
        let pool = pool_with(&[
            "numpy-1.24.0-cp311-cp311-manylinux2014_x86_64.whl",
            "numpy-1.24.0-cp311-cp311-win_amd64.whl",
            "numpy-1.26.0-cp311-cp311-win_amd64.whl",
        ]);
        let report = verify(&requirements, &pool);
        assert_eq!(report.checks[0].matching_artifacts, 2);
    }
}

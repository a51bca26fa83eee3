// wheelhouse-common/src/model/target.rs
//! The fixed catalog of platform targets the mirror is built for, and the
//! tag-compatibility rules that decide which wheels serve which target.

use crate::model::wheel::WheelFilename;

/// One (platform, architecture, interpreter) combination wheels are
/// collected for. `platform_tags` is ordered most-preferred first and is
/// consulted both for compatibility and for ranking candidate wheels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformTarget {
    pub label: &'static str,
    pub python_tag: &'static str,
    pub abi_tag: &'static str,
    pub platform_tags: &'static [&'static str],
    /// Targets with `binary_only = false` accept only universal
    /// `*-none-any` wheels.
    pub binary_only: bool,
}

/// Catalog order is the consolidation merge order. The universal target
/// sits last so that platform-specific staging directories win ties for a
/// filename that appears in several of them.
pub const BUILTIN_TARGETS: &[PlatformTarget] = &[
    PlatformTarget {
        label: "linux-amd64",
        python_tag: "cp311",
        abi_tag: "cp311",
        platform_tags: &[
            "manylinux_2_28_x86_64",
            "manylinux_2_17_x86_64",
            "manylinux2014_x86_64",
            "manylinux2010_x86_64",
            "manylinux1_x86_64",
        ],
        binary_only: true,
    },
    PlatformTarget {
        label: "linux-arm64",
        python_tag: "cp311",
        abi_tag: "cp311",
        platform_tags: &[
            "manylinux_2_28_aarch64",
            "manylinux_2_17_aarch64",
            "manylinux2014_aarch64",
        ],
        binary_only: true,
    },
    PlatformTarget {
        label: "macos-amd64",
        python_tag: "cp311",
        abi_tag: "cp311",
        platform_tags: &[
            "macosx_12_0_x86_64",
            "macosx_11_0_x86_64",
            "macosx_10_9_x86_64",
            "macosx_12_0_universal2",
            "macosx_11_0_universal2",
            "macosx_10_9_universal2",
        ],
        binary_only: true,
    },
    PlatformTarget {
        label: "macos-arm64",
        python_tag: "cp311",
        abi_tag: "cp311",
        platform_tags: &[
            "macosx_12_0_arm64",
            "macosx_11_0_arm64",
            "macosx_12_0_universal2",
            "macosx_11_0_universal2",
            "macosx_10_9_universal2",
        ],
        binary_only: true,
    },
    PlatformTarget {
        label: "win-amd64",
        python_tag: "cp311",
        abi_tag: "cp311",
        platform_tags: &["win_amd64"],
        binary_only: true,
    },
    PlatformTarget {
        label: "noarch",
        python_tag: "py3",
        abi_tag: "none",
        platform_tags: &["any"],
        binary_only: false,
    },
];

impl PlatformTarget {
    /// Whether any tag triple of `wheel` is installable on this target.
    pub fn supports(&self, wheel: &WheelFilename) -> bool {
        wheel
            .tag_triples()
            .any(|(py, abi, plat)| self.triple_ok(py, abi, plat))
    }

    /// Ranks a compatible wheel for selection. Lower is better: the index
    /// of the most specific matching platform tag, with universal wheels
    /// ranked after every platform-specific one. `None` means incompatible.
    pub fn preference(&self, wheel: &WheelFilename) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (py, abi, plat) in wheel.tag_triples() {
            if !self.triple_ok(py, abi, plat) {
                continue;
            }
            let rank = if plat == "any" {
                self.platform_tags.len()
            } else {
                self.platform_tags.iter().position(|t| *t == plat)?
            };
            best = Some(best.map_or(rank, |b| b.min(rank)));
        }
        best
    }

    fn triple_ok(&self, py: &str, abi: &str, plat: &str) -> bool {
        if !self.binary_only {
            return plat == "any" && abi == "none" && self.python_ok(py, abi);
        }
        self.platform_ok(plat) && self.abi_ok(abi) && self.python_ok(py, abi)
    }

    fn platform_ok(&self, plat: &str) -> bool {
        plat == "any" || self.platform_tags.contains(&plat)
    }

    fn abi_ok(&self, abi: &str) -> bool {
        abi == "none" || abi == self.abi_tag || (abi == "abi3" && self.is_cpython())
    }

    fn python_ok(&self, py: &str, abi: &str) -> bool {
        if py == self.python_tag {
            return true;
        }
        let Some((t_major, t_minor)) = interpreter_version(self.python_tag) else {
            return false;
        };
        let Some((w_major, w_minor)) = interpreter_version(py) else {
            return false;
        };
        if w_major != t_major {
            return false;
        }
        if py.starts_with("py") {
            // Generic interpreter tags are forward-compatible: py3 and any
            // py3X with X at or below the target's minor are fine.
            return match (w_minor, t_minor) {
                (None, _) | (Some(_), None) => true,
                (Some(w), Some(t)) => w <= t,
            };
        }
        if py.starts_with("cp") && self.is_cpython() && matches!(abi, "abi3" | "none") {
            // Stable-ABI wheels built against an older CPython run on every
            // later one.
            return match (w_minor, t_minor) {
                (Some(w), Some(t)) => w <= t,
                (None, _) => true,
                (Some(_), None) => false,
            };
        }
        false
    }

    fn is_cpython(&self) -> bool {
        self.python_tag.starts_with("cp")
    }
}

/// Splits an interpreter tag like `cp311` into `(3, Some(11))`; `py3`
/// yields `(3, None)`.
fn interpreter_version(tag: &str) -> Option<(u32, Option<u32>)> {
    let digits = tag.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    if digits.is_empty() || digits.len() == tag.len() {
        return None;
    }
    let mut chars = digits.chars();
    let major = chars.next()?.to_digit(10)?;
    let rest = chars.as_str();
    if rest.is_empty() {
        return Some((major, None));
    }
    rest.parse::<u32>().ok().map(|minor| (major, Some(minor)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(label: &str) -> &'static PlatformTarget {
        BUILTIN_TARGETS
            .iter()
            .find(|t| t.label == label)
            .expect("unknown target label")
    }

    fn wheel(filename: &str) -> WheelFilename {
        WheelFilename::parse(filename).expect("test wheel filename must parse")
    }

    #[test]
    fn universal_target_is_last_in_catalog() {
        assert_eq!(BUILTIN_TARGETS.last().map(|t| t.label), Some("noarch"));
    }

    #[test]
    fn exact_interpreter_and_platform_match() {
        let linux = target("linux-amd64");
        assert!(linux.supports(&wheel("numpy-1.24.0-cp311-cp311-manylinux2014_x86_64.whl")));
        assert!(!linux.supports(&wheel("numpy-1.24.0-cp311-cp311-win_amd64.whl")));
        assert!(!linux.supports(&wheel("numpy-1.24.0-cp312-cp312-manylinux2014_x86_64.whl")));
    }

    #[test]
    fn stable_abi_wheels_run_on_newer_interpreters() {
        let linux = target("linux-amd64");
        assert!(linux.supports(&wheel(
            "cryptography-41.0.0-cp37-abi3-manylinux_2_17_x86_64.manylinux2014_x86_64.whl"
        )));
        // abi3 built against a NEWER interpreter does not run on ours.
        assert!(!linux.supports(&wheel(
            "cryptography-41.0.0-cp312-abi3-manylinux_2_17_x86_64.whl"
        )));
        // A versioned ABI never crosses interpreter versions.
        assert!(!linux.supports(&wheel(
            "cryptography-41.0.0-cp37-cp37m-manylinux_2_17_x86_64.whl"
        )));
    }

    #[test]
    fn pure_wheels_satisfy_every_target() {
        let pure = wheel("flask-2.3.0-py3-none-any.whl");
        for t in BUILTIN_TARGETS {
            assert!(t.supports(&pure), "{} should accept pure wheel", t.label);
        }
    }

    #[test]
    fn universal_target_rejects_binary_wheels() {
        let noarch = target("noarch");
        assert!(!noarch.supports(&wheel("numpy-1.24.0-cp311-cp311-manylinux2014_x86_64.whl")));
        assert!(!noarch.supports(&wheel("pkg-1.0-cp311-none-any.whl")));
        assert!(noarch.supports(&wheel("six-1.16.0-py2.py3-none-any.whl")));
    }

    #[test]
    fn generic_minor_tags_bound_by_target_interpreter() {
        let linux = target("linux-amd64");
        assert!(linux.supports(&wheel("pkg-1.0-py36-none-any.whl")));
        assert!(!linux.supports(&wheel("pkg-1.0-py312-none-any.whl")));
    }

    #[test]
    fn universal2_macos_wheels_serve_both_architectures() {
        let mac_wheel = wheel("pydantic_core-2.14.0-cp311-cp311-macosx_11_0_universal2.whl");
        assert!(target("macos-amd64").supports(&mac_wheel));
        assert!(target("macos-arm64").supports(&mac_wheel));
        assert!(!target("linux-amd64").supports(&mac_wheel));
    }

    #[test]
    fn preference_ranks_specific_platforms_before_universal() {
        let linux = target("linux-amd64");
        let specific = wheel("numpy-1.24.0-cp311-cp311-manylinux_2_17_x86_64.whl");
        let older = wheel("numpy-1.24.0-cp311-cp311-manylinux1_x86_64.whl");
        let pure = wheel("numpy_stub-1.24.0-py3-none-any.whl");
        let s = linux.preference(&specific).unwrap();
        let o = linux.preference(&older).unwrap();
        let p = linux.preference(&pure).unwrap();
        assert!(s < o, "newer manylinux tag should rank first");
        assert!(o < p, "any platform-specific wheel beats a pure one");
        assert_eq!(linux.preference(&wheel("pkg-1.0-cp311-cp311-win_amd64.whl")), None);
    }

    #[test]
    fn compressed_platform_tags_rank_by_best_member() {
        let linux = target("linux-amd64");
        let multi = wheel(
            "cryptography-41.0.0-cp37-abi3-manylinux_2_17_x86_64.manylinux2014_x86_64.whl",
        );
        assert_eq!(
            linux.preference(&multi),
            linux.preference(&wheel("x-1.0-cp311-cp311-manylinux_2_17_x86_64.whl"))
        );
    }
}

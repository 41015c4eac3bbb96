//! Finding an accelerator's C sources among several checked-out copies.
//!
//! A package may sit next to one or more copies of its accelerator tree:
//! under `src/rl_addons`, beside the package, a couple of levels up, or in
//! versioned siblings such as `renderPM-4.0/renderPM`. Resolution is split
//! into three steps so the ranking can be tested without a filesystem:
//!
//! 1. [`candidate_paths`] lists where a tree might be (no I/O besides glob).
//! 2. [`probe_candidate`] reads the marker file's `VERSION` tag and mtime.
//! 3. [`select_best`] picks the newest probed candidate.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info};

use crate::paths::{normalize, relative_path};
use crate::version::{compare_versions, define_string};

/// Directory holding the accelerator trees inside a source checkout.
pub const ADDONS_DIR: &str = "rl_addons";

/// A candidate that passed [`probe_candidate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCandidate {
    /// Candidate directory relative to the package root, as generated
    pub relative: PathBuf,
    /// `VERSION` tag of the marker file, empty when it has none
    pub version: String,
    /// Modification time of the marker file
    pub modified: SystemTime,
}

/// The tree chosen by [`find_source_tree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTree {
    /// Canonical absolute location
    pub absolute: PathBuf,
    /// `absolute` expressed relative to the package root
    pub relative: PathBuf,
    /// `VERSION` tag of the marker file
    pub version: String,
}

/// Fixed search patterns for `module_dir`, highest priority first.
pub fn fixed_candidates(module_dir: &str) -> Vec<PathBuf> {
    let addons = Path::new(ADDONS_DIR);
    vec![
        Path::new("src").join(addons).join(module_dir),
        addons.join(module_dir),
        Path::new("..").join(addons).join(module_dir),
        Path::new("../..").join(addons).join(module_dir),
        PathBuf::from(module_dir),
        Path::new("..").join(module_dir),
        Path::new("../..").join(module_dir),
    ]
}

/// Versioned siblings (`<module_dir>-*/<module_dir>`) at the package root
/// and up to two levels above it, each level in glob order.
pub fn versioned_candidates(package_root: &Path, module_dir: &str) -> Vec<PathBuf> {
    let root = glob::Pattern::escape(&package_root.to_string_lossy());
    let mut out = Vec::new();
    for up in ["", "../", "../../"] {
        let pattern = format!("{root}/{up}{module_dir}-*/{module_dir}");
        let Ok(paths) = glob::glob(&pattern) else {
            continue;
        };
        for hit in paths.filter_map(Result::ok) {
            if let Ok(rel) = hit.strip_prefix(package_root) {
                out.push(rel.to_path_buf());
            }
        }
    }
    out
}

/// Every place a `module_dir` tree may live, highest priority first.
pub fn candidate_paths(package_root: &Path, module_dir: &str) -> Vec<PathBuf> {
    let mut all = fixed_candidates(module_dir);
    all.extend(versioned_candidates(package_root, module_dir));
    all
}

/// Read the version tag and mtime of `<package_root>/<candidate>/<marker>`.
///
/// Returns `None` if the marker is missing or unreadable.
pub fn probe_candidate(package_root: &Path, candidate: &Path, marker: &str) -> Option<SourceCandidate> {
    let file = package_root.join(candidate).join(marker);
    let text = fs::read_to_string(&file).ok()?;
    let modified = fs::metadata(&file).and_then(|m| m.modified()).ok()?;
    Some(SourceCandidate {
        relative: candidate.to_path_buf(),
        version: define_string(&text, "VERSION").unwrap_or_default(),
        modified,
    })
}

/// Ordering used by [`select_best`]: mtime, then version tag.
pub fn rank(a: &SourceCandidate, b: &SourceCandidate) -> Ordering {
    a.modified
        .cmp(&b.modified)
        .then_with(|| compare_versions(&a.version, &b.version))
}

/// The highest ranked candidate. On a full tie the earlier one wins.
pub fn select_best<I>(candidates: I) -> Option<SourceCandidate>
where
    I: IntoIterator<Item = SourceCandidate>,
{
    candidates.into_iter().fold(None, |best, c| match best {
        Some(b) if rank(&c, &b) != Ordering::Greater => Some(b),
        _ => Some(c),
    })
}

/// Locate the newest `module_dir` tree containing `marker`.
///
/// `None` means the module cannot be built here; it is not an error.
pub fn find_source_tree(package_root: &Path, module_dir: &str, marker: &str) -> Option<SourceTree> {
    let mut seen: Vec<PathBuf> = Vec::new();
    let probed: Vec<SourceCandidate> = candidate_paths(package_root, module_dir)
        .into_iter()
        .filter_map(|c| probe_candidate(package_root, &c, marker))
        .filter(|c| {
            // the same tree can be reachable through two patterns
            let key = normalize(&package_root.join(&c.relative));
            if seen.contains(&key) {
                false
            } else {
                seen.push(key);
                true
            }
        })
        .collect();
    debug!(module = module_dir, count = probed.len(), "probed source candidates");

    let best = select_best(probed)?;
    let joined = package_root.join(&best.relative);
    let absolute = fs::canonicalize(&joined).unwrap_or_else(|_| normalize(&joined));
    let root = fs::canonicalize(package_root).unwrap_or_else(|_| normalize(package_root));
    let relative = relative_path(&root, &absolute);
    info!(module = module_dir, path = %relative.display(), version = %best.version, "selected source tree");

    Some(SourceTree {
        absolute,
        relative,
        version: best.version,
    })
}

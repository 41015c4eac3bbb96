//! Locating an installed library's headers and binaries.
//!
//! The search runs in two phases:
//!
//! 1. **Candidates.** Build two ordered directory lists (include, library)
//!    from the explicit overrides, the platform's vendor locations (see
//!    [`conventions`]), the generic Unix prefixes, the multiarch library
//!    directories and finally the active installation prefix. A directory
//!    is kept only if it exists, and only its first occurrence counts.
//! 2. **Narrowing.** Library directories without a matching `lib<name>*`
//!    artifact are dropped. Include directories are scanned in order
//!    (recursively, following symlinks) for the marker header; the first
//!    hit decides the final include pair and stops the scan.
//!
//! Failing to find the marker is fatal: nothing that needs this library can
//! be compiled without it.

pub mod conventions;

use std::path::{Path, PathBuf};

use accelspec_schema::{LibraryLocation, Target};
use thiserror::Error;
use tracing::{debug, info};

use crate::infolog::InfoLog;
use crate::io::cache::{CacheError, ResourceProvider};
use crate::version::{self, VersionScheme};

pub use conventions::{PathConventions, conventions_for};

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("cannot find {marker} in any of {} include directories", searched.len())]
    MarkerNotFound {
        marker: &'static str,
        searched: Vec<PathBuf>,
    },

    #[error("Support bundle unavailable: {0}")]
    Cache(#[from] CacheError),
}

/// What to look for when probing for one library.
#[derive(Debug, Clone, Copy)]
pub struct LibraryProbe {
    /// Link name (`freetype` for `libfreetype.*`)
    pub name: &'static str,
    /// Header whose location anchors the include search
    pub marker: &'static str,
    /// Header, below the marker's directory, that carries the version
    pub version_header: &'static str,
    /// How to read the version out of `version_header`
    pub scheme: &'static VersionScheme,
    /// Reported version when it cannot be parsed
    pub default_version: &'static str,
}

impl LibraryProbe {
    /// FreeType 2: anchored on `ft2build.h`, versioned by `freetype.h`.
    pub fn freetype() -> Self {
        Self {
            name: "freetype",
            marker: "ft2build.h",
            version_header: "freetype.h",
            scheme: &version::FREETYPE,
            default_version: "22",
        }
    }
}

/// An ordered, existence-checked list of directories without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchDirs {
    dirs: Vec<PathBuf>,
}

impl SearchDirs {
    /// Append `dir` if it is an existing directory not already listed.
    /// Returns whether it was added.
    pub fn add(&mut self, dir: impl Into<PathBuf>) -> bool {
        let dir = dir.into();
        if dir.as_os_str().is_empty() || !dir.is_dir() || self.dirs.contains(&dir) {
            return false;
        }
        self.dirs.push(dir);
        true
    }

    /// Keep only the directories for which `keep` returns true.
    pub fn retain(&mut self, keep: impl FnMut(&PathBuf) -> bool) {
        self.dirs.retain(keep);
    }

    pub fn as_slice(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn into_vec(self) -> Vec<PathBuf> {
        self.dirs
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}

/// Include and library candidates, highest priority first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateDirs {
    pub include: SearchDirs,
    pub library: SearchDirs,
}

/// Everything the probe needs to know about the machine it searches.
pub struct ProbeEnv<'a> {
    /// Host description
    pub target: Target,
    /// Root that well-known absolute paths (`/usr/include`, ...) are resolved under
    pub sysroot: PathBuf,
    /// Extraction root for bundles shared across checkouts
    pub shared_cache_dir: PathBuf,
    /// Prefix of the active installation, searched last
    pub install_prefix: Option<PathBuf>,
    /// Explicit library directory, searched first
    pub lib_override: Option<PathBuf>,
    /// Explicit include directory, searched first
    pub inc_override: Option<PathBuf>,
    /// Source of prebuilt support bundles
    pub resources: &'a dyn ResourceProvider,
}

impl std::fmt::Debug for ProbeEnv<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeEnv")
            .field("target", &self.target)
            .field("sysroot", &self.sysroot)
            .field("install_prefix", &self.install_prefix)
            .finish_non_exhaustive()
    }
}

impl ProbeEnv<'_> {
    /// Resolve a well-known absolute path such as `/usr/local/lib` under the sysroot.
    pub fn well_known(&self, path: &str) -> PathBuf {
        self.sysroot.join(path.trim_start_matches('/'))
    }
}

/// Runs the two-phase search for one platform.
#[derive(Debug)]
pub struct Prober<'a> {
    env: &'a ProbeEnv<'a>,
    conventions: &'a dyn PathConventions,
}

impl<'a> Prober<'a> {
    pub fn new(env: &'a ProbeEnv<'a>, conventions: &'a dyn PathConventions) -> Self {
        Self { env, conventions }
    }

    /// Phase 1: the ordered candidate directories.
    ///
    /// # Errors
    ///
    /// Propagates a fatal [`CacheError`] from a vendor bundle download.
    pub fn candidate_dirs(&self, log: &mut InfoLog) -> Result<CandidateDirs, ProbeError> {
        let env = self.env;
        let mut dirs = CandidateDirs::default();

        if let Some(lib) = &env.lib_override {
            dirs.library.add(lib);
        }
        if let Some(inc) = &env.inc_override {
            dirs.include.add(inc);
        }

        debug!(conventions = self.conventions.name(), "collecting candidate dirs");
        self.conventions.vendor_dirs(env, &mut dirs, log)?;

        dirs.include.add(env.well_known("/usr/local/include"));
        dirs.library.add(env.well_known("/usr/local/lib"));
        dirs.include.add(env.well_known("/usr/include"));
        dirs.library.add(env.well_known("/usr/lib"));
        dirs.include.add(env.well_known("/usr/include/freetype2"));

        for lib in self.conventions.multiarch_lib_dirs(&env.target) {
            dirs.library.add(env.well_known(lib));
        }

        if let Some(prefix) = &env.install_prefix {
            dirs.library.add(prefix.join("lib"));
            dirs.include.add(prefix.join("include"));
        }

        debug!(
            include = ?dirs.include.as_slice(),
            library = ?dirs.library.as_slice(),
            "candidate directories"
        );
        Ok(dirs)
    }

    /// Find `lib`'s headers and libraries.
    ///
    /// With `library_name` set, library directories are narrowed to those
    /// holding a `lib<name>*` artifact.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::MarkerNotFound`] when no include candidate
    /// contains the marker header.
    pub fn locate(
        &self,
        lib: &LibraryProbe,
        library_name: Option<&str>,
        log: &mut InfoLog,
    ) -> Result<LibraryLocation, ProbeError> {
        let mut dirs = self.candidate_dirs(log)?;

        if let Some(name) = library_name {
            dirs.library.retain(|d| has_library(d, name));
        }

        let Some((dir, marker)) = first_marker(dirs.include.as_slice(), |d| find_file(d, lib.marker))
        else {
            return Err(ProbeError::MarkerNotFound {
                marker: lib.marker,
                searched: dirs.include.into_vec(),
            });
        };
        info!(dir = %dir.display(), marker = %marker.display(), "found marker header");

        let marker_dir = marker.parent().map_or_else(|| dir.clone(), Path::to_path_buf);
        let root = marker_dir
            .parent()
            .map_or_else(|| marker_dir.clone(), Path::to_path_buf);

        let version = find_file(&marker_dir, lib.version_header)
            .and_then(|h| std::fs::read_to_string(h).ok())
            .map_or_else(
                || lib.default_version.to_string(),
                |text| lib.scheme.parse(&text, lib.default_version),
            );

        Ok(LibraryLocation {
            version,
            include_dirs: vec![root, marker_dir],
            library_dirs: dirs.library.into_vec(),
        })
    }
}

/// Scan `dirs` in order with `scan`, stopping at the first hit.
///
/// Returns the directory that produced the hit and the hit itself.
pub fn first_marker<F>(dirs: &[PathBuf], mut scan: F) -> Option<(PathBuf, PathBuf)>
where
    F: FnMut(&Path) -> Option<PathBuf>,
{
    dirs.iter()
        .find_map(|d| scan(d).map(|hit| (d.clone(), hit)))
}

/// Top-down search for a file named `wanted` below `root`, following
/// symlinks. A directory's own files are checked before any of its
/// subdirectories, each group in file-name order.
pub fn find_file(root: &Path, wanted: &str) -> Option<PathBuf> {
    walkdir::WalkDir::new(root)
        .follow_links(true)
        .sort_by(|a, b| {
            a.path()
                .is_dir()
                .cmp(&b.path().is_dir())
                .then_with(|| a.file_name().cmp(b.file_name()))
        })
        .into_iter()
        .filter_map(Result::ok)
        .find(|e| e.file_type().is_file() && e.file_name() == wanted)
        .map(walkdir::DirEntry::into_path)
}

/// Whether `dir` holds an artifact for library `name` (`lib<name>*`).
pub fn has_library(dir: &Path, name: &str) -> bool {
    let stem = if name.starts_with("lib") {
        name.to_string()
    } else {
        format!("lib{name}")
    };
    let pattern = format!("{}/{stem}*", glob::Pattern::escape(&dir.to_string_lossy()));
    glob::glob(&pattern).is_ok_and(|mut paths| paths.any(|p| p.is_ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::cache::CachedResource;
    use accelspec_schema::{Arch, Platform, RemoteResource};
    use std::fs;
    use tempfile::tempdir;

    /// Fails every request; tests here never need a bundle.
    struct NoResources;

    impl ResourceProvider for NoResources {
        fn provide(&self, r: &RemoteResource, _: &Path) -> Result<CachedResource, CacheError> {
            Err(CacheError::Offline(r.archive.clone()))
        }
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    fn linux_env<'a>(sysroot: &Path, resources: &'a dyn ResourceProvider) -> ProbeEnv<'a> {
        ProbeEnv {
            target: Target::new(Platform::Linux, Arch::X86_64),
            sysroot: sysroot.to_path_buf(),
            shared_cache_dir: sysroot.join("cache"),
            install_prefix: None,
            lib_override: None,
            inc_override: None,
            resources,
        }
    }

    #[test]
    fn test_search_dirs_skip_missing_and_duplicates() {
        let dir = tempdir().unwrap();
        let mut dirs = SearchDirs::default();

        assert!(dirs.add(dir.path()));
        assert!(!dirs.add(dir.path()));
        assert!(!dirs.add(dir.path().join("missing")));
        assert!(!dirs.add(""));
        assert_eq!(dirs.len(), 1);
    }

    #[test]
    fn test_first_marker_stops_at_first_hit() {
        let dirs: Vec<PathBuf> = ["/a", "/b", "/c"].iter().map(PathBuf::from).collect();
        let mut visited = Vec::new();

        let hit = first_marker(&dirs, |d| {
            visited.push(d.to_path_buf());
            (d == Path::new("/b")).then(|| d.join("ft2build.h"))
        });

        assert_eq!(hit, Some((PathBuf::from("/b"), PathBuf::from("/b/ft2build.h"))));
        assert_eq!(visited, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }

    #[test]
    fn test_find_file_recurses() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("freetype2/freetype/freetype.h"));

        let hit = find_file(dir.path(), "freetype.h").unwrap();
        assert!(hit.ends_with("freetype2/freetype/freetype.h"));
        assert_eq!(find_file(dir.path(), "missing.h"), None);
    }

    #[test]
    fn test_find_file_prefers_shallow_hit() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("a/ft2build.h"));
        touch(&dir.path().join("ft2build.h"));

        assert_eq!(find_file(dir.path(), "ft2build.h"), Some(dir.path().join("ft2build.h")));
    }

    #[cfg(unix)]
    #[test]
    fn test_find_file_follows_symlinks() {
        let dir = tempdir().unwrap();
        let real = dir.path().join("real");
        touch(&real.join("ft2build.h"));
        let scan_root = dir.path().join("scan");
        fs::create_dir_all(&scan_root).unwrap();
        std::os::unix::fs::symlink(&real, scan_root.join("linked")).unwrap();

        assert!(find_file(&scan_root, "ft2build.h").is_some());
    }

    #[test]
    fn test_has_library() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("libfreetype.so.6"));

        assert!(has_library(dir.path(), "freetype"));
        assert!(has_library(dir.path(), "libfreetype"));
        assert!(!has_library(dir.path(), "png"));
    }

    #[test]
    fn test_candidate_order_and_overrides() {
        let root = tempdir().unwrap();
        let sys = root.path();
        for d in ["usr/local/include", "usr/include", "usr/lib", "usr/lib/x86_64-linux-gnu"] {
            fs::create_dir_all(sys.join(d)).unwrap();
        }
        let custom = sys.join("opt/ft/include");
        fs::create_dir_all(&custom).unwrap();
        let prefix = sys.join("venv");
        fs::create_dir_all(prefix.join("include")).unwrap();

        let mut env = linux_env(sys, &NoResources);
        env.inc_override = Some(custom.clone());
        env.install_prefix = Some(prefix.clone());
        let conventions = conventions_for(&env.target);
        let prober = Prober::new(&env, conventions.as_ref());

        let dirs = prober.candidate_dirs(&mut InfoLog::default()).unwrap();

        assert_eq!(
            dirs.include.as_slice(),
            &[
                custom,
                sys.join("usr/local/include"),
                sys.join("usr/include"),
                prefix.join("include"),
            ]
        );
        assert_eq!(
            dirs.library.as_slice(),
            &[sys.join("usr/lib"), sys.join("usr/lib/x86_64-linux-gnu")]
        );
    }

    #[test]
    fn test_locate_returns_marker_parent_pair_and_version() {
        let root = tempdir().unwrap();
        let sys = root.path();
        touch(&sys.join("usr/include/freetype2/ft2build.h"));
        fs::create_dir_all(sys.join("usr/include/freetype2/freetype")).unwrap();
        fs::write(
            sys.join("usr/include/freetype2/freetype/freetype.h"),
            "#define FREETYPE_MAJOR 2\n#define FREETYPE_MINOR 12\n#define FREETYPE_PATCH 1\n",
        )
        .unwrap();
        touch(&sys.join("usr/lib/x86_64-linux-gnu/libfreetype.so"));
        fs::create_dir_all(sys.join("usr/lib")).unwrap();

        let env = linux_env(sys, &NoResources);
        let conventions = conventions_for(&env.target);
        let prober = Prober::new(&env, conventions.as_ref());

        let loc = prober
            .locate(&LibraryProbe::freetype(), Some("freetype"), &mut InfoLog::default())
            .unwrap();

        assert_eq!(loc.version, "2.12.1");
        assert_eq!(
            loc.include_dirs,
            vec![sys.join("usr/include"), sys.join("usr/include/freetype2")]
        );
        assert_eq!(loc.library_dirs, vec![sys.join("usr/lib/x86_64-linux-gnu")]);
    }

    #[test]
    fn test_locate_first_priority_match_wins() {
        let root = tempdir().unwrap();
        let sys = root.path();
        touch(&sys.join("usr/local/include/ft/ft2build.h"));
        touch(&sys.join("usr/include/freetype2/ft2build.h"));

        let env = linux_env(sys, &NoResources);
        let conventions = conventions_for(&env.target);
        let prober = Prober::new(&env, conventions.as_ref());

        let loc = prober
            .locate(&LibraryProbe::freetype(), None, &mut InfoLog::default())
            .unwrap();

        assert_eq!(loc.include_dirs[1], sys.join("usr/local/include/ft"));
        assert_eq!(loc.version, "22");
    }

    #[test]
    fn test_locate_without_marker_is_fatal() {
        let root = tempdir().unwrap();
        fs::create_dir_all(root.path().join("usr/include")).unwrap();

        let env = linux_env(root.path(), &NoResources);
        let conventions = conventions_for(&env.target);
        let prober = Prober::new(&env, conventions.as_ref());

        let err = prober
            .locate(&LibraryProbe::freetype(), None, &mut InfoLog::default())
            .unwrap_err();

        assert!(matches!(
            err,
            ProbeError::MarkerNotFound { marker: "ft2build.h", ref searched } if searched.len() == 1
        ));
    }
}

//! Per-platform library search conventions.
//!
//! Each operating-system family is one [`PathConventions`] implementation;
//! supporting a new platform means adding a type here and a match arm in
//! [`conventions_for`], not editing the probe.

use std::fmt;
use std::path::PathBuf;

use accelspec_schema::{Arch, Platform, RemoteResource, Target};

use super::{CandidateDirs, ProbeEnv, ProbeError};
use crate::infolog::InfoLog;
use crate::io::cache::CacheError;

/// A prebuilt FreeType kit shipped as a remote bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontBundle {
    /// Archive to fetch
    pub resource: RemoteResource,
    /// Import library, relative to the extracted bundle
    pub library: PathBuf,
    /// Header roots to try, relative to the extracted bundle, in order
    pub include_candidates: Vec<PathBuf>,
}

/// How one platform family lays out third-party libraries.
pub trait PathConventions: fmt::Debug {
    /// Family name for log lines.
    fn name(&self) -> &'static str;

    /// Append vendor-specific include and library candidates.
    ///
    /// Called after the explicit overrides and before the generic Unix
    /// prefixes.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Cache`] when a required support bundle fails
    /// to download or extract.
    fn vendor_dirs(
        &self,
        _env: &ProbeEnv<'_>,
        _dirs: &mut CandidateDirs,
        _log: &mut InfoLog,
    ) -> Result<(), ProbeError> {
        Ok(())
    }

    /// Address-width specific library directories, as absolute well-known paths.
    fn multiarch_lib_dirs(&self, target: &Target) -> Vec<&'static str> {
        let mut dirs = Vec::new();
        if target.pointer_width == 64 {
            dirs.push("/usr/lib/lib64");
            match target.arch {
                Arch::Arm64 => dirs.push("/usr/lib/aarch64-linux-gnu"),
                Arch::X86_64 | Arch::X86 => dirs.push("/usr/lib/x86_64-linux-gnu"),
            }
        } else {
            dirs.push("/usr/lib/lib32");
        }
        dirs
    }

    /// A prebuilt FreeType bundle to use instead of probing the system.
    fn font_bundle(&self, _target: &Target) -> Option<FontBundle> {
        None
    }

    /// Extra compile and link flags for debug builds.
    fn debug_flags(&self) -> (Vec<String>, Vec<String>) {
        (Vec::new(), Vec::new())
    }
}

/// Select the conventions for `target`'s platform family.
pub fn conventions_for(target: &Target) -> Box<dyn PathConventions> {
    match target.platform {
        Platform::Linux => Box::new(GenericUnix),
        Platform::Darwin => Box::new(Darwin),
        Platform::Windows => Box::new(Windows),
        Platform::Cygwin => Box::new(Cygwin),
    }
}

/// Linux and friends: only the generic prefixes.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericUnix;

impl PathConventions for GenericUnix {
    fn name(&self) -> &'static str {
        "unix"
    }
}

/// Cygwin: the interpreter's `config` directory holds import libraries.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cygwin;

impl PathConventions for Cygwin {
    fn name(&self) -> &'static str {
        "cygwin"
    }

    fn vendor_dirs(
        &self,
        env: &ProbeEnv<'_>,
        dirs: &mut CandidateDirs,
        _log: &mut InfoLog,
    ) -> Result<(), ProbeError> {
        let pattern = format!(
            "{}/python3*/config",
            glob::Pattern::escape(&env.well_known("/usr/lib").to_string_lossy())
        );
        let mut found: Vec<PathBuf> = glob::glob(&pattern)
            .map(|paths| paths.filter_map(Result::ok).collect())
            .unwrap_or_default();
        found.sort();
        for dir in found {
            dirs.library.add(dir);
        }
        Ok(())
    }
}

/// macOS: Homebrew, Fink (`/sw`) and MacPorts (`/opt/local`).
///
/// On Apple Silicon the Homebrew tree comes from the `m1stuff` bundle in the
/// shared cache rather than from the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct Darwin;

impl PathConventions for Darwin {
    fn name(&self) -> &'static str {
        "darwin"
    }

    fn vendor_dirs(
        &self,
        env: &ProbeEnv<'_>,
        dirs: &mut CandidateDirs,
        log: &mut InfoLog,
    ) -> Result<(), ProbeError> {
        if env.target.is_apple_silicon() {
            match env
                .resources
                .provide(&RemoteResource::m1stuff(), &env.shared_cache_dir)
            {
                Ok(bundle) => {
                    let brew = bundle.path().join("m1stuff").join("opt").join("homebrew");
                    log.info(format!("using prebuilt arm64 bundle {}", brew.display()));
                    dirs.library.add(brew.join("lib"));
                    dirs.include.add(brew.join("include").join("freetype2"));
                }
                Err(CacheError::Offline(archive)) => {
                    log.warn(format!("{archive} not cached and downloads disabled"));
                }
                Err(e) => return Err(e.into()),
            }
        } else if env.target.arch == Arch::X86_64 {
            dirs.library.add(env.well_known("/usr/local/lib"));
            dirs.include.add(env.well_known("/usr/local/include/freetype2"));
        }

        // prefer freetype2 over older layouts
        dirs.include.add(env.well_known("/sw/include/freetype2"));
        dirs.include.add(env.well_known("/sw/lib/freetype2/include"));
        // fink
        dirs.library.add(env.well_known("/sw/lib"));
        dirs.include.add(env.well_known("/sw/include"));
        // macports
        dirs.library.add(env.well_known("/opt/local/lib"));
        dirs.include.add(env.well_known("/opt/local/include"));
        Ok(())
    }
}

/// Native Windows: no system prefixes, FreeType comes from `winstuff`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Windows;

impl PathConventions for Windows {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn multiarch_lib_dirs(&self, _target: &Target) -> Vec<&'static str> {
        Vec::new()
    }

    fn font_bundle(&self, target: &Target) -> Option<FontBundle> {
        let arch_dir = if target.pointer_width == 64 { "amd64" } else { "x86" };
        Some(FontBundle {
            resource: RemoteResource::winstuff(),
            library: PathBuf::from("libs").join(arch_dir).join("freetype.lib"),
            include_candidates: vec![
                PathBuf::from("include"),
                PathBuf::from("include").join("freetype2"),
            ],
        })
    }

    fn debug_flags(&self) -> (Vec<String>, Vec<String>) {
        (vec!["/Zi".to_string()], vec!["/DEBUG".to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::cache::{CachedResource, ResourceProvider};
    use std::cell::RefCell;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    /// Pretends every bundle is already extracted under the given root.
    struct Prepared {
        requests: RefCell<Vec<String>>,
    }

    impl ResourceProvider for Prepared {
        fn provide(
            &self,
            resource: &RemoteResource,
            root: &Path,
        ) -> Result<CachedResource, CacheError> {
            self.requests.borrow_mut().push(resource.archive.clone());
            let dir = root.join(&resource.name);
            Ok(CachedResource {
                resource: resource.clone(),
                marker: dir.join(".done"),
                root: dir,
            })
        }
    }

    struct Offline;

    impl ResourceProvider for Offline {
        fn provide(&self, r: &RemoteResource, _: &Path) -> Result<CachedResource, CacheError> {
            Err(CacheError::Offline(r.archive.clone()))
        }
    }

    fn env<'a>(sys: &Path, target: Target, resources: &'a dyn ResourceProvider) -> ProbeEnv<'a> {
        ProbeEnv {
            target,
            sysroot: sys.to_path_buf(),
            shared_cache_dir: sys.join("cache"),
            install_prefix: None,
            lib_override: None,
            inc_override: None,
            resources,
        }
    }

    #[test]
    fn test_dispatch_by_platform() {
        let name = |p| conventions_for(&Target::new(p, Arch::X86_64)).name();
        assert_eq!(name(Platform::Linux), "unix");
        assert_eq!(name(Platform::Darwin), "darwin");
        assert_eq!(name(Platform::Windows), "windows");
        assert_eq!(name(Platform::Cygwin), "cygwin");
    }

    #[test]
    fn test_multiarch_by_width() {
        let unix = GenericUnix;
        assert_eq!(
            unix.multiarch_lib_dirs(&Target::new(Platform::Linux, Arch::X86)),
            vec!["/usr/lib/lib32"]
        );
        assert_eq!(
            unix.multiarch_lib_dirs(&Target::new(Platform::Linux, Arch::Arm64)),
            vec!["/usr/lib/lib64", "/usr/lib/aarch64-linux-gnu"]
        );
    }

    #[test]
    fn test_darwin_arm64_uses_bundle_first() {
        let root = tempdir().unwrap();
        let sys = root.path();
        let brew = sys.join("cache/m1stuff/m1stuff/opt/homebrew");
        fs::create_dir_all(brew.join("lib")).unwrap();
        fs::create_dir_all(brew.join("include/freetype2")).unwrap();
        fs::create_dir_all(sys.join("opt/local/include")).unwrap();

        let provider = Prepared {
            requests: RefCell::new(Vec::new()),
        };
        let env = env(sys, Target::new(Platform::Darwin, Arch::Arm64), &provider);
        let mut dirs = CandidateDirs::default();
        Darwin
            .vendor_dirs(&env, &mut dirs, &mut InfoLog::default())
            .unwrap();

        assert_eq!(*provider.requests.borrow(), vec!["m1stuff.tar.gz"]);
        assert_eq!(
            dirs.include.as_slice(),
            &[brew.join("include/freetype2"), sys.join("opt/local/include")]
        );
        assert_eq!(dirs.library.as_slice(), &[brew.join("lib")]);
    }

    #[test]
    fn test_darwin_arm64_offline_degrades() {
        let root = tempdir().unwrap();
        fs::create_dir_all(root.path().join("sw/include")).unwrap();
        let env = env(root.path(), Target::new(Platform::Darwin, Arch::Arm64), &Offline);
        let mut dirs = CandidateDirs::default();
        let mut log = InfoLog::default();

        Darwin.vendor_dirs(&env, &mut dirs, &mut log).unwrap();

        assert!(log.contains("downloads disabled"));
        assert_eq!(dirs.include.as_slice(), &[root.path().join("sw/include")]);
    }

    #[test]
    fn test_darwin_intel_skips_bundle() {
        let root = tempdir().unwrap();
        let sys = root.path();
        fs::create_dir_all(sys.join("usr/local/include/freetype2")).unwrap();
        let provider = Prepared {
            requests: RefCell::new(Vec::new()),
        };
        let env = env(sys, Target::new(Platform::Darwin, Arch::X86_64), &provider);
        let mut dirs = CandidateDirs::default();

        Darwin
            .vendor_dirs(&env, &mut dirs, &mut InfoLog::default())
            .unwrap();

        assert!(provider.requests.borrow().is_empty());
        assert_eq!(
            dirs.include.as_slice(),
            &[sys.join("usr/local/include/freetype2")]
        );
    }

    #[test]
    fn test_cygwin_config_dir() {
        let root = tempdir().unwrap();
        let config = root.path().join("usr/lib/python3.9/config");
        fs::create_dir_all(&config).unwrap();
        let env = env(root.path(), Target::new(Platform::Cygwin, Arch::X86_64), &Offline);
        let mut dirs = CandidateDirs::default();

        Cygwin
            .vendor_dirs(&env, &mut dirs, &mut InfoLog::default())
            .unwrap();

        assert_eq!(dirs.library.as_slice(), &[config]);
    }

    #[test]
    fn test_cygwin_sysroot_with_glob_characters() {
        let root = tempdir().unwrap();
        let sys = root.path().join("sys[1]");
        let config = sys.join("usr/lib/python3.12/config");
        fs::create_dir_all(&config).unwrap();
        let env = env(&sys, Target::new(Platform::Cygwin, Arch::X86_64), &Offline);
        let mut dirs = CandidateDirs::default();

        Cygwin
            .vendor_dirs(&env, &mut dirs, &mut InfoLog::default())
            .unwrap();

        assert_eq!(dirs.library.as_slice(), &[config]);
    }

    #[test]
    fn test_windows_bundle_layout() {
        let bundle = Windows
            .font_bundle(&Target::new(Platform::Windows, Arch::X86))
            .unwrap();
        assert_eq!(bundle.library, PathBuf::from("libs/x86/freetype.lib"));
        assert_eq!(bundle.resource, RemoteResource::winstuff());
        assert!(GenericUnix.font_bundle(&Target::default()).is_none());
    }
}

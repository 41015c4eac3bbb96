//! Turning discovered trees and libraries into [`ModuleBuildSpec`]s.
//!
//! The assembler owns the module table and the fallback chains:
//!
//! - A module whose source tree cannot be found is left out.
//! - libart comes from the host when asked for and present, otherwise from
//!   the bundled sources (which need `art_config.h` generated first).
//! - FreeType comes from the platform's prebuilt bundle when it has one
//!   (Windows), degrading to a build without font support, or from the
//!   path probe, whose failure is fatal.

use std::fs;
use std::path::{Path, PathBuf};

use accelspec_schema::{ModuleBuildSpec, RemoteResource, Target};
use thiserror::Error;
use tracing::debug;

use crate::config::{ConfigError, Options};
use crate::infolog::InfoLog;
use crate::io::cache::{CacheError, ResourceProvider};
use crate::locator::{SourceTree, find_source_tree};
use crate::paths;
use crate::portability::{self, HeaderError};
use crate::probe::{LibraryProbe, PathConventions, ProbeEnv, ProbeError, Prober, conventions_for};
use crate::version::{self, define_token};

/// Fatal resolution failures. Everything else degrades to an omitted
/// module or feature.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Header(#[from] HeaderError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// `reportlab.lib._rl_accel`
pub const RL_ACCEL_MODULE: &str = "reportlab.lib._rl_accel";
/// `reportlab.graphics._renderPM`
pub const RENDERPM_MODULE: &str = "reportlab.graphics._renderPM";

const GT1_SOURCES: [&str; 4] = [
    "gt1-parset1.c",
    "gt1-dict.c",
    "gt1-namecontext.c",
    "gt1-region.c",
];

/// Sources compiled from the bundled libart copy.
pub const LIBART_SOURCES: [&str; 19] = [
    "art_vpath_bpath.c",
    "art_rgb_pixbuf_affine.c",
    "art_rgb_svp.c",
    "art_svp.c",
    "art_svp_vpath.c",
    "art_svp_vpath_stroke.c",
    "art_svp_ops.c",
    "art_svp_wind.c",
    "art_vpath.c",
    "art_vpath_dash.c",
    "art_affine.c",
    "art_rect.c",
    "art_rgb_affine.c",
    "art_rgb_affine_private.c",
    "art_rgb.c",
    "art_rgb_rgba_affine.c",
    "art_svp_intersect.c",
    "art_svp_render_aa.c",
    "art_misc.c",
];

/// Link name of an installed libart.
pub const SYSTEM_LIBART: &str = "art_lgpl_2";

/// Everything a resolution run needs to know, passed explicitly.
#[derive(Debug, Clone)]
pub struct ResolverContext {
    /// Directory holding the package being built
    pub package_root: PathBuf,
    /// Host description
    pub target: Target,
    /// Effective options
    pub options: Options,
    /// Root that well-known absolute paths resolve under (`/` on a real host)
    pub sysroot: PathBuf,
    /// Extraction root for bundles tied to this checkout
    pub build_cache_dir: PathBuf,
    /// Extraction root for bundles shared across checkouts
    pub shared_cache_dir: PathBuf,
    /// Prefix of the active installation
    pub install_prefix: Option<PathBuf>,
}

impl ResolverContext {
    /// Context for the running host.
    pub fn new(package_root: impl Into<PathBuf>, target: Target, options: Options) -> Self {
        let package_root = package_root.into();
        Self {
            build_cache_dir: paths::build_cache_dir(&package_root),
            shared_cache_dir: paths::shared_cache_dir(),
            install_prefix: paths::try_install_prefix(),
            sysroot: PathBuf::from("/"),
            package_root,
            target,
            options,
        }
    }

    /// Where installed libart headers are looked for.
    pub fn system_include_root(&self) -> PathBuf {
        self.sysroot.join("usr/include")
    }

    /// The probe environment for this context.
    pub fn probe_env<'a>(&self, resources: &'a dyn ResourceProvider) -> ProbeEnv<'a> {
        ProbeEnv {
            target: self.target,
            sysroot: self.sysroot.clone(),
            shared_cache_dir: self.shared_cache_dir.clone(),
            install_prefix: self.install_prefix.clone(),
            lib_override: self.options.freetype_lib.clone(),
            inc_override: self.options.freetype_inc.clone(),
            resources,
        }
    }

    /// Where `resource` is extracted: the checkout's build directory for
    /// `winstuff`, the shared cache for everything else.
    pub fn extraction_root(&self, resource: &RemoteResource) -> PathBuf {
        if *resource == RemoteResource::winstuff() {
            self.build_cache_dir.clone()
        } else {
            self.shared_cache_dir.clone()
        }
    }

    /// Tag used in info log lines.
    pub fn log_tag(&self) -> String {
        format!("accelspec-{}", self.target.tag())
    }
}

/// Output of a run: the buildable modules and what was decided on the way.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub specs: Vec<ModuleBuildSpec>,
    pub log: InfoLog,
}

impl Resolution {
    /// The spec for `module_name`, if it was resolved.
    pub fn spec(&self, module_name: &str) -> Option<&ModuleBuildSpec> {
        self.specs.iter().find(|s| s.module_name == module_name)
    }
}

/// How libart will be provided to `_renderPM`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibartSetup {
    /// Include directory
    pub include_dir: PathBuf,
    /// Sources to compile in (empty for an installed copy)
    pub sources: Vec<PathBuf>,
    /// Libraries to link (empty for the bundled copy)
    pub libraries: Vec<String>,
    /// Value of the `LIBART_VERSION` macro, a C string literal
    pub version: String,
}

/// How FreeType will be provided to `_renderPM`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreetypeSetup {
    pub include_dirs: Vec<PathBuf>,
    pub library_dirs: Vec<PathBuf>,
    pub libraries: Vec<String>,
}

/// Compile/link additions shared by every module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct DebugSettings {
    compile_flags: Vec<String>,
    link_flags: Vec<String>,
    macros: Vec<(String, Option<String>)>,
}

impl DebugSettings {
    fn new(options: &Options, conventions: &dyn PathConventions) -> Self {
        let mut settings = Self::default();
        if options.debug_level > 0 {
            (settings.compile_flags, settings.link_flags) = conventions.debug_flags();
            if options.debug_level > 1 {
                settings
                    .macros
                    .push(("RL_DEBUG".to_string(), Some(options.debug_level.to_string())));
                settings.macros.push(("ROBIN_DEBUG".to_string(), None));
            }
        }
        if options.memory_debug {
            settings.macros.push(("MEMORY_DEBUG".to_string(), None));
        }
        settings
    }

    fn apply(&self, spec: &mut ModuleBuildSpec) {
        for (name, value) in &self.macros {
            spec.define(name.clone(), value.clone());
        }
        spec.extra_compile_flags.extend(self.compile_flags.iter().cloned());
        spec.extra_link_flags.extend(self.link_flags.iter().cloned());
    }
}

/// Resolves the module table for one [`ResolverContext`].
pub struct Assembler<'a> {
    ctx: &'a ResolverContext,
    resources: &'a dyn ResourceProvider,
    conventions: Box<dyn PathConventions>,
}

impl std::fmt::Debug for Assembler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assembler")
            .field("ctx", &self.ctx)
            .field("conventions", &self.conventions)
            .finish_non_exhaustive()
    }
}

impl<'a> Assembler<'a> {
    pub fn new(ctx: &'a ResolverContext, resources: &'a dyn ResourceProvider) -> Self {
        Self {
            ctx,
            resources,
            conventions: conventions_for(&ctx.target),
        }
    }

    /// Resolve every module, in table order.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolveError`] for the fatal cases only: FreeType headers
    /// missing on a probing platform, unusable primitive sizes, or a failed
    /// bundle download.
    pub fn resolve(&self) -> Result<Resolution, ResolveError> {
        let mut log = InfoLog::new(self.ctx.log_tag());
        let debug = DebugSettings::new(&self.ctx.options, self.conventions.as_ref());
        let mut specs = Vec::new();

        if let Some(spec) = self.rl_accel(&debug, &mut log) {
            specs.push(spec);
        }
        if let Some(spec) = self.render_pm(&debug, &mut log)? {
            specs.push(spec);
        }

        Ok(Resolution { specs, log })
    }

    fn locate(&self, module_dir: &str, marker: &str, label: &str, log: &mut InfoLog) -> Option<SourceTree> {
        let Some(tree) = find_source_tree(&self.ctx.package_root, module_dir, marker) else {
            log.info(format!("not attempting build of {label}"));
            return None;
        };
        log.info(format!("Attempting build of {label}"));
        log.info(format!("extensions from {}", tree.relative.display()));
        Some(tree)
    }

    fn rl_accel(&self, debug: &DebugSettings, log: &mut InfoLog) -> Option<ModuleBuildSpec> {
        let tree = self.locate("rl_accel", "_rl_accel.c", "_rl_accel", log)?;
        let mut spec = ModuleBuildSpec::new(RL_ACCEL_MODULE);
        spec.source_files.push(tree.relative.join("_rl_accel.c"));
        debug.apply(&mut spec);
        Some(spec)
    }

    fn render_pm(
        &self,
        debug: &DebugSettings,
        log: &mut InfoLog,
    ) -> Result<Option<ModuleBuildSpec>, ResolveError> {
        let Some(tree) = self.locate("renderPM", "_renderPM.c", "_renderPM", log) else {
            return Ok(None);
        };
        let gt1 = tree.relative.join("gt1");

        let Some(libart) = self.libart(&tree, log)? else {
            return Ok(None);
        };
        let freetype = self.freetype(log)?;

        let mut spec = ModuleBuildSpec::new(RENDERPM_MODULE);
        spec.source_files.push(tree.relative.join("_renderPM.c"));
        spec.source_files
            .extend(GT1_SOURCES.iter().map(|f| gt1.join(f)));
        spec.source_files.extend(libart.sources);

        spec.include_dirs = vec![tree.relative.clone(), libart.include_dir, gt1];

        if let Some(ft) = freetype {
            spec.define("RENDERPM_FT", None);
            spec.include_dirs.extend(ft.include_dirs);
            spec.library_dirs.extend(ft.library_dirs);
            for lib in ft.libraries {
                spec.link(lib);
            }
        } else {
            log.info("# installing without freetype no ttf, sorry!");
            log.info("# You need to install a static library version of the freetype2 software");
            log.info("# If you need truetype support in renderPM");
            log.info("# or set [freetype-paths] in setup.toml if it is installed");
        }

        spec.define("LIBART_COMPILATION", None);
        debug.apply(&mut spec);
        spec.define("LIBART_VERSION", Some(libart.version));
        for lib in libart.libraries {
            spec.link(lib);
        }

        Ok(Some(spec))
    }

    /// Installed libart when allowed and present, else the bundled copy.
    ///
    /// `None` means the bundled copy cannot be prepared and `_renderPM` is
    /// left out.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError`] if the host's primitive sizes cannot back
    /// `art_config.h`.
    pub fn libart(&self, tree: &SourceTree, log: &mut InfoLog) -> Result<Option<LibartSetup>, ResolveError> {
        if self.ctx.options.use_system_library {
            if let Some(setup) = installed_libart(&self.ctx.system_include_root()) {
                log.info(format!("will use installed libart {}", setup.version.replace('"', "")));
                return Ok(Some(setup));
            }
            log.info("no installed libart found, using the bundled copy");
        }

        let dir = tree.absolute.join("libart_lgpl");
        match portability::emit_portability_header(&dir) {
            Ok(_) => {}
            Err(e @ HeaderError::Io { .. }) => {
                log.warn(format!("{e}; not attempting build of _renderPM"));
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        let configure = fs::read_to_string(dir.join("configure.in")).unwrap_or_default();
        let parsed = version::parse_version(&configure, &version::LIBART_CONFIGURE, "0.0.0");
        log.info(format!("will use package libart {parsed}"));

        let relative = tree.relative.join("libart_lgpl");
        Ok(Some(LibartSetup {
            sources: LIBART_SOURCES.iter().map(|f| relative.join(f)).collect(),
            include_dir: relative,
            libraries: Vec::new(),
            version: format!("\"{parsed}\""),
        }))
    }

    /// FreeType from the platform bundle or the path probe.
    ///
    /// `None` means build without font support.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError`] when probing is the only option and finds
    /// nothing, and [`CacheError`] when a bundle download fails.
    pub fn freetype(&self, log: &mut InfoLog) -> Result<Option<FreetypeSetup>, ResolveError> {
        if let Some(bundle) = self.conventions.font_bundle(&self.ctx.target) {
            let cached = match self
                .resources
                .provide(&bundle.resource, &self.ctx.extraction_root(&bundle.resource))
            {
                Ok(cached) => cached,
                Err(CacheError::Offline(archive)) => {
                    log.warn(format!("{archive} not available offline"));
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            };

            let lib = cached.path().join(&bundle.library);
            if !lib.is_file() {
                log.warn(format!("freetype lib {} not found", lib.display()));
                return Ok(None);
            }
            let Some(inc) = bundle
                .include_candidates
                .iter()
                .map(|c| cached.path().join(c))
                .find(|d| d.join("ft2build.h").is_file())
            else {
                log.warn(format!(
                    "freetype2 include folder not found under {}",
                    cached.path().display()
                ));
                return Ok(None);
            };
            log.info(format!("installing with freetype {}", lib.display()));

            let name = lib
                .file_stem()
                .map_or_else(|| "freetype".to_string(), |s| s.to_string_lossy().into_owned());
            let lib_dir = lib.parent().map_or_else(|| cached.path().to_path_buf(), Path::to_path_buf);
            return Ok(Some(FreetypeSetup {
                include_dirs: vec![inc],
                library_dirs: vec![lib_dir],
                libraries: vec![name],
            }));
        }

        let env = self.ctx.probe_env(self.resources);
        let prober = Prober::new(&env, self.conventions.as_ref());
        let probe = LibraryProbe::freetype();
        let found = prober.locate(&probe, Some(probe.name), log)?;
        log.info(format!("installing with freetype version {}", found.version));
        log.info(format!(
            "FT_LIB_DIR={:?} FT_INC_DIR={:?}",
            found.library_dirs, found.include_dirs
        ));
        debug!(?found, "freetype location");

        Ok(Some(FreetypeSetup {
            include_dirs: found.include_dirs,
            library_dirs: found.library_dirs,
            libraries: vec![probe.name.to_string()],
        }))
    }
}

/// The newest `libart-*/libart_lgpl/libart-features.h` under `include_root`.
pub fn installed_libart(include_root: &Path) -> Option<LibartSetup> {
    let pattern = format!(
        "{}/libart-*/libart_lgpl/libart-features.h",
        glob::Pattern::escape(&include_root.to_string_lossy())
    );
    let mut hits: Vec<PathBuf> = glob::glob(&pattern).ok()?.filter_map(Result::ok).collect();
    hits.sort();
    let features = hits.pop()?;

    let version = fs::read_to_string(&features)
        .ok()
        .and_then(|text| define_token(&text, "LIBART_VERSION"))
        .unwrap_or_else(|| "\"0.0.0\"".to_string());

    Some(LibartSetup {
        include_dir: features.parent()?.to_path_buf(),
        sources: Vec::new(),
        libraries: vec![SYSTEM_LIBART.to_string()],
        version,
    })
}

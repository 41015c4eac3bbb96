//! Command handlers

pub mod fetch;
pub mod header;
pub mod locate;
pub mod resolve;

use anyhow::{Context, Result};
use accelspec_core::io::cache::ResourceCache;
use accelspec_core::io::download::HttpSource;
use accelspec_core::{FileConfig, Flags, Options, ResolverContext};
use accelspec_schema::Target;

use crate::GlobalArgs;

/// Build the run context from flags, config files and the host.
pub fn context(global: &GlobalArgs) -> Result<ResolverContext> {
    let root = std::fs::canonicalize(&global.package_root)
        .with_context(|| format!("Package root {} not found", global.package_root.display()))?;
    let file = FileConfig::load(&root).context("Failed to load package config")?;
    let flags = Flags {
        no_download: global.no_download,
        use_system_library: global.use_system_library,
        memory_debug: global.memory_debug,
    };
    let options = Options::resolve(flags, &file, global.debug_level);
    let mut target = Target::detect(global.archflags.as_deref());
    if global.platform.is_some() || global.arch.is_some() {
        target = Target::new(
            global.platform.unwrap_or(target.platform),
            global.arch.unwrap_or(target.arch),
        );
    }

    let mut ctx = ResolverContext::new(root, target, options);
    if let Some(sysroot) = &global.sysroot {
        ctx.sysroot.clone_from(sysroot);
    }
    tracing::debug!(?ctx, "resolver context");
    Ok(ctx)
}

/// The download cache, offline when `--no-download` is in effect.
pub fn resource_cache(global: &GlobalArgs, ctx: &ResolverContext) -> Result<ResourceCache<HttpSource>> {
    let source = HttpSource::new(global.download_base.clone())
        .context("Failed to create HTTP client")?;
    Ok(ResourceCache::new(source).offline(ctx.options.no_download))
}

//! Locate command

use anyhow::{Context, Result, bail};
use accelspec_core::InfoLog;
use accelspec_core::probe::{LibraryProbe, Prober, conventions_for};

use crate::GlobalArgs;

/// Run the path probe for one library and print what it found.
pub fn locate(global: &GlobalArgs, library: &str) -> Result<()> {
    let probe = match library {
        "freetype" | "freetype2" => LibraryProbe::freetype(),
        other => bail!("No probe for '{other}' (supported: freetype)"),
    };
    let ctx = super::context(global)?;
    let cache = super::resource_cache(global, &ctx)?;
    let env = ctx.probe_env(&cache);
    let conventions = conventions_for(&ctx.target);
    let prober = Prober::new(&env, conventions.as_ref());

    let mut log = InfoLog::new(ctx.log_tag());
    let found = prober
        .locate(&probe, Some(probe.name), &mut log)
        .with_context(|| format!("Failed to locate {library}"))?;

    println!("version  {}", found.version);
    for d in &found.include_dirs {
        println!("include  {}", d.display());
    }
    for d in &found.library_dirs {
        println!("libdir   {}", d.display());
    }
    Ok(())
}

//! Fetch command

use anyhow::{Context, Result, bail};
use accelspec_schema::RemoteResource;

use crate::GlobalArgs;

/// Make sure a support bundle is extracted, optionally checking its digest.
pub fn fetch(global: &GlobalArgs, name: &str, verify: bool) -> Result<()> {
    let Some(resource) = RemoteResource::known(name) else {
        bail!("Unknown resource '{name}' (known: winstuff, m1stuff)");
    };
    let ctx = super::context(global)?;
    let cache = super::resource_cache(global, &ctx)?;

    let cached = cache
        .ensure(&resource, &ctx.extraction_root(&resource))
        .with_context(|| format!("Failed to fetch {}", resource.archive))?;
    println!("{}", cached.path().display());

    if verify {
        if !cached.verify()? {
            bail!("{} does not match its recorded digest", cached.path().display());
        }
        println!("ok");
    }
    Ok(())
}

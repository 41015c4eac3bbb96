//! Header command

use std::path::Path;

use anyhow::{Context, Result};
use accelspec_core::portability::emit_portability_header;

/// Write `art_config.h` into `dir`.
pub fn header(dir: &Path) -> Result<()> {
    let path = emit_portability_header(dir)
        .with_context(|| format!("Failed to write portability header in {}", dir.display()))?;
    println!("{}", path.display());
    Ok(())
}

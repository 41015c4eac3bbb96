//! `art_config.h` generation for the bundled libart sources.
//!
//! libart expects a header mapping `art_u8`/`art_u16`/`art_u32` onto native
//! unsigned types. Sizes are taken from the C ABI of the running toolchain
//! rather than by compiling a probe program.

use std::ffi::{c_char, c_int, c_long, c_short};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// File name written into the libart directory.
pub const HEADER_NAME: &str = "art_config.h";

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("sizeof(char) != 1 (got {0})")]
    CharSize(usize),

    #[error("sizeof(short) != 2 (got {0})")]
    ShortSize(usize),

    #[error("sizeof(int)!=4 and sizeof(long)!=4 (got {int} and {long})")]
    NoU32 { int: usize, long: usize },

    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Byte sizes of the C integer types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimitiveSizes {
    pub c_char: usize,
    pub c_short: usize,
    pub c_int: usize,
    pub c_long: usize,
}

impl PrimitiveSizes {
    /// Sizes on the platform this binary was built for.
    pub fn native() -> Self {
        Self {
            c_char: size_of::<c_char>(),
            c_short: size_of::<c_short>(),
            c_int: size_of::<c_int>(),
            c_long: size_of::<c_long>(),
        }
    }
}

/// Render the header text for `sizes`.
///
/// # Errors
///
/// Returns a [`HeaderError`] size variant if no unsigned 8/16/32-bit type
/// can be named.
pub fn render(sizes: PrimitiveSizes) -> Result<String, HeaderError> {
    if sizes.c_char != 1 {
        return Err(HeaderError::CharSize(sizes.c_char));
    }
    if sizes.c_short != 2 {
        return Err(HeaderError::ShortSize(sizes.c_short));
    }
    let u32_type = if sizes.c_int == 4 {
        "unsigned int"
    } else if sizes.c_long == 4 {
        "unsigned long"
    } else {
        return Err(HeaderError::NoU32 {
            int: sizes.c_int,
            long: sizes.c_long,
        });
    };

    let mut out = String::from("/* Automatically generated by accelspec */\n");
    out.push_str("#ifndef _ART_CONFIG_H\n#\tdefine _ART_CONFIG_H\n");
    for (name, size) in [
        ("CHAR", sizes.c_char),
        ("SHORT", sizes.c_short),
        ("INT", sizes.c_int),
        ("LONG", sizes.c_long),
    ] {
        let _ = writeln!(out, "#\tdefine ART_SIZEOF_{name} {size}");
    }
    out.push_str("typedef unsigned char art_u8;\n");
    out.push_str("typedef unsigned short art_u16;\n");
    let _ = writeln!(out, "typedef {u32_type} art_u32;");
    out.push_str("#endif\n");
    Ok(out)
}

/// Write `art_config.h` for the native sizes into `output_dir`.
///
/// # Errors
///
/// See [`emit_with_sizes`].
pub fn emit_portability_header(output_dir: &Path) -> Result<PathBuf, HeaderError> {
    emit_with_sizes(output_dir, PrimitiveSizes::native())
}

/// Write `art_config.h` for `sizes` into `output_dir`, replacing any
/// previous copy. Nothing is written when the sizes are unusable.
///
/// # Errors
///
/// Returns a [`HeaderError`] on unusable sizes or a failed write.
pub fn emit_with_sizes(output_dir: &Path, sizes: PrimitiveSizes) -> Result<PathBuf, HeaderError> {
    let text = render(sizes)?;
    let path = output_dir.join(HEADER_NAME);
    fs::write(&path, text).map_err(|source| HeaderError::Io {
        path: path.clone(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "wrote portability header");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const LP64: PrimitiveSizes = PrimitiveSizes {
        c_char: 1,
        c_short: 2,
        c_int: 4,
        c_long: 8,
    };

    #[test]
    fn test_lp64_header() {
        let dir = tempdir().unwrap();
        let path = emit_with_sizes(dir.path(), LP64).unwrap();
        let text = fs::read_to_string(path).unwrap();

        assert!(text.contains("#\tdefine ART_SIZEOF_LONG 8\n"));
        assert!(text.contains("typedef unsigned char art_u8;"));
        assert!(text.contains("typedef unsigned short art_u16;"));
        assert!(text.contains("typedef unsigned int art_u32;"));
        assert!(text.ends_with("#endif\n"));
    }

    #[test]
    fn test_long_fallback_for_u32() {
        let sizes = PrimitiveSizes { c_int: 2, c_long: 4, ..LP64 };
        assert!(render(sizes).unwrap().contains("typedef unsigned long art_u32;"));
    }

    #[test]
    fn test_bad_sizes_write_nothing() {
        let dir = tempdir().unwrap();
        let cases = [
            (PrimitiveSizes { c_char: 2, ..LP64 }, "char"),
            (PrimitiveSizes { c_short: 4, ..LP64 }, "short"),
            (PrimitiveSizes { c_int: 8, c_long: 8, ..LP64 }, "int"),
        ];
        for (sizes, what) in cases {
            let err = emit_with_sizes(dir.path(), sizes).unwrap_err();
            assert!(err.to_string().contains(what), "{err}");
        }
        assert!(!dir.path().join(HEADER_NAME).exists());
    }

    #[test]
    fn test_overwrites_previous_header() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(HEADER_NAME), "stale").unwrap();
        emit_portability_header(dir.path()).unwrap();
        let text = fs::read_to_string(dir.path().join(HEADER_NAME)).unwrap();
        assert!(text.starts_with("/* Automatically generated"));
    }
}

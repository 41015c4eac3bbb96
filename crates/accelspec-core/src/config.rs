//! Resolver options and the file-backed fallback for them.
//!
//! Flags given on the command line always win. A flag that was not given
//! falls back to `[options]` in `setup.toml` / `local-setup.toml` at the
//! package root, with `local-setup.toml` overriding `setup.toml` key by key:
//!
//! ```toml
//! [options]
//! no-download = "yes"
//! use-system-library = true
//! memory-debug = 0
//!
//! [freetype-paths]
//! lib = "/opt/freetype/lib"
//! inc = "/opt/freetype/include"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Config files read from the package root, lowest priority first.
pub const CONFIG_FILES: [&str; 2] = ["setup.toml", "local-setup.toml"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// A boolean that may be spelled as a TOML bool, an integer or a string.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Toggle {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Toggle {
    /// `true`, non-zero, or one of `1`/`true`/`yes` (any case).
    pub fn is_on(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Text(s) => matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct FileOptions {
    pub no_download: Option<Toggle>,
    pub use_system_library: Option<Toggle>,
    pub memory_debug: Option<Toggle>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct LibraryPaths {
    pub lib: Option<PathBuf>,
    pub inc: Option<PathBuf>,
}

/// The merged contents of the package's config files.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct FileConfig {
    #[serde(default)]
    pub options: FileOptions,
    #[serde(default)]
    pub freetype_paths: LibraryPaths,
}

impl FileConfig {
    /// Read [`CONFIG_FILES`] from `package_root`. Missing files are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a file exists but cannot be read or parsed.
    pub fn load(package_root: &Path) -> Result<Self, ConfigError> {
        let mut merged = Self::default();
        for name in CONFIG_FILES {
            let path = package_root.join(name);
            if !path.is_file() {
                continue;
            }
            let layer = Self::load_from(&path)?;
            tracing::debug!(path = %path.display(), "loaded config file");
            merged.merge(layer);
        }
        Ok(merged)
    }

    /// Parse a single config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on read or parse failure.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay `other` on top of `self`; keys present in `other` win.
    fn merge(&mut self, other: Self) {
        let o = other.options;
        if o.no_download.is_some() {
            self.options.no_download = o.no_download;
        }
        if o.use_system_library.is_some() {
            self.options.use_system_library = o.use_system_library;
        }
        if o.memory_debug.is_some() {
            self.options.memory_debug = o.memory_debug;
        }
        if other.freetype_paths.lib.is_some() {
            self.freetype_paths.lib = other.freetype_paths.lib;
        }
        if other.freetype_paths.inc.is_some() {
            self.freetype_paths.inc = other.freetype_paths.inc;
        }
    }
}

/// Command-line switches as given. `false` means "not given" and defers
/// to the config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub no_download: bool,
    pub use_system_library: bool,
    pub memory_debug: bool,
}

/// Effective options for one resolution run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    /// Never fetch remote support bundles
    pub no_download: bool,
    /// Prefer an installed libart over the bundled copy
    pub use_system_library: bool,
    /// Add `MEMORY_DEBUG` to every module
    pub memory_debug: bool,
    /// Debug build level (0 = off)
    pub debug_level: u32,
    /// Explicit FreeType library directory, searched first
    pub freetype_lib: Option<PathBuf>,
    /// Explicit FreeType include directory, searched first
    pub freetype_inc: Option<PathBuf>,
}

impl Options {
    /// Combine command-line flags with the file config.
    pub fn resolve(flags: Flags, file: &FileConfig, debug_level: u32) -> Self {
        let fallback = |flag: bool, value: &Option<Toggle>| {
            flag || value.as_ref().is_some_and(Toggle::is_on)
        };
        Self {
            no_download: fallback(flags.no_download, &file.options.no_download),
            use_system_library: fallback(
                flags.use_system_library,
                &file.options.use_system_library,
            ),
            memory_debug: fallback(flags.memory_debug, &file.options.memory_debug),
            debug_level,
            freetype_lib: file.freetype_paths.lib.clone(),
            freetype_inc: file.freetype_paths.inc.clone(),
        }
    }
}

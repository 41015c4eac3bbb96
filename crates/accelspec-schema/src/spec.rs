//! Build specifications handed to the external builder.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Everything an external compiler/linker step needs to build one optional
/// native module.
///
/// Produced once per module per resolution run and never modified after it
/// has been returned. `include_dirs` is search-order significant: the first
/// directory containing a header wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ModuleBuildSpec {
    /// Dotted extension name, e.g. `reportlab.lib._rl_accel`
    pub module_name: String,
    /// C sources, in compile order
    pub source_files: Vec<PathBuf>,
    /// Header search path, highest priority first
    pub include_dirs: Vec<PathBuf>,
    /// Preprocessor definitions; `None` means a bare `-DNAME`
    pub macros: BTreeMap<String, Option<String>>,
    /// Library search path, highest priority first
    pub library_dirs: Vec<PathBuf>,
    /// Libraries to link against, in link order, without duplicates
    pub library_names: Vec<String>,
    /// Extra compiler arguments
    pub extra_compile_flags: Vec<String>,
    /// Extra linker arguments
    pub extra_link_flags: Vec<String>,
}

impl ModuleBuildSpec {
    /// Start an empty spec for `module_name`.
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            ..Self::default()
        }
    }

    /// Define `name`, optionally with a value.
    pub fn define(&mut self, name: impl Into<String>, value: Option<String>) -> &mut Self {
        self.macros.insert(name.into(), value);
        self
    }

    /// Append a library to the link line unless it is already present.
    pub fn link(&mut self, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        if !self.library_names.contains(&name) {
            self.library_names.push(name);
        }
        self
    }

    /// True if `name` is defined, with or without a value.
    pub fn defines(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }
}

/// Where an installed library's headers and binaries live.
///
/// Derived on every run and never persisted. The last entry of
/// `include_dirs` always contains the marker header used to find it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryLocation {
    /// Dotted version, or the caller's fallback when it could not be parsed
    pub version: String,
    /// Header search path, highest priority first
    pub include_dirs: Vec<PathBuf>,
    /// Library search path, highest priority first
    pub library_dirs: Vec<PathBuf>,
}

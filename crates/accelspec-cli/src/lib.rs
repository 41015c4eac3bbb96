//! accelspec - build specs for optional native accelerators
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
//!
//! Works out which of a package's optional C accelerator modules can be
//! built on this machine and prints, per module, the sources, include
//! directories, macros and libraries an external builder needs.
//!
//! # Cache Layout
//!
//! ```text
//! <package>/build/
//! └── winstuff/          # Windows FreeType kit
//!     └── .done
//! <tmp>/reportlab-cache/
//! └── m1stuff/           # Apple Silicon Homebrew tree
//!     └── .done
//! ```

pub mod cmd;

use std::path::PathBuf;

use accelspec_core::io::download::DEFAULT_BASE_URL;
use accelspec_schema::{Arch, Platform};
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "accelspec")]
#[command(author, version, about = "Resolve build specs for optional native accelerator modules")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Options shared by every command.
#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Package checkout to resolve for
    #[arg(long, global = true, default_value = ".")]
    pub package_root: PathBuf,

    /// Raise log verbosity (repeatable)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Never download support bundles
    #[arg(long, global = true)]
    pub no_download: bool,

    /// Prefer an installed libart over the bundled copy
    #[arg(long, global = true)]
    pub use_system_library: bool,

    /// Define MEMORY_DEBUG in every module
    #[arg(long, global = true)]
    pub memory_debug: bool,

    /// Debug build level
    #[arg(long, global = true, env = "ACCELSPEC_DEBUG", default_value_t = 0)]
    pub debug_level: u32,

    /// Where support bundles are downloaded from
    #[arg(long, global = true, env = "ACCELSPEC_DOWNLOAD_BASE", default_value = DEFAULT_BASE_URL)]
    pub download_base: String,

    /// Compiler architecture flags (`-arch arm64` selects Apple Silicon)
    #[arg(long, global = true, env = "ARCHFLAGS")]
    pub archflags: Option<String>,

    /// Resolve for this platform instead of the host's (linux, darwin, windows, cygwin)
    #[arg(long, global = true, env = "ACCELSPEC_PLATFORM")]
    pub platform: Option<Platform>,

    /// Resolve for this CPU architecture instead of the host's
    #[arg(long, global = true, env = "ACCELSPEC_ARCH")]
    pub arch: Option<Arch>,

    /// Resolve well-known system paths under this root
    #[arg(long, global = true, env = "ACCELSPEC_SYSROOT", hide = true)]
    pub sysroot: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Resolve every optional module (default)
    Resolve(ResolveArgs),
    /// Write art_config.h into a directory
    Header {
        /// Output directory
        dir: PathBuf,
    },
    /// Download and extract a support bundle
    Fetch {
        /// Resource name or archive name (winstuff, m1stuff.tar.gz, ...)
        resource: String,
        /// Re-hash an existing extraction against its marker
        #[arg(long)]
        verify: bool,
    },
    /// Probe for an installed library
    Locate {
        /// Library name
        library: String,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct ResolveArgs {
    /// Print the specs as JSON
    #[arg(long)]
    pub json: bool,

    /// Requirement group to pip install first (repeatable)
    #[arg(long = "pip-install", value_name = "GROUP")]
    pub pip_install: Vec<String>,

    /// Index for --pip-install groups
    #[arg(long)]
    pub index_url: Option<String>,

    /// Requirement group to install from the private index (repeatable)
    #[arg(long = "rl-pip-install", value_name = "GROUP")]
    pub rl_pip_install: Vec<String>,

    /// Private index; exactly one is required with --rl-pip-install
    #[arg(long = "rl-index-url", value_name = "URL")]
    pub rl_index_url: Vec<String>,

    /// Seconds before a pip command is killed (default 3600)
    #[arg(long, value_name = "SECS")]
    pub pip_timeout: Option<u64>,

    /// Python interpreter used for pip
    #[arg(long, default_value = "python3")]
    pub python: PathBuf,
}

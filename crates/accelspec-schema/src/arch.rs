//! Host description: operating-system family, CPU architecture and address width.
//!
//! The resolver never asks the running process directly; it is handed a
//! [`Target`] so that every platform branch can be exercised from any host.
//!
//! # Example
//!
//! ```
//! use accelspec_schema::{Arch, Platform, Target};
//!
//! let target = Target::new(Platform::Darwin, Arch::Arm64);
//! assert!(target.is_apple_silicon());
//! assert_eq!(target.pointer_width, 64);
//! ```

use serde::{Deserialize, Serialize};

/// CPU architecture of the build host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// ARM64 (Apple Silicon, aarch64 Linux)
    Arm64,
    /// `x86_64` / amd64
    #[default]
    X86_64,
    /// 32-bit x86
    X86,
}

impl Arch {
    /// Get the architecture this binary was compiled for.
    pub fn current() -> Self {
        #[cfg(target_arch = "aarch64")]
        {
            Self::Arm64
        }
        #[cfg(target_arch = "x86")]
        {
            Self::X86
        }
        #[cfg(not(any(target_arch = "aarch64", target_arch = "x86")))]
        {
            Self::X86_64
        }
    }

    /// Platform-convention name (`arm64`, `x86_64`, `x86`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Arm64 => "arm64",
            Self::X86_64 => "x86_64",
            Self::X86 => "x86",
        }
    }

    /// Native pointer width in bits.
    pub fn pointer_width(&self) -> u32 {
        match self {
            Self::Arm64 | Self::X86_64 => 64,
            Self::X86 => 32,
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "arm64" | "aarch64" => Ok(Self::Arm64),
            "x86_64" | "amd64" | "x64" => Ok(Self::X86_64),
            "x86" | "i386" | "i686" | "win32" => Ok(Self::X86),
            _ => Err(format!("Unknown architecture: {s}")),
        }
    }
}

/// Operating-system family, as far as library search conventions care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Linux and other generic Unix systems
    #[default]
    Linux,
    /// macOS
    Darwin,
    /// Native Windows (MSVC-style toolchain)
    Windows,
    /// Cygwin's POSIX layer on Windows
    Cygwin,
}

impl Platform {
    /// Get the operating-system family this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::Darwin
        } else if cfg!(target_os = "cygwin") {
            Self::Cygwin
        } else if cfg!(windows) {
            Self::Windows
        } else {
            Self::Linux
        }
    }

    /// Lowercase family name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Darwin => "darwin",
            Self::Windows => "windows",
            Self::Cygwin => "cygwin",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linux" | "unix" => Ok(Self::Linux),
            "darwin" | "macos" | "osx" => Ok(Self::Darwin),
            "windows" | "win32" | "win" => Ok(Self::Windows),
            "cygwin" => Ok(Self::Cygwin),
            _ => Err(format!("Unknown platform: {s}")),
        }
    }
}

/// The machine a resolution run is performed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    /// Operating-system family
    pub platform: Platform,
    /// CPU architecture
    pub arch: Arch,
    /// Address width in bits (32 or 64)
    pub pointer_width: u32,
}

impl Target {
    /// A target with the pointer width implied by `arch`.
    pub fn new(platform: Platform, arch: Arch) -> Self {
        Self {
            platform,
            arch,
            pointer_width: arch.pointer_width(),
        }
    }

    /// Describe the running host.
    ///
    /// `archflags` is the value of the `ARCHFLAGS` environment variable, if
    /// set. On macOS, `-arch arm64` forces an Apple Silicon build even when
    /// this binary runs under Rosetta.
    pub fn detect(archflags: Option<&str>) -> Self {
        let platform = Platform::current();
        let mut arch = Arch::current();
        if platform == Platform::Darwin && archflags.map(str::trim) == Some("-arch arm64") {
            arch = Arch::Arm64;
        }
        Self::new(platform, arch)
    }

    /// True for macOS on ARM64.
    pub fn is_apple_silicon(&self) -> bool {
        self.platform == Platform::Darwin && self.arch == Arch::Arm64
    }

    /// Short `<platform>-<arch>` tag used in log lines.
    pub fn tag(&self) -> String {
        format!("{}-{}", self.platform, self.arch)
    }
}

impl Default for Target {
    fn default() -> Self {
        Self::new(Platform::current(), Arch::current())
    }
}

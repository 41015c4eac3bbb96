//! Remote support bundles fetched by the resource cache.

use serde::{Deserialize, Serialize};

/// Container format of a remote archive.
///
/// The format is a property of the resource itself and is never sniffed
/// from the downloaded bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveFormat {
    /// PKZIP archive
    Zip,
    /// gzip-compressed tarball
    TarGz,
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Zip => write!(f, "zip"),
            Self::TarGz => write!(f, "tar.gz"),
        }
    }
}

/// A prebuilt support bundle that can be fetched and extracted once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteResource {
    /// File name on the download server (e.g. `winstuff.zip`)
    pub archive: String,
    /// Directory name the archive is extracted into (e.g. `winstuff`)
    pub name: String,
    /// Container format
    pub format: ArchiveFormat,
}

impl RemoteResource {
    /// Create a catalogue entry.
    pub fn new(archive: impl Into<String>, name: impl Into<String>, format: ArchiveFormat) -> Self {
        Self {
            archive: archive.into(),
            name: name.into(),
            format,
        }
    }

    /// Prebuilt FreeType headers and import libraries for Windows.
    pub fn winstuff() -> Self {
        Self::new("winstuff.zip", "winstuff", ArchiveFormat::Zip)
    }

    /// Prebuilt Homebrew tree for Apple Silicon.
    pub fn m1stuff() -> Self {
        Self::new("m1stuff.tar.gz", "m1stuff", ArchiveFormat::TarGz)
    }

    /// Look up a known resource by its directory name or archive name.
    pub fn known(name: &str) -> Option<Self> {
        [Self::winstuff(), Self::m1stuff()]
            .into_iter()
            .find(|r| r.name == name || r.archive == name)
    }
}

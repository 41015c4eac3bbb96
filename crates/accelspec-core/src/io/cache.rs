//! Fetch-once cache for remote support bundles.
//!
//! ## Layout
//!
//! ```text
//! <extraction_root>/
//! └── <resource.name>/
//!     ├── ...         # archive contents
//!     └── .done       # line 1: UTC timestamp, line 2: blake3:<tree digest>
//! ```
//!
//! The presence of `.done` is the only thing [`ResourceCache::ensure`]
//! looks at. A directory without it is treated as an interrupted
//! extraction and rebuilt from scratch. The digest on line 2 is only
//! consulted by [`CachedResource::verify`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use accelspec_schema::RemoteResource;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::io::download::{ArchiveSource, DownloadError};
use crate::io::extract::{ExtractError, extract_bytes};

/// Name of the completion marker inside an extracted resource.
pub const DONE_MARKER: &str = ".done";

const DIGEST_PREFIX: &str = "blake3:";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("{0} is not cached and downloads are disabled")]
    Offline(String),

    #[error("Download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("Extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Not extracted: {}", .0.display())]
    NotExtracted(PathBuf),
}

/// A resource that has been fully extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResource {
    /// The catalogue entry this directory holds
    pub resource: RemoteResource,
    /// `<extraction_root>/<resource.name>`
    pub root: PathBuf,
    /// `<root>/.done`
    pub marker: PathBuf,
}

impl CachedResource {
    fn at(resource: &RemoteResource, extraction_root: &Path) -> Self {
        let root = extraction_root.join(&resource.name);
        let marker = root.join(DONE_MARKER);
        Self {
            resource: resource.clone(),
            root,
            marker,
        }
    }

    /// The extracted tree.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Whether the completion marker exists.
    pub fn is_complete(&self) -> bool {
        self.marker.is_file()
    }

    /// Re-hash the extracted tree and compare it with the digest recorded
    /// in the marker. Returns `false` on mismatch or when the marker holds
    /// no digest.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotExtracted`] if there is no marker, or an IO
    /// error if the tree cannot be read.
    pub fn verify(&self) -> Result<bool, CacheError> {
        if !self.is_complete() {
            return Err(CacheError::NotExtracted(self.root.clone()));
        }
        let marker = fs::read_to_string(&self.marker)?;
        let Some(recorded) = marker
            .lines()
            .find_map(|l| l.trim().strip_prefix(DIGEST_PREFIX))
        else {
            return Ok(false);
        };
        Ok(tree_digest(&self.root)? == recorded)
    }
}

/// Downloads and extracts [`RemoteResource`]s at most once per directory.
///
/// Not synchronised: two processes racing on the same directory may both
/// download.
#[derive(Debug)]
pub struct ResourceCache<S> {
    source: S,
    offline: bool,
}

impl<S: ArchiveSource> ResourceCache<S> {
    /// Create a cache that downloads from `source`.
    pub fn new(source: S) -> Self {
        Self {
            source,
            offline: false,
        }
    }

    /// Refuse to touch the network; only already extracted resources are served.
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Make sure `resource` is extracted under `extraction_root` and return it.
    ///
    /// Returns immediately, without network access, when the marker exists.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Offline`] when a download would be needed but the
    /// cache is offline. Network, extraction and filesystem failures are
    /// returned as-is; they are not retried.
    pub fn ensure(
        &self,
        resource: &RemoteResource,
        extraction_root: &Path,
    ) -> Result<CachedResource, CacheError> {
        let cached = CachedResource::at(resource, extraction_root);

        if cached.is_complete() {
            debug!(path = %cached.root.display(), "resource already extracted");
            return Ok(cached);
        }

        if self.offline {
            return Err(CacheError::Offline(resource.archive.clone()));
        }

        if cached.root.exists() {
            warn!(path = %cached.root.display(), "discarding incomplete extraction");
            fs::remove_dir_all(&cached.root)?;
        }
        fs::create_dir_all(&cached.root)?;

        info!(
            url = %self.source.describe(&resource.archive),
            format = %resource.format,
            "fetching support bundle"
        );
        let data = self.source.fetch(&resource.archive)?;
        let files = extract_bytes(&data, resource.format, &cached.root)?;
        debug!(count = files.len(), "extracted files");

        let digest = tree_digest(&cached.root)?;
        let stamp = chrono::Utc::now().format("%Y%m%dU%H%M%S");
        fs::write(&cached.marker, format!("{stamp}\n{DIGEST_PREFIX}{digest}\n"))?;

        Ok(cached)
    }
}

/// Anything that can hand out extracted resources.
///
/// Lets platform conventions and the assembler ask for bundles without
/// knowing where the bytes come from.
pub trait ResourceProvider {
    /// See [`ResourceCache::ensure`].
    ///
    /// # Errors
    ///
    /// Returns a [`CacheError`] if the resource cannot be made available.
    fn provide(
        &self,
        resource: &RemoteResource,
        extraction_root: &Path,
    ) -> Result<CachedResource, CacheError>;
}

impl<S: ArchiveSource> ResourceProvider for ResourceCache<S> {
    fn provide(
        &self,
        resource: &RemoteResource,
        extraction_root: &Path,
    ) -> Result<CachedResource, CacheError> {
        self.ensure(resource, extraction_root)
    }
}

/// Content digest of every regular file under `dir`, in path order.
///
/// A top-level `.done` marker is excluded so the digest can be stored in it.
///
/// # Errors
///
/// Returns an IO error if the tree cannot be walked or a file cannot be read.
pub fn tree_digest(dir: &Path) -> io::Result<String> {
    let mut hasher = blake3::Hasher::new();

    for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(dir)
            .map_err(io::Error::other)?;
        if rel == Path::new(DONE_MARKER) {
            continue;
        }
        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update(&[0]);
        hasher.update(&fs::read(entry.path())?);
    }

    Ok(hex::encode(hasher.finalize().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::extract::tests::{tar_gz_bytes, zip_bytes};
    use accelspec_schema::ArchiveFormat;
    use std::cell::Cell;
    use tempfile::tempdir;

    /// Serves a fixed payload and counts fetches.
    struct CountingSource {
        payload: Vec<u8>,
        fetches: Cell<usize>,
    }

    impl CountingSource {
        fn new(payload: Vec<u8>) -> Self {
            Self {
                payload,
                fetches: Cell::new(0),
            }
        }
    }

    impl ArchiveSource for CountingSource {
        fn describe(&self, archive: &str) -> String {
            format!("memory://{archive}")
        }

        fn fetch(&self, _archive: &str) -> Result<Vec<u8>, DownloadError> {
            self.fetches.set(self.fetches.get() + 1);
            Ok(self.payload.clone())
        }
    }

    fn winstuff_payload() -> Vec<u8> {
        zip_bytes(&[
            ("include/ft2build.h", b"#define FT2_BUILD_H"),
            ("libs/amd64/freetype.lib", b"lib"),
        ])
    }

    #[test]
    fn test_ensure_extracts_and_writes_marker() {
        let dir = tempdir().unwrap();
        let source = CountingSource::new(winstuff_payload());
        let cache = ResourceCache::new(&source);

        let cached = cache.ensure(&RemoteResource::winstuff(), dir.path()).unwrap();

        assert_eq!(cached.path(), dir.path().join("winstuff"));
        assert!(cached.path().join("include/ft2build.h").is_file());
        let marker = fs::read_to_string(&cached.marker).unwrap();
        let mut lines = marker.lines();
        let stamp = lines.next().unwrap();
        assert_eq!(stamp.len(), 15);
        assert_eq!(&stamp[8..9], "U");
        assert!(lines.next().unwrap().starts_with("blake3:"));
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let dir = tempdir().unwrap();
        let source = CountingSource::new(winstuff_payload());
        let cache = ResourceCache::new(&source);
        let resource = RemoteResource::winstuff();

        let first = cache.ensure(&resource, dir.path()).unwrap();
        let before = tree_digest(first.path()).unwrap();
        let marker_before = fs::read(&first.marker).unwrap();

        let second = cache.ensure(&resource, dir.path()).unwrap();

        assert_eq!(source.fetches.get(), 1);
        assert_eq!(first, second);
        assert_eq!(tree_digest(second.path()).unwrap(), before);
        assert_eq!(fs::read(&second.marker).unwrap(), marker_before);
    }

    #[test]
    fn test_incomplete_extraction_is_rebuilt() {
        let dir = tempdir().unwrap();
        let stale = dir.path().join("winstuff");
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join("leftover.tmp"), "partial").unwrap();

        let source = CountingSource::new(winstuff_payload());
        let cached = ResourceCache::new(&source)
            .ensure(&RemoteResource::winstuff(), dir.path())
            .unwrap();

        assert_eq!(source.fetches.get(), 1);
        assert!(!cached.path().join("leftover.tmp").exists());
        assert!(cached.is_complete());
    }

    #[test]
    fn test_offline_serves_existing_extraction() {
        let dir = tempdir().unwrap();
        let source = CountingSource::new(winstuff_payload());
        ResourceCache::new(&source)
            .ensure(&RemoteResource::winstuff(), dir.path())
            .unwrap();

        let offline = ResourceCache::new(&source).offline(true);
        assert!(offline.ensure(&RemoteResource::winstuff(), dir.path()).is_ok());
        assert_eq!(source.fetches.get(), 1);
    }

    #[test]
    fn test_offline_refuses_download() {
        let dir = tempdir().unwrap();
        let source = CountingSource::new(winstuff_payload());
        let cache = ResourceCache::new(&source).offline(true);

        let err = cache
            .ensure(&RemoteResource::winstuff(), dir.path())
            .unwrap_err();

        assert!(matches!(err, CacheError::Offline(ref a) if a == "winstuff.zip"));
        assert_eq!(source.fetches.get(), 0);
        assert!(!dir.path().join("winstuff").exists());
    }

    #[test]
    fn test_extraction_failure_propagates_without_marker() {
        let dir = tempdir().unwrap();
        let source = CountingSource::new(b"garbage".to_vec());

        let err = ResourceCache::new(&source)
            .ensure(&RemoteResource::winstuff(), dir.path())
            .unwrap_err();

        assert!(matches!(err, CacheError::Extract(_)));
        assert!(!dir.path().join("winstuff").join(DONE_MARKER).exists());
    }

    #[test]
    fn test_tar_gz_resource() {
        let dir = tempdir().unwrap();
        let payload = tar_gz_bytes(&[("m1stuff/opt/homebrew/include/freetype2/ft2build.h", b"x")]);
        let source = CountingSource::new(payload);
        let resource = RemoteResource::new("m1stuff.tar.gz", "m1stuff", ArchiveFormat::TarGz);

        let cached = ResourceCache::new(&source).ensure(&resource, dir.path()).unwrap();

        assert!(cached
            .path()
            .join("m1stuff/opt/homebrew/include/freetype2/ft2build.h")
            .is_file());
    }

    #[test]
    fn test_verify_detects_tampering() {
        let dir = tempdir().unwrap();
        let source = CountingSource::new(winstuff_payload());
        let cached = ResourceCache::new(&source)
            .ensure(&RemoteResource::winstuff(), dir.path())
            .unwrap();

        assert!(cached.verify().unwrap());

        fs::write(cached.path().join("include/ft2build.h"), "truncated").unwrap();
        assert!(!cached.verify().unwrap());
    }

    #[test]
    fn test_verify_requires_marker() {
        let dir = tempdir().unwrap();
        let cached = CachedResource::at(&RemoteResource::winstuff(), dir.path());
        assert!(matches!(cached.verify(), Err(CacheError::NotExtracted(_))));
    }

    #[cfg(feature = "network")]
    #[test]
    fn test_http_download_happens_once() {
        use crate::io::download::HttpSource;

        let mut server = mockito::Server::new();
        let m = server
            .mock("GET", "/winstuff.zip")
            .with_status(200)
            .with_body(winstuff_payload())
            .expect(1)
            .create();

        let dir = tempdir().unwrap();
        let cache = ResourceCache::new(HttpSource::new(server.url()).unwrap());
        cache.ensure(&RemoteResource::winstuff(), dir.path()).unwrap();
        cache.ensure(&RemoteResource::winstuff(), dir.path()).unwrap();

        m.assert();
    }
}

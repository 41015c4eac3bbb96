//! Blocking archive download.
//!
//! The resource cache only needs "give me the bytes of this archive", so
//! the network sits behind [`ArchiveSource`] and can be swapped for an
//! in-memory double in tests.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[cfg(feature = "network")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Somewhere archives can be fetched from by file name.
pub trait ArchiveSource {
    /// Human-readable location of `archive`, for log lines.
    fn describe(&self, archive: &str) -> String;

    /// Fetch the full contents of `archive`.
    ///
    /// # Errors
    ///
    /// Returns a [`DownloadError`] if the archive cannot be retrieved.
    fn fetch(&self, archive: &str) -> Result<Vec<u8>, DownloadError>;
}

impl<T: ArchiveSource + ?Sized> ArchiveSource for &T {
    fn describe(&self, archive: &str) -> String {
        (**self).describe(archive)
    }
    fn fetch(&self, archive: &str) -> Result<Vec<u8>, DownloadError> {
        (**self).fetch(archive)
    }
}

/// Default download location for support bundles.
pub const DEFAULT_BASE_URL: &str = "https://www.reportlab.com/ftp/";

/// Fetches archives over HTTP(S) relative to a base URL.
#[cfg(feature = "network")]
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::blocking::Client,
    base_url: String,
}

#[cfg(feature = "network")]
impl HttpSource {
    /// Create a source rooted at `base_url` (a trailing `/` is added if missing).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self, DownloadError> {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let client = reqwest::blocking::Client::builder()
            .user_agent(crate::USER_AGENT)
            .build()?;
        Ok(Self { client, base_url })
    }

    /// Full URL of `archive`.
    pub fn url_for(&self, archive: &str) -> String {
        format!("{}{archive}", self.base_url)
    }
}

#[cfg(feature = "network")]
impl ArchiveSource for HttpSource {
    fn describe(&self, archive: &str) -> String {
        self.url_for(archive)
    }

    fn fetch(&self, archive: &str) -> Result<Vec<u8>, DownloadError> {
        let url = self.url_for(archive);
        tracing::debug!(%url, "downloading archive");
        let response = self.client.get(&url).send()?.error_for_status()?;
        let bytes = response.bytes()?;
        tracing::debug!(%url, size = bytes.len(), "download complete");
        Ok(bytes.to_vec())
    }
}

//! Archive extraction module
//!
//! Unpacks zip and tar.gz payloads held in memory into a directory.

use std::fs::{self, File};
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use accelspec_schema::ArchiveFormat;
use thiserror::Error;
use zip::ZipArchive;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Archive error: {0}")]
    Archive(String),
}

/// Information about an extracted file
#[derive(Debug, Clone)]
pub struct ExtractedFile {
    /// Path relative to extraction root
    pub relative_path: PathBuf,
    /// Absolute path on disk
    pub absolute_path: PathBuf,
}

/// Extract `data` into `dest_dir` according to `format`.
pub fn extract_bytes(
    data: &[u8],
    format: ArchiveFormat,
    dest_dir: &Path,
) -> Result<Vec<ExtractedFile>, ExtractError> {
    match format {
        ArchiveFormat::Zip => extract_zip(Cursor::new(data), dest_dir),
        ArchiveFormat::TarGz => extract_tar_gz(data, dest_dir),
    }
}

/// Extract a tar.gz stream to a destination directory
pub fn extract_tar_gz<R: Read>(
    reader: R,
    dest_dir: &Path,
) -> Result<Vec<ExtractedFile>, ExtractError> {
    let gz_decoder = flate2::read::GzDecoder::new(reader);
    extract_tar(gz_decoder, dest_dir)
}

/// Extract a tar archive from a reader
fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> Result<Vec<ExtractedFile>, ExtractError> {
    fs::create_dir_all(dest_dir)?;

    let mut archive = tar::Archive::new(reader);
    let mut extracted_files = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let relative_path: PathBuf = entry.path()?.components().collect();

        // unpack_in refuses `..` and writes through links that leave dest_dir
        if !entry.unpack_in(dest_dir)? {
            return Err(ExtractError::Archive(format!(
                "Invalid path in archive: {}",
                relative_path.display()
            )));
        }
        if entry.header().entry_type().is_dir() {
            continue;
        }
        let absolute_path = dest_dir.join(&relative_path);

        extracted_files.push(ExtractedFile {
            relative_path,
            absolute_path,
        });
    }

    Ok(extracted_files)
}

/// Extract a zip archive
pub fn extract_zip<R: Read + io::Seek>(
    reader: R,
    dest_dir: &Path,
) -> Result<Vec<ExtractedFile>, ExtractError> {
    let mut archive = ZipArchive::new(reader).map_err(|e| ExtractError::Archive(e.to_string()))?;

    fs::create_dir_all(dest_dir)?;
    let mut extracted_files = Vec::new();

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| ExtractError::Archive(e.to_string()))?;
        let Some(relative_path) = file.enclosed_name() else {
            continue;
        };

        if file.is_dir() {
            fs::create_dir_all(dest_dir.join(&relative_path))?;
            continue;
        }

        let absolute_path = dest_dir.join(&relative_path);
        if let Some(p) = absolute_path.parent() {
            fs::create_dir_all(p)?;
        }

        let mut outfile = File::create(&absolute_path)?;
        io::copy(&mut file, &mut outfile)?;

        #[cfg(unix)]
        if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&absolute_path, fs::Permissions::from_mode(mode))?;
        }

        extracted_files.push(ExtractedFile {
            relative_path,
            absolute_path,
        });
    }

    Ok(extracted_files)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    /// Build an in-memory zip from `(path, contents)` pairs.
    pub(crate) fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            for (name, data) in files {
                writer.start_file(*name, options).unwrap();
                writer.write_all(data).unwrap();
            }
            writer.finish().unwrap();
        }
        buf.into_inner()
    }

    /// Build an in-memory tar.gz from `(path, contents)` pairs.
    pub(crate) fn tar_gz_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_extract_zip_nested() {
        let dir = tempdir().unwrap();
        let data = zip_bytes(&[
            ("include/ft2build.h", b"/* ft */"),
            ("libs/amd64/freetype.lib", b"lib"),
        ]);

        let files = extract_bytes(&data, ArchiveFormat::Zip, dir.path()).unwrap();

        assert_eq!(files.len(), 2);
        assert!(dir.path().join("include/ft2build.h").is_file());
        assert!(dir.path().join("libs/amd64/freetype.lib").is_file());
    }

    #[test]
    fn test_extract_tar_gz_nested() {
        let dir = tempdir().unwrap();
        let data = tar_gz_bytes(&[("m1stuff/opt/homebrew/lib/libfreetype.a", b"ar")]);

        let files = extract_bytes(&data, ArchiveFormat::TarGz, dir.path()).unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(
            files[0].relative_path,
            PathBuf::from("m1stuff/opt/homebrew/lib/libfreetype.a")
        );
        assert!(files[0].absolute_path.is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_tar_refuses_write_through_symlink() {
        let dir = tempdir().unwrap();
        let outside = dir.path().join("outside");
        fs::create_dir_all(&outside).unwrap();
        let dest = dir.path().join("dest");

        let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let mut link = tar::Header::new_gnu();
        link.set_entry_type(tar::EntryType::Symlink);
        link.set_size(0);
        link.set_mode(0o777);
        builder.append_link(&mut link, "link", &outside).unwrap();
        let body: &[u8] = b"evil";
        let mut file = tar::Header::new_gnu();
        file.set_size(body.len() as u64);
        file.set_mode(0o644);
        file.set_cksum();
        builder.append_data(&mut file, "link/evil.h", body).unwrap();
        let data = builder.into_inner().unwrap().finish().unwrap();

        assert!(extract_bytes(&data, ArchiveFormat::TarGz, &dest).is_err());
        assert!(!outside.join("evil.h").exists());
    }

    #[test]
    fn test_extract_garbage_zip_fails() {
        let dir = tempdir().unwrap();
        let err = extract_bytes(b"not a zip", ArchiveFormat::Zip, dir.path()).unwrap_err();
        assert!(matches!(err, ExtractError::Archive(_)));
    }

    #[test]
    fn test_extract_garbage_tar_gz_fails() {
        let dir = tempdir().unwrap();
        assert!(extract_bytes(b"not gzip", ArchiveFormat::TarGz, dir.path()).is_err());
    }
}

//! Archive extraction into scratch directories.
//!
//! Packages ship as gzip-compressed tarballs. Extraction happens in-process so
//! a truncated or corrupted archive surfaces as an error here, before anything
//! touches the installation target.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;

use crate::error::{HubkitError, Result};

/// Unpacks `archive` into `destination`, creating it if needed.
pub fn extract_archive(archive: &Path, destination: &Path) -> Result<()> {
    std::fs::create_dir_all(destination)?;

    let file = File::open(archive)?;
    let decoder = GzDecoder::new(BufReader::new(file));
    let mut tar = tar::Archive::new(decoder);

    tar.unpack(destination).map_err(|e| {
        HubkitError::Integrity(format!(
            "Failed to extract {}: {}",
            archive.display(),
            e
        ))
    })?;

    Ok(())
}

/// Returns the single top-level entry an extracted archive is expected to
/// contain. Zero entries means the archive was empty or bogus and the install
/// attempt must be abandoned.
pub fn extracted_root(scratch: &Path) -> Result<PathBuf> {
    let mut entries = std::fs::read_dir(scratch)?;

    match entries.next() {
        Some(entry) => Ok(entry?.path()),
        None => Err(HubkitError::Integrity(
            "Archive extraction produced no files".to_string(),
        )),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    /// Builds a .tar.gz containing `root_dir/` with the given files.
    pub(crate) fn build_archive(dest: &Path, root_dir: &str, files: &[(&str, &[u8])]) {
        let file = File::create(dest).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, format!("{}/{}", root_dir, name), *content)
                .unwrap();
        }

        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_extract_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("pkg.tar.gz");
        build_archive(&archive, "hub-core-2.3.0", &[("hub-core", b"#!/bin/sh\n")]);

        let scratch = dir.path().join("scratch");
        extract_archive(&archive, &scratch).unwrap();

        let root = extracted_root(&scratch).unwrap();
        assert_eq!(root.file_name().unwrap(), "hub-core-2.3.0");
        assert_eq!(
            std::fs::read(root.join("hub-core")).unwrap(),
            b"#!/bin/sh\n"
        );
    }

    #[test]
    fn test_truncated_archive_fails_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("pkg.tar.gz");
        build_archive(&archive, "root", &[("file", &[0u8; 8192])]);

        // Cut the archive in half to simulate an interrupted download.
        let bytes = std::fs::read(&archive).unwrap();
        let mut truncated = File::create(&archive).unwrap();
        truncated.write_all(&bytes[..bytes.len() / 2]).unwrap();

        let scratch = dir.path().join("scratch");
        let err = extract_archive(&archive, &scratch).unwrap_err();
        assert!(matches!(err, HubkitError::Integrity(_)));
    }

    #[test]
    fn test_empty_scratch_is_integrity_error() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("scratch");
        std::fs::create_dir_all(&scratch).unwrap();

        let err = extracted_root(&scratch).unwrap_err();
        assert!(err.to_string().contains("no files"));
    }
}

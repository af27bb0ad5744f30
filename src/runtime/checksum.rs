//! SHA-1 verification of downloaded archives.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha1::{Digest, Sha1};

/// Computes the lowercase hex SHA-1 digest of a file, streaming in chunks.
pub fn sha1_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buf = [0u8; 64 * 1024];

    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Returns true when the file's digest matches `expected` (case-insensitive).
/// An unreadable file counts as a mismatch so callers fall back to a fresh
/// download instead of failing the whole install.
pub fn verify_sha1(path: &Path, expected: &str) -> bool {
    match sha1_file(path) {
        Ok(actual) => actual == expected.to_lowercase(),
        Err(_) => false,
    }
}

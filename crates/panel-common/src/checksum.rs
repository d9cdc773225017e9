//! SHA-256 fingerprints for emitted fixtures
//!
//! Two builds over the same dump must produce byte-identical fixtures; the
//! fingerprint written next to each dump makes that checkable without diffing
//! multi-megabyte JSON files.

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Hex encoded SHA-256 of an in-memory buffer
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hex encoded SHA-256 of a file's content
pub fn fingerprint_file(path: impl AsRef<Path>) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Path of the `.sha256` sidecar for a file
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".sha256");
    PathBuf::from(name)
}

/// Write `<digest>  <file name>` next to the file and return the digest
pub fn write_sidecar(path: &Path) -> Result<String> {
    let digest = fingerprint_file(path)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    std::fs::write(sidecar_path(path), format!("{digest}  {file_name}\n"))?;
    Ok(digest)
}

/// Whether the file still matches its sidecar fingerprint
pub fn verify_sidecar(path: &Path) -> Result<bool> {
    let recorded = std::fs::read_to_string(sidecar_path(path))?;
    let expected = recorded.split_whitespace().next().unwrap_or_default();
    Ok(fingerprint_file(path)? == expected)
}

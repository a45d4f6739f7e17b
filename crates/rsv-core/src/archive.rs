//! Build archive integrity checks.
//!
//! An archive is only usable once the SHA-256 of its bytes matches the hash
//! recorded by the testbed. Nothing reaches storage without passing here.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

pub const ARCHIVE_EXTENSION: &str = "barrel";

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("recorded archive hash '{hash}' is not a hex digest")]
    InvalidHash { hash: String },
    #[error("hash recorded for build archive, but {} was not found", path.display())]
    Missing { path: PathBuf },
    #[error("build archive {} hashes to {actual}, not the recorded {expected}", path.display())]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("failed to read build archive {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An archive whose content hash has been confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedArchive {
    pub path: PathBuf,
    pub hash: String,
    pub size: u64,
}

/// Location of the archive for `hash` inside an artifact directory.
#[must_use]
pub fn archive_path(artifact_dir: &Path, hash: &str) -> PathBuf {
    artifact_dir.join(format!("{hash}.{ARCHIVE_EXTENSION}"))
}

/// Recompute the hash of `path` and compare it to `expected`.
pub fn verify_archive(path: &Path, expected: &str) -> Result<VerifiedArchive, ArchiveError> {
    if expected.is_empty() || !expected.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ArchiveError::InvalidHash {
            hash: expected.to_string(),
        });
    }
    let (actual, size) = match compute_sha256(path) {
        Ok(digest) => digest,
        Err(source) if source.kind() == ErrorKind::NotFound => {
            return Err(ArchiveError::Missing {
                path: path.to_path_buf(),
            })
        }
        Err(source) => {
            return Err(ArchiveError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if actual != expected {
        return Err(ArchiveError::HashMismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(VerifiedArchive {
        path: path.to_path_buf(),
        hash: expected.to_string(),
        size,
    })
}

/// `true` only when the file exists and hashes to `expected`.
#[must_use]
pub fn validate_archive(path: &Path, expected: &str) -> bool {
    verify_archive(path, expected).is_ok()
}

/// Hex SHA-256 digest and byte length of a file.
pub fn compute_sha256(path: &Path) -> std::io::Result<(String, u64)> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut size = 0u64;
    let mut buf = [0u8; 32 * 1024];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
        size += read as u64;
    }
    Ok((hex::encode(hasher.finalize()), size))
}

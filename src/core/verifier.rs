//! Integrity check for the cross-device copy fallback.
//!
//! The mover digests each file while it copies. Before the source is
//! deleted, every copied file is read back and compared to its recorded
//! digest.

use anyhow::{Result, bail};
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Largest number of discrepancies spelled out in an error message.
const REPORTED_DISCREPANCIES: usize = 5;

/// A file written by the copy fallback, with the BLAKE3 digest of the bytes
/// that were read from the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedFile {
    /// Relative to the copied item. Empty when the item is itself a file.
    pub relative_path: PathBuf,
    pub digest: blake3::Hash,
    pub len: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyCheck {
    pub files: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discrepancy {
    Missing(PathBuf),
    Altered(PathBuf),
    Unreadable(PathBuf, String),
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(path) => write!(f, "{}: missing from copy", path.display()),
            Self::Altered(path) => write!(f, "{}: content differs", path.display()),
            Self::Unreadable(path, reason) => {
                write!(f, "{}: unreadable ({})", path.display(), reason)
            }
        }
    }
}

/// Compare the copy rooted at `target` with the digests taken while copying.
pub fn verify_copy(target: &Path, expected: &[CopiedFile]) -> Result<CopyCheck> {
    let discrepancies: Vec<Discrepancy> = expected
        .iter()
        .filter_map(|file| check_file(target, file))
        .collect();

    if !discrepancies.is_empty() {
        warn!(
            target = %target.display(),
            discrepancies = discrepancies.len(),
            "Copy does not match its source"
        );
        bail!(describe(target, &discrepancies));
    }

    let check = CopyCheck {
        files: expected.len(),
        bytes: expected.iter().map(|file| file.len).sum(),
    };
    debug!(
        target = %target.display(),
        files = check.files,
        bytes = check.bytes,
        "Copy verified"
    );
    Ok(check)
}

/// BLAKE3 digest of a file's current content.
pub fn digest_file(path: &Path) -> io::Result<blake3::Hash> {
    let mut hasher = blake3::Hasher::new();
    hasher.update_reader(File::open(path)?)?;
    Ok(hasher.finalize())
}

fn check_file(target: &Path, file: &CopiedFile) -> Option<Discrepancy> {
    let path = if file.relative_path.as_os_str().is_empty() {
        target.to_path_buf()
    } else {
        target.join(&file.relative_path)
    };

    if !path.is_file() {
        return Some(Discrepancy::Missing(file.relative_path.clone()));
    }

    match digest_file(&path) {
        Ok(digest) if digest == file.digest => None,
        Ok(_) => Some(Discrepancy::Altered(file.relative_path.clone())),
        Err(e) => Some(Discrepancy::Unreadable(
            file.relative_path.clone(),
            e.to_string(),
        )),
    }
}

fn describe(target: &Path, discrepancies: &[Discrepancy]) -> String {
    let mut message = format!(
        "Copy at {} failed verification ({} discrepancies)",
        target.display(),
        discrepancies.len()
    );
    for discrepancy in discrepancies.iter().take(REPORTED_DISCREPANCIES) {
        message.push_str(&format!("\n  {}", discrepancy));
    }
    if discrepancies.len() > REPORTED_DISCREPANCIES {
        message.push_str(&format!(
            "\n  and {} more",
            discrepancies.len() - REPORTED_DISCREPANCIES
        ));
    }
    message
}

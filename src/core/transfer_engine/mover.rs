//! Relocation of a single candidate into an AIP category folder.
//!
//! Moves are not transactional. A move is a plain `rename` when source and
//! destination share a filesystem. Across filesystems (`EXDEV`) it falls back
//! to copy, verify, then delete:
//! - files are copied with large buffered I/O and hashed inline (BLAKE3)
//! - permissions and timestamps are preserved
//! - the destination is verified against the inline hashes
//! - the source is removed only after verification passes
//!
//! A failed copy or verification removes the partial destination and leaves
//! the source where it was. There is no rollback across items.

use anyhow::{Context, Result, anyhow, bail};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::core::verifier::{CopiedFile, verify_copy};

/// Buffer size for the copy fallback's reads and writes.
const COPY_BUFFER_SIZE: usize = 128 * 1024;

/// Move `source` into `destination_dir`, keeping its basename.
///
/// Returns the new path of the item.
pub fn move_item(source: &Path, destination_dir: &Path) -> Result<PathBuf> {
    let name = source
        .file_name()
        .ok_or_else(|| anyhow!("Can't move '{}': no file name", source.display()))?;
    let target = destination_dir.join(name);

    // Refuse to overwrite, matching the behaviour of moving into a folder
    if target.symlink_metadata().is_ok() {
        bail!(
            "Destination already exists: {}. Refusing to overwrite.",
            target.display()
        );
    }

    match fs::rename(source, &target) {
        Ok(()) => Ok(target),
        Err(e) if is_cross_device_error(&e) => {
            info!(
                source = %source.display(),
                target = %target.display(),
                "Rename crosses filesystems, falling back to copy"
            );
            copy_then_remove(source, &target)?;
            Ok(target)
        }
        Err(e) => Err(anyhow!(
            "Failed to move '{}' to '{}': {}",
            source.display(),
            target.display(),
            e
        )),
    }
}

/// Copy `source` to `target`, verify the copy, then delete `source`.
pub(crate) fn copy_then_remove(source: &Path, target: &Path) -> Result<()> {
    let copied = match copy_tree(source, target) {
        Ok(copied) => copied,
        Err(e) => {
            remove_partial(target);
            return Err(e.context(format!("Failed to copy '{}'", source.display())));
        }
    };

    verify_then_remove(source, target, &copied)
}

/// Check a finished copy against its digests. On success the source is
/// deleted; on failure the copy is.
fn verify_then_remove(source: &Path, target: &Path, copied: &[CopiedFile]) -> Result<()> {
    if let Err(e) = verify_copy(target, copied) {
        remove_partial(target);
        return Err(e.context(format!("Copy of '{}' did not verify", source.display())));
    }

    // The verified copy stays put even if this fails; the source may already
    // be partially gone.
    let removed = if source.is_dir() {
        fs::remove_dir_all(source)
    } else {
        fs::remove_file(source)
    };
    removed.with_context(|| {
        format!(
            "Copied '{}' to '{}' but could not remove the source",
            source.display(),
            target.display()
        )
    })?;

    debug!(
        source = %source.display(),
        target = %target.display(),
        files = copied.len(),
        "Copy fallback complete"
    );
    Ok(())
}

/// Copy a file or directory tree, returning a digest for every regular file.
fn copy_tree(source: &Path, target: &Path) -> Result<Vec<CopiedFile>> {
    let metadata = source
        .symlink_metadata()
        .with_context(|| format!("Failed to read metadata of {}", source.display()))?;

    if metadata.is_file() {
        let (digest, len) = copy_single_file(source, target)?;
        return Ok(vec![CopiedFile {
            relative_path: PathBuf::new(),
            digest,
            len,
        }]);
    }

    if metadata.file_type().is_symlink() {
        copy_symlink(source, target)?;
        return Ok(Vec::new());
    }

    if !metadata.is_dir() {
        bail!("Unsupported file type: {}", source.display());
    }

    fs::create_dir(target)
        .with_context(|| format!("Failed to create directory {}", target.display()))?;

    let mut copied = Vec::new();
    // Directories get their permissions after their contents are written
    let mut directories = vec![(source.to_path_buf(), target.to_path_buf())];

    for entry in WalkDir::new(source)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("Failed to walk {}", source.display()))?;
        let relative = entry.path().strip_prefix(source)?.to_path_buf();
        let dest_path = target.join(&relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir(&dest_path)
                .with_context(|| format!("Failed to create directory {}", dest_path.display()))?;
            directories.push((entry.path().to_path_buf(), dest_path));
        } else if file_type.is_file() {
            let (digest, len) = copy_single_file(entry.path(), &dest_path)?;
            copied.push(CopiedFile {
                relative_path: relative,
                digest,
                len,
            });
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &dest_path)?;
        } else {
            bail!("Unsupported file type: {}", entry.path().display());
        }
    }

    for (src_dir, dest_dir) in directories.iter().rev() {
        let permissions = fs::metadata(src_dir)?.permissions();
        if let Err(e) = fs::set_permissions(dest_dir, permissions) {
            debug!(
                dest = %dest_dir.display(),
                error = %e,
                "Failed to set directory permissions"
            );
        }
    }

    Ok(copied)
}

fn copy_symlink(source: &Path, target: &Path) -> Result<()> {
    let link = fs::read_link(source)
        .with_context(|| format!("Failed to read link {}", source.display()))?;
    std::os::unix::fs::symlink(&link, target)
        .with_context(|| format!("Failed to create link {}", target.display()))?;
    Ok(())
}

/// Copy one file, hashing it as it streams. Returns the hash and byte count.
fn copy_single_file(source: &Path, dest: &Path) -> Result<(blake3::Hash, u64)> {
    let source_metadata = fs::metadata(source)
        .with_context(|| format!("Failed to read source metadata: {}", source.display()))?;

    let source_file = File::open(source)
        .with_context(|| format!("Failed to open source file: {}", source.display()))?;
    let mut reader = BufReader::with_capacity(COPY_BUFFER_SIZE, source_file);

    let dest_file = File::create(dest)
        .with_context(|| format!("Failed to create destination file: {}", dest.display()))?;
    let mut writer = BufWriter::with_capacity(COPY_BUFFER_SIZE, dest_file);

    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut bytes_written: u64 = 0;

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .with_context(|| format!("Failed to read from {}", source.display()))?;
        if bytes_read == 0 {
            break;
        }

        writer
            .write_all(&buffer[..bytes_read])
            .with_context(|| format!("Failed to write to {}", dest.display()))?;
        hasher.update(&buffer[..bytes_read]);
        bytes_written += bytes_read as u64;
    }

    let inner = writer
        .into_inner()
        .map_err(|e| anyhow!("Failed to flush {}: {}", dest.display(), e.error()))?;
    inner
        .sync_all()
        .with_context(|| format!("Failed to sync {}", dest.display()))?;

    if let Err(e) = fs::set_permissions(dest, source_metadata.permissions()) {
        debug!(
            dest = %dest.display(),
            error = %e,
            "Failed to set file permissions"
        );
    }

    let atime = filetime::FileTime::from_last_access_time(&source_metadata);
    let mtime = filetime::FileTime::from_last_modification_time(&source_metadata);
    if let Err(e) = filetime::set_file_times(dest, atime, mtime) {
        debug!(
            dest = %dest.display(),
            error = %e,
            "Failed to preserve file timestamps"
        );
    }

    Ok((hasher.finalize(), bytes_written))
}

fn remove_partial(target: &Path) {
    let result = match target.symlink_metadata() {
        Ok(m) if m.is_dir() => fs::remove_dir_all(target),
        Ok(_) => fs::remove_file(target),
        Err(_) => return,
    };
    if let Err(e) = result {
        warn!(
            path = %target.display(),
            error = %e,
            "Failed to remove partial copy"
        );
    }
}

/// A rename that fails because source and destination are on different
/// filesystems.
fn is_cross_device_error(error: &io::Error) -> bool {
    error.raw_os_error() == Some(libc::EXDEV)
}

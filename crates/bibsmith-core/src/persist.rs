//! Crash-safe file replacement
//!
//! Every file bibsmith rewrites goes through [`write_atomic`]: the new
//! contents are written to a temporary file in the destination directory and
//! renamed over the target only once fully written and synced. Until the
//! rename, the target keeps its previous bytes.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{BibError, Result};

/// Replace `path` with `contents` atomically
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    write_atomic_with(path, |file| file.write_all(contents.as_bytes()))
}

/// Replace `path` with whatever `write` produces
///
/// If `write` fails, the temporary file is removed and `path` is untouched.
pub fn write_atomic_with<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut fs::File) -> std::io::Result<()>,
{
    let dir = parent_dir(path);
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| BibError::write(path, e))?;

    write(tmp.as_file_mut()).map_err(|e| BibError::write(path, e))?;
    tmp.as_file_mut()
        .sync_all()
        .map_err(|e| BibError::write(path, e))?;

    tmp.persist(path)
        .map_err(|e| BibError::write(path, e.error))?;
    tracing::debug!("Wrote {}", path.display());
    Ok(())
}

/// Path of the backup copy kept next to a file
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

/// Copy `path` to its backup location, if it exists
///
/// Returns the backup path when a copy was made.
pub fn backup(path: &Path) -> Result<Option<PathBuf>> {
    if !path.is_file() {
        return Ok(None);
    }
    let target = backup_path(path);
    fs::copy(path, &target).map_err(|e| BibError::write(&target, e))?;
    tracing::info!("Backed up {} to {}", path.display(), target.display());
    Ok(Some(target))
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

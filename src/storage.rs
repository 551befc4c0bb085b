//! File-system helpers shared by the dataset tables and the run state.
//!
//! Two guarantees live here:
//!
//! - [`atomic_write`] replaces a file by writing a sibling temp file and
//!   renaming it over the target, so a crash never leaves half a table.
//! - [`RunLock`] holds an exclusive `fs2` lock on a marker file in the work
//!   directory, so only one loop controller owns the tables at a time.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{Error, Result};

/// Name of the lock file created in the work directory.
pub const LOCK_FILE_NAME: &str = ".basis-opt.lock";

/// Write `contents` to `path` atomically.
pub(crate) fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));
    let mut file = File::create(&tmp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Copy `path` to `<path>_prev` if it exists.
pub(crate) fn backup_previous(path: &Path) -> Result<()> {
    if path.is_file() {
        let mut prev = path.as_os_str().to_owned();
        prev.push("_prev");
        std::fs::copy(path, PathBuf::from(prev))?;
    }
    Ok(())
}

/// An exclusive lock on a work directory, released on drop.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Acquire the lock for `work_dir`, failing immediately if another
    /// process (or another controller in this process) holds it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] when the lock is already held or the lock
    /// file cannot be created.
    pub fn acquire(work_dir: &Path) -> Result<Self> {
        let path = work_dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| Error::Storage(format!("{}: {e}", path.display())))?;
        file.try_lock_exclusive().map_err(|e| {
            Error::Storage(format!(
                "work directory {} is locked by another run: {e}",
                work_dir.display()
            ))
        })?;
        Ok(Self { file, path })
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        // Unlocking can only fail if the handle is already invalid.
        let _ = FileExt::unlock(&self.file);
    }
}

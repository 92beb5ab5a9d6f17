//! Advisory whole-file lock via `flock(2)`.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// Exclusive lock held for the lifetime of the guard.
///
/// The lock file itself is never removed; only the lock on it matters.
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Block until an exclusive lock on `path` is acquired.
    pub fn exclusive(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;

        loop {
            // SAFETY: fd is valid for the lifetime of `file`.
            let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if ret == 0 {
                break;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }

        tracing::trace!(path = %path.display(), "lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // SAFETY: fd is still open; closing it would release the lock anyway.
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
        tracing::trace!(path = %self.path.display(), "lock released");
    }
}

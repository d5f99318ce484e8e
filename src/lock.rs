//! Exclusive ownership of a data directory.
//!
//! `daemon` keeps the directory for its lifetime, `train` while it writes
//! artifacts. `query` and `health` only read and never take it.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

const LOCK_FILE_NAME: &str = "docsim.lock";

/// Held `flock` on `<base>/docsim.lock`, released when dropped.
pub struct DataDirLock {
    file: File,
    path: PathBuf,
}

impl DataDirLock {
    /// Take the lock without waiting. Fails with `WouldBlock` while another
    /// daemon or train run owns the directory.
    pub fn acquire(base_path: &Path) -> io::Result<Self> {
        let path = base_path.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        match flock(&file, Mode::ExclusiveNonBlocking) {
            Ok(()) => {
                log::debug!("locked {}", path.display());
                Ok(Self { file, path })
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                format!("{} is held by another docsim process", path.display()),
            )),
            Err(err) => Err(err),
        }
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        if let Err(err) = flock(&self.file, Mode::Unlock) {
            log::warn!("failed to unlock {}: {err}", self.path.display());
        }
    }
}

enum Mode {
    ExclusiveNonBlocking,
    Unlock,
}

#[cfg(unix)]
fn flock(file: &File, mode: Mode) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let operation = match mode {
        Mode::ExclusiveNonBlocking => libc::LOCK_EX | libc::LOCK_NB,
        Mode::Unlock => libc::LOCK_UN,
    };

    // EWOULDBLOCK maps to ErrorKind::WouldBlock
    if unsafe { libc::flock(file.as_raw_fd(), operation) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn flock(_file: &File, _mode: Mode) -> io::Result<()> {
    Ok(())
}

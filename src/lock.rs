//! Advisory lock over one layout.
//!
//! Inside a process the build worker is the only writer. The lock extends
//! that to separate `branchdocs` invocations sharing the same directories:
//! whoever holds it owns the mirror, storage and pointers until the
//! [`RootLock`] is dropped. Uses `flock(2)` on unix; elsewhere it is a no-op.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

#[derive(Debug)]
pub struct RootLock {
    _file: File,
    path: PathBuf,
}

impl RootLock {
    /// Takes the lock, or returns `None` while another holder has it.
    pub fn try_acquire(path: &Path) -> io::Result<Option<Self>> {
        let file = open(path)?;
        if !try_lock_exclusive(&file)? {
            return Ok(None);
        }
        debug!(path = %path.display(), "[LOCK] Acquired layout lock");
        Ok(Some(Self {
            _file: file,
            path: path.to_path_buf(),
        }))
    }

    /// Takes the lock, waiting for the current holder to release it.
    pub async fn acquire(path: &Path) -> io::Result<Self> {
        if let Some(lock) = Self::try_acquire(path)? {
            return Ok(lock);
        }
        info!(path = %path.display(), "[LOCK] Layout busy with another branchdocs process, waiting");
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || -> io::Result<Self> {
            let file = open(&path)?;
            lock_exclusive(&file)?;
            debug!(path = %path.display(), "[LOCK] Acquired layout lock");
            Ok(Self { _file: file, path })
        })
        .await
        .map_err(io::Error::other)?
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

#[cfg(unix)]
fn flock(file: &File, operation: libc::c_int) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let result = unsafe { libc::flock(file.as_raw_fd(), operation) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> io::Result<bool> {
    match flock(file, libc::LOCK_EX | libc::LOCK_NB) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> io::Result<()> {
    flock(file, libc::LOCK_EX)
}

#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File) -> io::Result<bool> {
    Ok(true)
}

#[cfg(not(unix))]
fn lock_exclusive(_file: &File) -> io::Result<()> {
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn second_holder_is_refused_until_release() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(".branchdocs.lock");

        let first = RootLock::try_acquire(&path).unwrap().expect("lock is free");
        assert!(RootLock::try_acquire(&path).unwrap().is_none());

        drop(first);
        assert!(RootLock::try_acquire(&path).unwrap().is_some());
    }

    #[tokio::test]
    async fn acquire_waits_for_release() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(".branchdocs.lock");
        let first = RootLock::try_acquire(&path).unwrap().expect("lock is free");

        let waiting = tokio::spawn({
            let path = path.clone();
            async move { RootLock::acquire(&path).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!waiting.is_finished(), "second holder must wait");

        drop(first);
        let second = tokio::time::timeout(Duration::from_secs(5), waiting)
            .await
            .expect("lock released in time")
            .unwrap()
            .expect("lock acquired");
        assert_eq!(second.path(), path.as_path());
    }
}

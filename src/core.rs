use std::path::{Path, PathBuf};

use crate::Result;
use crate::stream::{Mode, Stream};

/// Filesystem surface implemented by backends.
///
/// Every mutating operation validates its preconditions first and reports them as typed
/// errors before touching the filesystem.
pub trait FsBackend {
    /// Returns true, if `path` is an existing file or directory.
    fn exists<P: AsRef<Path>>(&self, path: P) -> bool;

    /// Checks if `path` is a directory.
    fn is_dir<P: AsRef<Path>>(&self, path: P) -> bool;

    /// Checks if `path` is a regular file.
    fn is_file<P: AsRef<Path>>(&self, path: P) -> bool;

    /// Lists the entries under `path` as paths relative to it.
    /// With `recursive == true` every descendant is yielded before its parent directory.
    fn ls<P: AsRef<Path>>(
        &self,
        path: P,
        recursive: bool,
    ) -> Result<impl Iterator<Item = Result<PathBuf>>>;

    /// Creates directory and all its parents with permission bits `mode`.
    fn mkdir<P: AsRef<Path>>(&self, path: P, mode: Option<u32>) -> Result<()>;

    fn read_file<P: AsRef<Path>>(&self, path: P) -> Result<Vec<u8>>;

    /// Creates a new file holding `content`. The file must not exist.
    fn write_file<P: AsRef<Path>>(&self, path: P, content: &[u8], mode: Option<u32>)
    -> Result<()>;

    /// Sets modification and access times (seconds since the epoch), creating the file if needed.
    fn touch<P: AsRef<Path>>(&self, path: P, mtime: Option<i64>, atime: Option<i64>)
    -> Result<()>;

    /// Removes a file or a whole directory tree.
    fn rm<P: AsRef<Path>>(&self, path: P) -> Result<()>;

    /// Copies a file or a whole directory tree, preserving permission bits.
    fn copy<P: AsRef<Path>, Q: AsRef<Path>>(&self, source: P, target: Q) -> Result<()>;

    /// Moves a file or a directory with a single rename.
    fn mv<P: AsRef<Path>, Q: AsRef<Path>>(&self, source: P, target: Q) -> Result<()>;

    /// Size in bytes of a file, or the sum of all file sizes under a directory.
    fn size<P: AsRef<Path>>(&self, path: P) -> Result<u64>;

    /// Permission bits (`0..=0o777`).
    fn mode<P: AsRef<Path>>(&self, path: P) -> Result<u32>;

    fn set_mode<P: AsRef<Path>>(&self, path: P, mode: u32) -> Result<()>;

    fn mime_type<P: AsRef<Path>>(&self, path: P) -> Result<String>;

    fn open<P: AsRef<Path>>(&self, path: P, mode: Mode) -> Result<Stream>;
}

pub(crate) mod utils {
    use std::path::{Path, PathBuf};
    use std::sync::{Mutex, MutexGuard, PoisonError};

    use nix::sys::stat::{self, Mode};

    use crate::{FsError, Result};

    static UMASK_LOCK: Mutex<()> = Mutex::new(());

    /// Highest valid permission value.
    pub const MAX_MODE: u32 = 0o777;

    /// Returns the directory containing `path`; `.` for a bare file name.
    pub fn parent_of<P: AsRef<Path>>(path: P) -> PathBuf {
        match path.as_ref().parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn check_mode(mode: u32) -> Result<u32> {
        if mode > MAX_MODE {
            return Err(FsError::InvalidArgument(format!(
                "the mode {mode:#o} must be between 0 and {MAX_MODE:#o}"
            )));
        }
        Ok(mode)
    }

    /// `"directory"` or `"file"`, for error messages.
    pub fn kind_of<P: AsRef<Path>>(path: P) -> &'static str {
        if path.as_ref().is_dir() {
            "directory"
        } else {
            "file"
        }
    }

    /// Overrides the process umask until dropped.
    /// Guards are serialized, so overlapping guards never restore each other's mask.
    /// Never hold one across a call that takes another: the lock is not reentrant.
    pub struct UmaskGuard {
        saved: Mode,
        _lock: MutexGuard<'static, ()>,
    }

    impl UmaskGuard {
        pub fn set(mask: Mode) -> Self {
            let lock = UMASK_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
            let saved = stat::umask(mask);
            Self { saved, _lock: lock }
        }
    }

    impl Drop for UmaskGuard {
        fn drop(&mut self) {
            stat::umask(self.saved);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::utils::*;
    use std::path::{Path, PathBuf};

    #[test]
    fn test_parent_of() {
        assert_eq!(parent_of("/a/b/c"), PathBuf::from("/a/b"));
        assert_eq!(parent_of("a/b"), PathBuf::from("a"));
        assert_eq!(parent_of("file.txt"), PathBuf::from("."));
        assert_eq!(parent_of("/file.txt"), PathBuf::from("/"));
        assert_eq!(parent_of(Path::new("/")), PathBuf::from("."));
    }

    #[test]
    fn test_check_mode() {
        assert_eq!(check_mode(0).unwrap(), 0);
        assert_eq!(check_mode(0o755).unwrap(), 0o755);
        assert_eq!(check_mode(0o777).unwrap(), 0o777);
        assert!(check_mode(0o1000).is_err());
        assert!(check_mode(0o4755).is_err());
    }
}

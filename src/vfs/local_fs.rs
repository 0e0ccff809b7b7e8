//! This module provides the host filesystem backend.
//!
//! ### Key Features:
//! - **Validated operations**: Every operation checks its preconditions (existence, type, parent
//!   directory) and reports violations as typed errors before any OS call is made.
//! - **Recursive operations**: `ls`, `rm`, `copy` and `size` share one lazy post-order walk
//!   ([`Walk`]), so a directory is always visited after everything inside it.
//! - **Streams**: File contents are moved through [`Stream`]s opened with the same contract that
//!   callers use.
//! - **No rollback**: A recursive `copy` or `rm` that fails halfway leaves whatever was already
//!   done in place.

use std::fs::{self, DirBuilder, OpenOptions, Permissions};
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};

use filetime::FileTime;
use nix::sys::stat;
use tracing::{debug, trace};

use crate::core::utils::{self, UmaskGuard};
use crate::stream::{Mode, Stream};
use crate::vfs::mime;
use crate::vfs::{LocalFsConfig, Walk};
use crate::{FsBackend, FsError, Result};

/// Permission bits added to directories created on the way during a copy, so their contents
/// can be written before the directory receives its final bits.
const OWNER_RWX: u32 = 0o700;

/// A filesystem backend working directly on host paths.
///
/// ### Usage notes:
/// - Paths are used as given: relative paths resolve against the process working directory.
/// - `exists`, `is_dir` and `is_file` follow symbolic links; recursive operations do not
///   descend into linked directories, and `rm` removes links, not their targets.
/// - Not transactional: concurrent modification of the same tree by other processes is the
///   caller's concern (see [`Stream::lock`]).
///
/// ### Example:
/// ```no_run
/// use fs_stream_kit::{FsBackend, LocalFs};
///
/// let fs = LocalFs::new();
/// fs.mkdir("/tmp/docs", None).unwrap();
/// fs.write_file("/tmp/docs/note.txt", b"Hello", None).unwrap();
/// assert_eq!(fs.size("/tmp/docs").unwrap(), 5);
///
/// fs.rm("/tmp/docs").unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct LocalFs {
    config: LocalFsConfig,
}

impl LocalFs {
    /// Creates a backend with the default [`LocalFsConfig`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LocalFsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LocalFsConfig {
        &self.config
    }

    /// Creates `path` and every missing parent with permission bits `mode`.
    /// The umask is cleared for the call so `mode` is applied literally.
    fn mkdir_all(path: &Path, mode: u32) -> Result<()> {
        let _umask = UmaskGuard::set(stat::Mode::empty());
        DirBuilder::new()
            .recursive(true)
            .mode(mode)
            .create(path)
            .map_err(FsError::io("create the directory", path))
    }

    fn remove_dir(&self, path: &Path) -> Result<()> {
        if !path.is_dir() {
            return Err(FsError::NotADirectory(path.to_path_buf()));
        }

        for entry in Walk::new(path, true)? {
            let entry = path.join(entry?);
            trace!(path = %entry.display(), "removing");
            if is_real_dir(&entry) {
                fs::remove_dir(&entry).map_err(FsError::io("remove the directory", &entry))?;
            } else {
                Self::remove_file(&entry)?;
            }
        }

        fs::remove_dir(path).map_err(FsError::io("remove the directory", path))
    }

    fn remove_file(path: &Path) -> Result<()> {
        fs::remove_file(path).map_err(FsError::io("remove the file", path))
    }

    fn copy_dir(&self, source: &Path, target: &Path) -> Result<()> {
        if !source.is_dir() {
            return Err(FsError::NotADirectory(source.to_path_buf()));
        }
        if self.exists(target) {
            return Err(FsError::AlreadyExists(target.to_path_buf()));
        }

        for entry in Walk::new(source, true)? {
            let entry = entry?;
            let source_entry = source.join(&entry);
            let target_entry = target.join(&entry);
            trace!(from = %source_entry.display(), to = %target_entry.display(), "copying");

            if source_entry.is_dir() {
                let mode = self.mode(&source_entry)?;
                if !target_entry.is_dir() {
                    Self::mkdir_all(&target_entry, mode | OWNER_RWX)?;
                }
                // post-order: the contents are already in place
                self.set_mode(&target_entry, mode)?;
            } else if source_entry.is_file() {
                self.copy_file(&source_entry, &target_entry)?;
            }
        }

        let mode = self.mode(source)?;
        if !target.is_dir() {
            Self::mkdir_all(target, mode | OWNER_RWX)?;
        }
        self.set_mode(target, mode)
    }

    fn copy_file(&self, source: &Path, target: &Path) -> Result<()> {
        if !source.is_file() {
            return Err(FsError::NotAFile(source.to_path_buf()));
        }
        if self.exists(target) {
            return Err(FsError::AlreadyExists(target.to_path_buf()));
        }

        let target_parent = utils::parent_of(target);
        if !target_parent.is_dir() {
            let mode = self.mode(utils::parent_of(source))?;
            Self::mkdir_all(&target_parent, mode | OWNER_RWX)?;
        }

        let mut reader = self.open(source, Mode::Read)?;
        let mut writer = self.open(target, Mode::Write)?;
        loop {
            let chunk = reader.read(Some(self.config.read_chunk_size()))?;
            if chunk.is_empty() {
                break;
            }
            writer.write_all(&chunk)?;
        }
        writer.close()?;
        reader.close()?;

        self.set_mode(target, self.mode(source)?)
    }

    fn size_of_dir(&self, path: &Path) -> Result<u64> {
        if !path.is_dir() {
            return Err(FsError::NotADirectory(path.to_path_buf()));
        }

        let mut size = 0;
        for entry in Walk::new(path, true)? {
            let entry = path.join(entry?);
            if entry.is_file() {
                size += Self::size_of_file(&entry)?;
            }
        }
        Ok(size)
    }

    fn size_of_file(path: &Path) -> Result<u64> {
        if !path.is_file() {
            return Err(FsError::NotAFile(path.to_path_buf()));
        }
        let metadata = fs::metadata(path).map_err(FsError::io("get the size of", path))?;
        Ok(metadata.len())
    }

    /// Fails with `PathNotFound` unless `path` exists.
    fn require_exists(&self, path: &Path) -> Result<()> {
        if !self.exists(path) {
            return Err(FsError::PathNotFound(path.to_path_buf()));
        }
        Ok(())
    }

    /// Checks shared by `copy` and `mv`.
    fn check_transfer(&self, source: &Path, target: &Path) -> Result<()> {
        self.require_exists(source)?;
        if self.exists(target) {
            return Err(FsError::AlreadyExists(target.to_path_buf()));
        }
        let target_parent = utils::parent_of(target);
        if !target_parent.is_dir() {
            return Err(FsError::ParentNotFound(target_parent));
        }
        Ok(())
    }
}

impl FsBackend for LocalFs {
    fn exists<P: AsRef<Path>>(&self, path: P) -> bool {
        let path = path.as_ref();
        path.is_dir() || path.is_file()
    }

    fn is_dir<P: AsRef<Path>>(&self, path: P) -> bool {
        path.as_ref().is_dir()
    }

    fn is_file<P: AsRef<Path>>(&self, path: P) -> bool {
        path.as_ref().is_file()
    }

    /// Returns a lazy iterator over the entries under `path`.
    ///
    /// # Arguments
    /// * `path` - directory to list.
    /// * `recursive` - `false` lists immediate children only; `true` lists the whole subtree,
    ///   every entry before the directory containing it.
    ///
    /// # Returns
    /// * `Ok(impl Iterator)` - Iterator over paths relative to `path`. The directory itself and the
    ///   `.`/`..` entries are never yielded. Enumeration failures surface as `Err` items.
    /// * `Err(FsError::NotADirectory)` - If `path` is not a directory.
    ///
    /// # Notes
    /// - The order of siblings is the OS enumeration order; do not rely on it.
    /// - The iterator is single-pass; call `ls` again to list again.
    fn ls<P: AsRef<Path>>(
        &self,
        path: P,
        recursive: bool,
    ) -> Result<impl Iterator<Item = Result<PathBuf>>> {
        Walk::new(path, recursive)
    }

    /// Creates directory and all its parents with permission bits `mode`
    /// (`dir_mode` of the config when `None`).
    fn mkdir<P: AsRef<Path>>(&self, path: P, mode: Option<u32>) -> Result<()> {
        let path = path.as_ref();
        let mode = utils::check_mode(mode.unwrap_or(self.config.dir_mode()))?;
        if self.exists(path) {
            return Err(FsError::AlreadyExists(path.to_path_buf()));
        }

        debug!(path = %path.display(), mode = format_args!("{mode:o}"), "mkdir");
        Self::mkdir_all(path, mode)
    }

    /// Reads the entire contents of a file.
    ///
    /// # Returns
    /// * `Ok(Vec<u8>)` - File content; empty for an empty file.
    /// * `Err(FsError::NotAFile)` - If `path` is not a regular file.
    /// * `Err(FsError::Open | FsError::Io)` - If the OS refuses to open or read it.
    fn read_file<P: AsRef<Path>>(&self, path: P) -> Result<Vec<u8>> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(FsError::NotAFile(path.to_path_buf()));
        }

        let mut stream = self.open(path, Mode::Read)?;
        let content = stream.read(None)?;
        stream.close()?;

        Ok(content)
    }

    /// Creates a new file holding `content` with permission bits `mode`
    /// (`file_mode` of the config when `None`).
    ///
    /// # Returns
    /// * `Err(FsError::AlreadyExists)` - If `path` exists; files are never overwritten.
    /// * `Err(FsError::ParentNotFound)` - If the parent directory does not exist.
    fn write_file<P: AsRef<Path>>(&self, path: P, content: &[u8], mode: Option<u32>) -> Result<()> {
        let path = path.as_ref();
        let mode = utils::check_mode(mode.unwrap_or(self.config.file_mode()))?;
        if self.exists(path) {
            return Err(FsError::AlreadyExists(path.to_path_buf()));
        }
        let parent = utils::parent_of(path);
        if !parent.is_dir() {
            return Err(FsError::ParentNotFound(parent));
        }

        debug!(path = %path.display(), bytes = content.len(), "write file");
        let mut stream = self.open(path, Mode::Write)?;
        stream.write_all(content)?;
        stream.close()?;

        self.set_mode(path, mode)
    }

    /// Sets modification and access times of `path`, creating an empty file when nothing
    /// exists there.
    ///
    /// * `mtime` - seconds since the epoch; `None` means now.
    /// * `atime` - seconds since the epoch; `None` means the same as the modification time.
    ///   Giving `atime` without `mtime` is an error.
    fn touch<P: AsRef<Path>>(&self, path: P, mtime: Option<i64>, atime: Option<i64>) -> Result<()> {
        let path = path.as_ref();
        if mtime.is_some_and(|t| t < 0) {
            return Err(FsError::InvalidArgument(
                "the modification time must be greater than or equal to 0".to_string(),
            ));
        }
        if atime.is_some_and(|t| t < 0) {
            return Err(FsError::InvalidArgument(
                "the access time must be greater than or equal to 0".to_string(),
            ));
        }
        if mtime.is_none() && atime.is_some() {
            return Err(FsError::InvalidArgument(
                "the access time requires a modification time".to_string(),
            ));
        }
        let parent = utils::parent_of(path);
        if !parent.is_dir() {
            return Err(FsError::ParentNotFound(parent));
        }

        if !self.exists(path) {
            OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .map_err(FsError::io("create the file", path))?;
        }

        let mtime = match mtime {
            Some(seconds) => FileTime::from_unix_time(seconds, 0),
            None => FileTime::now(),
        };
        let atime = atime.map_or(mtime, |seconds| FileTime::from_unix_time(seconds, 0));

        debug!(path = %path.display(), ?mtime, ?atime, "touch");
        filetime::set_file_times(path, atime, mtime).map_err(FsError::io("touch", path))
    }

    /// Removes a file, or a directory with everything inside it.
    ///
    /// Entries are removed in walk order, so every directory is already empty when its turn
    /// comes. Symbolic links are removed, never followed.
    fn rm<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if !self.exists(path) && !is_symlink(path) {
            return Err(FsError::PathNotFound(path.to_path_buf()));
        }

        debug!(path = %path.display(), "rm");
        if is_real_dir(path) {
            self.remove_dir(path)
        } else {
            Self::remove_file(path)
        }
    }

    /// Copies a file or a directory tree to `target`, which must not exist yet.
    /// Contents and permission bits of every file and directory are duplicated.
    ///
    /// # Returns
    /// * `Err(FsError::PathNotFound)` - If `source` does not exist.
    /// * `Err(FsError::AlreadyExists)` - If `target` exists.
    /// * `Err(FsError::ParentNotFound)` - If the parent directory of `target` does not exist.
    fn copy<P: AsRef<Path>, Q: AsRef<Path>>(&self, source: P, target: Q) -> Result<()> {
        let (source, target) = (source.as_ref(), target.as_ref());
        self.check_transfer(source, target)?;

        debug!(from = %source.display(), to = %target.display(), "copy");
        if source.is_dir() {
            if is_inside(target, source)? {
                return Err(FsError::InvalidArgument(format!(
                    "cannot copy {} into itself",
                    source.display()
                )));
            }
            self.copy_dir(source, target)
        } else {
            self.copy_file(source, target)
        }
    }

    /// Moves `source` to `target` with one `rename`; the same checks as `copy` apply.
    fn mv<P: AsRef<Path>, Q: AsRef<Path>>(&self, source: P, target: Q) -> Result<()> {
        let (source, target) = (source.as_ref(), target.as_ref());
        self.check_transfer(source, target)?;

        let kind = utils::kind_of(source);
        debug!(from = %source.display(), to = %target.display(), kind, "mv");
        fs::rename(source, target).map_err(|e| FsError::Move {
            kind,
            from: source.to_path_buf(),
            to: target.to_path_buf(),
            source: e,
        })
    }

    /// Size of a file, or the sum of sizes of all files under a directory.
    /// Directories themselves count as zero bytes.
    fn size<P: AsRef<Path>>(&self, path: P) -> Result<u64> {
        let path = path.as_ref();
        self.require_exists(path)?;

        if path.is_dir() {
            self.size_of_dir(path)
        } else {
            Self::size_of_file(path)
        }
    }

    fn mode<P: AsRef<Path>>(&self, path: P) -> Result<u32> {
        let path = path.as_ref();
        self.require_exists(path)?;

        let context = if path.is_dir() {
            "get the mode of the directory"
        } else {
            "get the mode of the file"
        };
        let metadata = fs::metadata(path).map_err(FsError::io(context, path))?;
        Ok(metadata.permissions().mode() & utils::MAX_MODE)
    }

    fn set_mode<P: AsRef<Path>>(&self, path: P, mode: u32) -> Result<()> {
        let path = path.as_ref();
        let mode = utils::check_mode(mode)?;
        self.require_exists(path)?;

        let context = if path.is_dir() {
            "change the mode of the directory"
        } else {
            "change the mode of the file"
        };
        debug!(path = %path.display(), mode = format_args!("{mode:o}"), "chmod");
        fs::set_permissions(path, Permissions::from_mode(mode)).map_err(FsError::io(context, path))
    }

    /// Detects the MIME type of a file from its leading bytes.
    fn mime_type<P: AsRef<Path>>(&self, path: P) -> Result<String> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(FsError::NotAFile(path.to_path_buf()));
        }

        let mut stream = self.open(path, Mode::Read)?;
        let head = stream.read(Some(mime::SNIFF_LENGTH))?;
        stream.close()?;

        Ok(mime::sniff(&head).to_string())
    }

    /// Opens a [`Stream`] whose unbounded reads use the configured chunk size.
    fn open<P: AsRef<Path>>(&self, path: P, mode: Mode) -> Result<Stream> {
        Stream::open_with_chunk_size(path, mode, self.config.read_chunk_size())
    }
}

/// A directory that is not reached through a symbolic link.
fn is_real_dir(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.is_dir())
}

/// Whether `target` (not existing yet) would land inside the directory `source`.
fn is_inside(target: &Path, source: &Path) -> Result<bool> {
    let source = source
        .canonicalize()
        .map_err(FsError::io("resolve", source))?;
    let parent = utils::parent_of(target);
    let parent = parent
        .canonicalize()
        .map_err(FsError::io("resolve", &parent))?;
    Ok(parent.starts_with(source))
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink())
}

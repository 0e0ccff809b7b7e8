use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::{FsError, Result};

/// Lazy, single-pass listing of a directory.
///
/// Yields paths relative to the walked root; the root itself is never yielded.
/// In recursive mode the order is post-order: every entry of a directory is yielded before
/// the directory itself, which is what makes removing entries in the yielded order safe.
/// Sibling order follows the OS enumeration order and is unspecified.
/// Symbolic links are yielded as entries and never followed.
pub struct Walk {
    root: PathBuf,
    inner: walkdir::IntoIter,
}

impl Walk {
    /// Starts a walk over `root`, which must be a directory.
    /// Nothing is read from the directory until the first call to `next()`.
    pub fn new<P: AsRef<Path>>(root: P, recursive: bool) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(FsError::NotADirectory(root));
        }

        let mut walker = WalkDir::new(&root)
            .min_depth(1)
            .follow_links(false)
            .contents_first(true);
        if !recursive {
            walker = walker.max_depth(1);
        }

        Ok(Self {
            inner: walker.into_iter(),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Iterator for Walk {
    type Item = Result<PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = match self.inner.next()? {
            Ok(entry) => entry,
            Err(e) => return Some(Err(e.into())),
        };
        let relative = match entry.path().strip_prefix(&self.root) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => entry.into_path(),
        };
        Some(Ok(relative))
    }
}

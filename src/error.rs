//! Error types.
//!
//! Precondition failures (missing path, closed stream, bad argument) are reported before any
//! OS call is made. OS-call failures carry the operation context and the offending path.

use std::path::PathBuf;

/// Errors returned by streams and filesystem operations.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// The path must exist.
    #[error("path does not exist: {}", .0.display())]
    PathNotFound(PathBuf),

    /// The path must not exist.
    #[error("path already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// The parent directory of the path must exist.
    #[error("parent directory does not exist: {}", .0.display())]
    ParentNotFound(PathBuf),

    /// The path must be a directory.
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// The path must be a regular file.
    #[error("{} is not a file", .0.display())]
    NotAFile(PathBuf),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("the stream must be open")]
    NotOpen,

    #[error("the stream must be readable")]
    NotReadable,

    #[error("the stream must be writable")]
    NotWritable,

    #[error("the stream must be seekable")]
    NotSeekable,

    /// The OS refused to open the file.
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Acquiring or releasing an advisory lock failed.
    #[error("failed to {action} {}: {source}", .path.display())]
    Lock {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `rename` failed. `kind` is either `"file"` or `"directory"`.
    #[error("failed to move the {kind} {} to {}: {source}", .from.display(), .to.display())]
    Move {
        kind: &'static str,
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other failed OS call.
    #[error("failed to {context} {}: {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory enumeration failed in the middle of a walk.
    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

impl FsError {
    pub(crate) fn io<P: Into<PathBuf>>(
        context: &'static str,
        path: P,
    ) -> impl FnOnce(std::io::Error) -> FsError {
        let path = path.into();
        move |source| FsError::Io {
            context,
            path,
            source,
        }
    }
}

/// Result type for all operations of this crate.
pub type Result<T> = std::result::Result<T, FsError>;

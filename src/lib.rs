//! Validated filesystem operations and mode-gated byte streams for Rust.
//!
//! ### Overview
//!
//! `fs-stream-kit` wraps native file and directory operations behind an interface that reports
//! every failure as a typed [`FsError`] instead of raw OS return codes.
//! It provides two building blocks:
//!
//! - [`Stream`]: one open file handle with read/write/seek/lock operations gated by the
//!   [`Mode`] it was opened in. The handle is released on `close()` or when the stream is dropped.
//! - [`LocalFs`]: the [`FsBackend`] implementation for the host filesystem. Its recursive
//!   operations (`ls`, `rm`, `copy`, `size`) share one lazy post-order directory [`Walk`].
//!
//! **Key ideas**:
//! - **Explicit errors**: Preconditions (path exists, is a file, parent exists, stream is open)
//!   are checked before any OS call and reported with the offending path.
//! - **No hidden retries**: A failed OS call is surfaced immediately; retrying is up to the caller.
//! - **No rollback**: Recursive operations that fail halfway keep what was already done.
//! - **Advisory locking** is the only coordination between processes.

mod core;
mod error;
mod stream;
mod vfs;

pub use crate::core::FsBackend;
pub use error::{FsError, Result};
pub use stream::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, Mode, Stream, Whence};
pub use vfs::{DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, LocalFs, LocalFsConfig, Walk, sniff_mime_type};

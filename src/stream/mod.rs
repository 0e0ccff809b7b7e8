//! Byte streams over a single open file.
//!
//! A [`Stream`] owns exactly one OS file handle for its whole life. Its [`Mode`] decides how
//! the file is opened and which operations are allowed. Once closed, the stream refuses every
//! operation except [`Stream::close`] (a no-op) and the capability queries (which report `false`).
//! Dropping an open stream closes it.

mod mode;

use std::fs::File;
use std::io::{self, Read, Seek, Write};
use std::os::fd::IntoRawFd;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::{FsError, Result};

pub use mode::{Mode, Whence};

/// Chunk size used by [`Stream::read`] when no length is given.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Upper bound of the chunk size and of the buffer of a single read.
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// An open file bound to one path and one [`Mode`].
///
/// ### Example:
/// ```no_run
/// use fs_stream_kit::{Mode, Stream, Whence};
///
/// let mut stream = Stream::open("/tmp/notes.txt", Mode::Write).unwrap();
/// stream.write(b"abc").unwrap();
/// stream.seek(-1, Whence::End).unwrap();
/// assert_eq!(stream.read(Some(1)).unwrap(), b"c");
/// stream.close().unwrap();
/// ```
#[derive(Debug)]
pub struct Stream {
    path: PathBuf,
    mode: Mode,
    file: Option<File>, // None once closed
    eof: bool,
    chunk_size: usize,
}

impl Stream {
    /// Opens `path` with the flags of `mode`.
    /// `Mode::Read` requires the file to exist; `Write` and `Append` create it.
    pub fn open<P: AsRef<Path>>(path: P, mode: Mode) -> Result<Self> {
        Self::open_with_chunk_size(path, mode, DEFAULT_CHUNK_SIZE)
    }

    pub(crate) fn open_with_chunk_size<P: AsRef<Path>>(
        path: P,
        mode: Mode,
        chunk_size: usize,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = mode
            .open_options()
            .open(&path)
            .map_err(|source| FsError::Open {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), ?mode, "stream opened");

        Ok(Self {
            path,
            mode,
            file: Some(file),
            eof: false,
            chunk_size: chunk_size.clamp(1, MAX_CHUNK_SIZE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn is_readable(&self) -> bool {
        self.is_open() && self.mode.is_readable()
    }

    pub fn is_writable(&self) -> bool {
        self.is_open() && self.mode.is_writable()
    }

    /// Returns true if the OS can report a position for the handle
    /// (regular files are seekable, pipes and sockets are not).
    pub fn is_seekable(&self) -> bool {
        match self.file.as_ref() {
            Some(mut file) => file.stream_position().is_ok(),
            None => false,
        }
    }

    /// Reads from the current position.
    ///
    /// * `None` reads chunk by chunk until end of file and returns everything.
    /// * `Some(length)` performs a single read of at most `length` bytes, and never more than
    ///   the chunk size. Short reads are returned as they are.
    ///
    /// Once end of file has been hit, reads return nothing until the next `seek` or `rewind`.
    pub fn read(&mut self, length: Option<usize>) -> Result<Vec<u8>> {
        if !self.is_readable() {
            return Err(FsError::NotReadable);
        }
        if length == Some(0) {
            return Err(FsError::InvalidArgument(
                "the length 0 must be greater than or equal to 1".to_string(),
            ));
        }

        let file = self.file.as_mut().ok_or(FsError::NotOpen)?;
        let mut data = Vec::new();
        let mut hit_eof = self.eof;

        match length {
            Some(length) => {
                if !hit_eof {
                    data.resize(length.min(self.chunk_size), 0);
                    let n = file
                        .read(&mut data)
                        .map_err(FsError::io("read", &self.path))?;
                    data.truncate(n);
                    hit_eof = n == 0;
                }
            }
            None => {
                let mut chunk = vec![0; self.chunk_size];
                while !hit_eof {
                    let n = file
                        .read(&mut chunk)
                        .map_err(FsError::io("read", &self.path))?;
                    data.extend_from_slice(&chunk[..n]);
                    hit_eof = n == 0;
                }
            }
        }

        self.eof = hit_eof;
        Ok(data)
    }

    /// Performs a single write and returns the number of bytes written,
    /// which may be less than `data.len()`.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        if !self.is_writable() {
            return Err(FsError::NotWritable);
        }
        let file = self.file.as_mut().ok_or(FsError::NotOpen)?;
        file.write(data).map_err(FsError::io("write", &self.path))
    }

    /// Writes all of `data`, repeating short writes.
    pub fn write_all(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            match self.write(data)? {
                0 => {
                    return Err(FsError::Io {
                        context: "write",
                        path: self.path.clone(),
                        source: io::ErrorKind::WriteZero.into(),
                    });
                }
                n => data = &data[n..],
            }
        }
        Ok(())
    }

    /// Moves the position to `offset` relative to `whence`. Clears the end-of-file flag.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<()> {
        if !self.is_seekable() {
            return Err(FsError::NotSeekable);
        }
        let file = self.file.as_mut().ok_or(FsError::NotOpen)?;
        let from = whence
            .seek_from(offset)
            .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidInput))
            .map_err(FsError::io("seek", &self.path))?;
        file.seek(from).map_err(FsError::io("seek", &self.path))?;
        self.eof = false;
        Ok(())
    }

    /// Current position.
    pub fn tell(&mut self) -> Result<u64> {
        let file = self.file.as_mut().ok_or(FsError::NotOpen)?;
        file.stream_position()
            .map_err(FsError::io("get the position of", &self.path))
    }

    /// Reports whether a read has hit end of file since the last `seek`/`rewind`.
    ///
    /// The flag is not computed from the position: before the first read it is `false`
    /// even at the end of the file.
    pub fn eof(&self) -> Result<bool> {
        if !self.is_open() {
            return Err(FsError::NotOpen);
        }
        Ok(self.eof)
    }

    pub fn rewind(&mut self) -> Result<()> {
        let file = self.file.as_mut().ok_or(FsError::NotOpen)?;
        file.rewind().map_err(FsError::io("rewind", &self.path))?;
        self.eof = false;
        Ok(())
    }

    /// On-disk length of the file, from `fstat`.
    pub fn size(&self) -> Result<u64> {
        let file = self.file.as_ref().ok_or(FsError::NotOpen)?;
        let metadata = file
            .metadata()
            .map_err(FsError::io("get the statistics of", &self.path))?;
        Ok(metadata.len())
    }

    /// Takes an advisory lock: shared for `Mode::Read`, exclusive otherwise.
    /// With `block == false` fails immediately when the lock is held elsewhere.
    pub fn lock(&self, block: bool) -> Result<()> {
        let file = self.file.as_ref().ok_or(FsError::NotOpen)?;
        // fully qualified: std's inherent File locking methods shadow these
        let result = match (self.mode.is_exclusive_lock(), block) {
            (false, true) => FileExt::lock_shared(file),
            (false, false) => FileExt::try_lock_shared(file),
            (true, true) => FileExt::lock_exclusive(file),
            (true, false) => FileExt::try_lock_exclusive(file),
        };
        result.map_err(|source| FsError::Lock {
            action: "lock",
            path: self.path.clone(),
            source,
        })
    }

    pub fn unlock(&self) -> Result<()> {
        let file = self.file.as_ref().ok_or(FsError::NotOpen)?;
        FileExt::unlock(file).map_err(|source| FsError::Lock {
            action: "unlock",
            path: self.path.clone(),
            source,
        })
    }

    /// Releases the handle. Does nothing if the stream is already closed.
    /// The stream counts as closed afterwards even when the OS reports a failure.
    pub fn close(&mut self) -> Result<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        debug!(path = %self.path.display(), "stream closed");

        nix::unistd::close(file.into_raw_fd()).map_err(|errno| FsError::Io {
            context: "close",
            path: self.path.clone(),
            source: errno.into(),
        })
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(path = %self.path.display(), error = %e, "failed to close stream on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    const MODES: [Mode; 3] = [Mode::Read, Mode::Write, Mode::Append];

    mod open {
        use super::*;

        #[test]
        fn test_open_all_modes() {
            let temp_dir = setup_test_env();
            let file = temp_dir.path().join("file.txt");
            std::fs::write(&file, b"abc").unwrap();

            for mode in MODES {
                let stream = Stream::open(&file, mode).unwrap();
                assert!(stream.is_open());
                assert_eq!(stream.mode(), mode);
                assert_eq!(stream.path(), file);
            }
        }

        #[test]
        fn test_open_read_missing_file_fails() {
            let temp_dir = setup_test_env();
            let file = temp_dir.path().join("missing.txt");

            let result = Stream::open(&file, Mode::Read);

            assert!(matches!(result, Err(FsError::Open { path, .. }) if path == file));
            assert!(!file.exists());
        }

        #[test]
        fn test_open_write_and_append_create_file() {
            let temp_dir = setup_test_env();
            for (i, mode) in [Mode::Write, Mode::Append].into_iter().enumerate() {
                let file = temp_dir.path().join(format!("new_{i}.txt"));
                let _stream = Stream::open(&file, mode).unwrap();
                assert!(file.is_file());
            }
        }

        #[test]
        fn test_open_missing_parent_fails() {
            let temp_dir = setup_test_env();
            let file = temp_dir.path().join("no/such/dir/file.txt");

            assert!(matches!(
                Stream::open(&file, Mode::Write),
                Err(FsError::Open { .. })
            ));
        }

        #[test]
        fn test_write_mode_truncates() {
            let temp_dir = setup_test_env();
            let file = temp_dir.path().join("file.txt");
            std::fs::write(&file, b"old content").unwrap();

            let stream = Stream::open(&file, Mode::Write).unwrap();

            assert_eq!(stream.size().unwrap(), 0);
        }

        #[test]
        fn test_append_mode_keeps_content_and_writes_at_end() {
            let temp_dir = setup_test_env();
            let file = temp_dir.path().join("file.txt");
            std::fs::write(&file, b"abc").unwrap();

            let mut stream = Stream::open(&file, Mode::Append).unwrap();
            assert_eq!(stream.size().unwrap(), 3);
            stream.seek(0, Whence::Start).unwrap();
            stream.write_all(b"def").unwrap();
            stream.close().unwrap();

            assert_eq!(std::fs::read(&file).unwrap(), b"abcdef");
        }

        #[test]
        fn test_append_mode_starts_at_zero_until_first_write() {
            let temp_dir = setup_test_env();
            let file = temp_dir.path().join("file.txt");
            std::fs::write(&file, b"abc").unwrap();

            let mut stream = Stream::open(&file, Mode::Append).unwrap();
            assert_eq!(stream.tell().unwrap(), 0);
            assert_eq!(stream.read(Some(1)).unwrap(), b"a");

            stream.write_all(b"d").unwrap();
            assert_eq!(stream.tell().unwrap(), 4);
        }
    }

    mod capabilities {
        use super::*;

        #[test]
        fn test_is_readable() {
            let temp_dir = setup_test_env();
            let file = temp_dir.path().join("file.txt");
            std::fs::write(&file, b"").unwrap();

            for mode in MODES {
                let stream = Stream::open(&file, mode).unwrap();
                assert!(stream.is_readable());
            }
        }

        #[test]
        fn test_is_writable() {
            let temp_dir = setup_test_env();
            let file = temp_dir.path().join("file.txt");
            std::fs::write(&file, b"").unwrap();

            for (mode, expected) in [(Mode::Read, false), (Mode::Write, true), (Mode::Append, true)]
            {
                let stream = Stream::open(&file, mode).unwrap();
                assert_eq!(stream.is_writable(), expected, "{mode:?}");
            }
        }

        #[test]
        fn test_closed_stream_has_no_capabilities() {
            let temp_dir = setup_test_env();
            let mut stream = Stream::open(temp_dir.path().join("f"), Mode::Write).unwrap();

            stream.close().unwrap();

            assert!(!stream.is_open());
            assert!(!stream.is_readable());
            assert!(!stream.is_writable());
            assert!(!stream.is_seekable());
        }

        #[test]
        fn test_regular_file_is_seekable() {
            let temp_dir = setup_test_env();
            let stream = Stream::open(temp_dir.path().join("f"), Mode::Write).unwrap();
            assert!(stream.is_seekable());
        }

        #[cfg(target_os = "linux")]
        #[test]
        fn test_fifo_is_not_seekable() {
            use nix::sys::stat;

            let temp_dir = setup_test_env();
            let fifo = temp_dir.path().join("fifo");
            nix::unistd::mkfifo(&fifo, stat::Mode::S_IRUSR | stat::Mode::S_IWUSR).unwrap();

            // read-write open of a fifo does not block on Linux
            let mut stream = Stream::open(&fifo, Mode::Append).unwrap();

            assert!(!stream.is_seekable());
            assert!(matches!(
                stream.seek(0, Whence::Start),
                Err(FsError::NotSeekable)
            ));
        }
    }

    mod read {
        use super::*;

        #[test]
        fn test_read_all() {
            let (_temp_dir, mut stream) = stream_with(b"abc");
            stream.rewind().unwrap();
            assert_eq!(stream.read(None).unwrap(), b"abc");
        }

        #[test]
        fn test_read_with_length() {
            let (_temp_dir, mut stream) = stream_with(b"abc");
            stream.rewind().unwrap();
            assert_eq!(stream.read(Some(1)).unwrap(), b"a");
            assert_eq!(stream.read(Some(1)).unwrap(), b"b");
        }

        #[test]
        fn test_read_longer_than_content_returns_short_read() {
            let (_temp_dir, mut stream) = stream_with(b"abc");
            stream.rewind().unwrap();
            assert_eq!(stream.read(Some(100)).unwrap(), b"abc");
        }

        #[test]
        fn test_read_huge_length_is_bounded() {
            let (_temp_dir, mut stream) = stream_with(b"abc");
            stream.rewind().unwrap();
            assert_eq!(stream.read(Some(usize::MAX)).unwrap(), b"abc");
        }

        #[test]
        fn test_read_with_length_stops_at_chunk_size() {
            let temp_dir = setup_test_env();
            let file = temp_dir.path().join("file.txt");
            std::fs::write(&file, b"abcdef").unwrap();

            let mut stream = Stream::open_with_chunk_size(&file, Mode::Read, 4).unwrap();

            assert_eq!(stream.read(Some(100)).unwrap(), b"abcd");
            assert_eq!(stream.read(Some(100)).unwrap(), b"ef");
        }

        #[test]
        fn test_chunk_size_is_clamped() {
            let (temp_dir, _stream) = stream_with(b"abc");
            let file = temp_dir.path().join("stream.bin");

            let stream = Stream::open_with_chunk_size(&file, Mode::Read, usize::MAX).unwrap();
            assert_eq!(stream.chunk_size, MAX_CHUNK_SIZE);

            let stream = Stream::open_with_chunk_size(&file, Mode::Read, 0).unwrap();
            assert_eq!(stream.chunk_size, 1);
        }

        #[test]
        fn test_read_in_several_chunks() {
            let temp_dir = setup_test_env();
            let file = temp_dir.path().join("big.bin");
            let content: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
            std::fs::write(&file, &content).unwrap();

            let mut stream = Stream::open_with_chunk_size(&file, Mode::Read, 7).unwrap();

            assert_eq!(stream.read(None).unwrap(), content);
            assert!(stream.eof().unwrap());
        }

        #[test]
        fn test_read_zero_length_is_invalid() {
            let (_temp_dir, mut stream) = stream_with(b"abc");
            assert!(matches!(
                stream.read(Some(0)),
                Err(FsError::InvalidArgument(_))
            ));
        }

        #[test]
        fn test_read_empty_stream() {
            let temp_dir = setup_test_env();
            let mut stream = Stream::open(temp_dir.path().join("empty"), Mode::Write).unwrap();

            assert!(stream.read(None).unwrap().is_empty());
            assert!(stream.eof().unwrap());
        }

        #[test]
        fn test_read_closed_stream() {
            let (_temp_dir, mut stream) = stream_with(b"abc");
            stream.close().unwrap();
            assert!(matches!(stream.read(None), Err(FsError::NotReadable)));
        }
    }

    mod write {
        use super::*;

        #[test]
        fn test_write_returns_written_bytes() {
            let temp_dir = setup_test_env();
            let file = temp_dir.path().join("file.txt");
            let mut stream = Stream::open(&file, Mode::Write).unwrap();

            assert_eq!(stream.write(b"hello").unwrap(), 5);
            stream.close().unwrap();

            assert_eq!(std::fs::read(&file).unwrap(), b"hello");
        }

        #[test]
        fn test_write_read_mode_fails() {
            let temp_dir = setup_test_env();
            let file = temp_dir.path().join("file.txt");
            std::fs::write(&file, b"abc").unwrap();
            let mut stream = Stream::open(&file, Mode::Read).unwrap();

            assert!(matches!(stream.write(b"x"), Err(FsError::NotWritable)));
        }

        #[test]
        fn test_write_closed_stream() {
            let (_temp_dir, mut stream) = stream_with(b"");
            stream.close().unwrap();
            assert!(matches!(stream.write(b"x"), Err(FsError::NotWritable)));
        }
    }

    mod positioning {
        use super::*;

        #[test]
        fn test_seek() {
            let cases = [
                (0, Whence::Start, b"a"),
                (-2, Whence::Current, b"b"),
                (-1, Whence::End, b"c"),
            ];
            for (offset, whence, expected) in cases {
                let (_temp_dir, mut stream) = stream_with(b"abc");
                stream.seek(offset, whence).unwrap();
                assert_eq!(stream.read(Some(1)).unwrap(), expected, "{whence:?}");
            }
        }

        #[test]
        fn test_seek_before_start_fails() {
            let (_temp_dir, mut stream) = stream_with(b"abc");
            assert!(matches!(
                stream.seek(-1, Whence::Start),
                Err(FsError::Io { .. })
            ));
            assert!(matches!(
                stream.seek(-10, Whence::Current),
                Err(FsError::Io { .. })
            ));
        }

        #[test]
        fn test_seek_closed_stream() {
            let (_temp_dir, mut stream) = stream_with(b"abc");
            stream.close().unwrap();
            assert!(matches!(
                stream.seek(0, Whence::Start),
                Err(FsError::NotSeekable)
            ));
        }

        #[test]
        fn test_tell() {
            let (_temp_dir, mut stream) = stream_with(b"");
            assert_eq!(stream.tell().unwrap(), 0);
            stream.write_all(b"abc").unwrap();
            assert_eq!(stream.tell().unwrap(), 3);
        }

        #[test]
        fn test_rewind() {
            let (_temp_dir, mut stream) = stream_with(b"some text");
            stream.rewind().unwrap();
            assert_eq!(stream.tell().unwrap(), 0);
        }

        #[test]
        fn test_eof_is_stale_until_read() {
            let (_temp_dir, mut stream) = stream_with(b"abc");
            // position is at the end, but nothing was read yet
            assert!(!stream.eof().unwrap());

            assert!(stream.read(Some(1)).unwrap().is_empty());
            assert!(stream.eof().unwrap());

            stream.rewind().unwrap();
            assert!(!stream.eof().unwrap());
            assert_eq!(stream.read(None).unwrap(), b"abc");
            assert!(stream.eof().unwrap());
        }

        #[test]
        fn test_closed_stream_positioning() {
            let (_temp_dir, mut stream) = stream_with(b"abc");
            stream.close().unwrap();

            assert!(matches!(stream.tell(), Err(FsError::NotOpen)));
            assert!(matches!(stream.eof(), Err(FsError::NotOpen)));
            assert!(matches!(stream.rewind(), Err(FsError::NotOpen)));
            assert!(matches!(stream.size(), Err(FsError::NotOpen)));
        }

        #[test]
        fn test_size() {
            let (_temp_dir, mut stream) = stream_with(b"");
            assert_eq!(stream.size().unwrap(), 0);
            stream.write_all(b"0123456789").unwrap();
            assert_eq!(stream.size().unwrap(), 10);
        }
    }

    mod locking {
        use super::*;

        #[test]
        fn test_lock_and_unlock() {
            let temp_dir = setup_test_env();
            let stream = Stream::open(temp_dir.path().join("f"), Mode::Write).unwrap();

            stream.lock(true).unwrap();
            stream.unlock().unwrap();
        }

        #[test]
        fn test_exclusive_lock_conflict() {
            let temp_dir = setup_test_env();
            let file = temp_dir.path().join("f");
            let first = Stream::open(&file, Mode::Write).unwrap();
            let second = Stream::open(&file, Mode::Append).unwrap();

            first.lock(true).unwrap();
            assert!(matches!(second.lock(false), Err(FsError::Lock { .. })));

            first.unlock().unwrap();
            second.lock(false).unwrap();
        }

        #[test]
        fn test_shared_locks_coexist() {
            let temp_dir = setup_test_env();
            let file = temp_dir.path().join("f");
            std::fs::write(&file, b"abc").unwrap();
            let first = Stream::open(&file, Mode::Read).unwrap();
            let second = Stream::open(&file, Mode::Read).unwrap();

            first.lock(false).unwrap();
            second.lock(false).unwrap();

            let writer = Stream::open(&file, Mode::Append).unwrap();
            assert!(matches!(writer.lock(false), Err(FsError::Lock { .. })));
        }

        #[test]
        fn test_drop_releases_lock() {
            let temp_dir = setup_test_env();
            let file = temp_dir.path().join("f");
            {
                let holder = Stream::open(&file, Mode::Write).unwrap();
                holder.lock(true).unwrap();
            }
            let other = Stream::open(&file, Mode::Write).unwrap();
            other.lock(false).unwrap();
        }

        #[test]
        fn test_lock_closed_stream() {
            let (_temp_dir, mut stream) = stream_with(b"");
            stream.close().unwrap();
            assert!(matches!(stream.lock(true), Err(FsError::NotOpen)));
            assert!(matches!(stream.unlock(), Err(FsError::NotOpen)));
        }
    }

    mod close {
        use super::*;

        #[test]
        fn test_close() {
            let (_temp_dir, mut stream) = stream_with(b"abc");
            stream.close().unwrap();
            assert!(!stream.is_open());
        }

        #[test]
        fn test_close_is_idempotent() {
            let (_temp_dir, mut stream) = stream_with(b"abc");
            stream.close().unwrap();
            stream.close().unwrap();
            assert!(!stream.is_open());
        }
    }

    /// Write-mode stream holding `content`, positioned at its end.
    fn stream_with(content: &[u8]) -> (TempDir, Stream) {
        let temp_dir = setup_test_env();
        let mut stream = Stream::open(temp_dir.path().join("stream.bin"), Mode::Write).unwrap();
        stream.write_all(content).unwrap();
        (temp_dir, stream)
    }

    // Helper function: Creates a temporary directory for tests
    fn setup_test_env() -> TempDir {
        TempDir::new("stream_test").unwrap()
    }
}

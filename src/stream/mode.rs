use std::fs::OpenOptions;
use std::io::SeekFrom;

/// Open intent of a [`Stream`](crate::Stream). Fixed for the stream's lifetime.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Read-only; the file must exist.
    Read,
    /// Read-write; the file is created or truncated.
    Write,
    /// Read-write; the file is created if missing and every write lands at its end.
    /// The position starts at 0, so reads begin at the start of the file and `tell()`
    /// reports 0 until the first write moves it to the end.
    Append,
}

impl Mode {
    pub(crate) fn open_options(self) -> OpenOptions {
        let mut options = OpenOptions::new();
        match self {
            Mode::Read => options.read(true),
            Mode::Write => options.read(true).write(true).create(true).truncate(true),
            Mode::Append => options.read(true).append(true).create(true),
        };
        options
    }

    pub fn is_readable(self) -> bool {
        match self {
            Mode::Read => true,
            Mode::Write => true,
            Mode::Append => true,
        }
    }

    pub fn is_writable(self) -> bool {
        match self {
            Mode::Read => false,
            Mode::Write => true,
            Mode::Append => true,
        }
    }

    /// Readers share the lock, writers take it exclusively.
    pub fn is_exclusive_lock(self) -> bool {
        match self {
            Mode::Read => false,
            Mode::Write | Mode::Append => true,
        }
    }
}

/// Seek origin.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

impl Whence {
    /// Combines the origin with `offset`. `None` for a negative offset from `Start`.
    pub(crate) fn seek_from(self, offset: i64) -> Option<SeekFrom> {
        match self {
            Whence::Start => u64::try_from(offset).ok().map(SeekFrom::Start),
            Whence::Current => Some(SeekFrom::Current(offset)),
            Whence::End => Some(SeekFrom::End(offset)),
        }
    }
}

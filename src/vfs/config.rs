use crate::core::utils;
use crate::stream::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
use crate::{FsError, Result};

/// Default permission bits of directories created by `mkdir`.
pub const DEFAULT_DIR_MODE: u32 = 0o775;

/// Default permission bits of files created by `write_file`.
pub const DEFAULT_FILE_MODE: u32 = 0o664;

/// Settings of a [`LocalFs`](crate::LocalFs).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LocalFsConfig {
    dir_mode: u32,
    file_mode: u32,
    read_chunk_size: usize,
}

impl Default for LocalFsConfig {
    fn default() -> Self {
        Self {
            dir_mode: DEFAULT_DIR_MODE,
            file_mode: DEFAULT_FILE_MODE,
            read_chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl LocalFsConfig {
    pub fn dir_mode(&self) -> u32 {
        self.dir_mode
    }

    pub fn file_mode(&self) -> u32 {
        self.file_mode
    }

    /// Chunk size of unbounded stream reads and of file copies.
    pub fn read_chunk_size(&self) -> usize {
        self.read_chunk_size
    }

    /// Changes the permission bits used when `mkdir` gets no explicit mode.
    pub fn set_dir_mode(&mut self, mode: u32) -> Result<()> {
        self.dir_mode = utils::check_mode(mode)?;
        Ok(())
    }

    /// Changes the permission bits used when `write_file` gets no explicit mode.
    pub fn set_file_mode(&mut self, mode: u32) -> Result<()> {
        self.file_mode = utils::check_mode(mode)?;
        Ok(())
    }

    /// Accepts sizes from 1 to [`MAX_CHUNK_SIZE`](crate::MAX_CHUNK_SIZE).
    pub fn set_read_chunk_size(&mut self, size: usize) -> Result<()> {
        if !(1..=MAX_CHUNK_SIZE).contains(&size) {
            return Err(FsError::InvalidArgument(format!(
                "the chunk size {size} must be between 1 and {MAX_CHUNK_SIZE}"
            )));
        }
        self.read_chunk_size = size;
        Ok(())
    }
}

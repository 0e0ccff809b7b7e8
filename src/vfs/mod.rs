mod config;
mod local_fs;
mod mime;
mod walk;

pub use config::{DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, LocalFsConfig};
pub use local_fs::LocalFs;
pub use mime::sniff as sniff_mime_type;
pub use walk::Walk;

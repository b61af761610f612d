//! Fee schedule storage.

pub mod file;

pub use file::{DEFAULT_FEES_FILE, FileFeeScheduleStore};

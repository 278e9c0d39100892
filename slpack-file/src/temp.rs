//! Scratch files for staging chunk writes.

use std::env;
use std::io;
use std::path::PathBuf;

use tempfile::{Builder, NamedTempFile};

/// Pick a directory for scratch files, in order of preference: the TEMP
/// and TMP environment variables, /tmp if it exists, HOME, and finally
/// the current directory.
fn scratch_dir() -> PathBuf {
    if let Some(dir) = env::var_os("TEMP") {
        return PathBuf::from(dir);
    }
    if let Some(dir) = env::var_os("TMP") {
        return PathBuf::from(dir);
    }
    let tmp = PathBuf::from("/tmp");
    if tmp.is_dir() {
        return tmp;
    }
    if let Some(dir) = env::var_os("HOME") {
        return PathBuf::from(dir);
    }
    PathBuf::from(".")
}

/// Create a scratch file open for reading and writing. The file is
/// deleted when the returned handle (or its detached path) is dropped.
pub(crate) fn scratch_file() -> io::Result<NamedTempFile> {
    Builder::new().prefix("slpack").tempfile_in(scratch_dir())
}

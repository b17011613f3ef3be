//! Filesystem helpers for stage and output directories.

use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

/// Recursively remove `path`, treating a missing directory as success.
pub fn remove_dir_all_if_exists(path: &Path) -> io::Result<()> {
  match fs::remove_dir_all(path) {
    Ok(()) => {
      debug!(path = %path.display(), "removed directory");
      Ok(())
    }
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(e) => Err(e),
  }
}

/// Create `path` and all missing parents.
///
/// With `wipeout`, any existing directory at `path` is removed first so the
/// result is always empty.
pub fn make_dir(path: &Path, wipeout: bool) -> io::Result<()> {
  if wipeout {
    remove_dir_all_if_exists(path)?;
  }

  fs::create_dir_all(path)
}

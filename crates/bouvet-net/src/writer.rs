//! Writes configuration files only when their content changes.

use crate::error::Result;
use crate::system::FileSystem;
use std::path::Path;
use tracing::{debug, info};

/// Write `content` to `path` unless the file already holds exactly that.
///
/// Returns `true` if the file was written. A missing file counts as empty.
pub async fn write_if_changed(fs: &dyn FileSystem, path: &Path, content: &str) -> Result<bool> {
    let current = fs.read_file_string(path).await?;
    if current == content {
        debug!(path = %path.display(), "configuration unchanged");
        return Ok(false);
    }

    fs.write_file_string(path, content).await?;
    info!(path = %path.display(), "configuration updated");
    Ok(true)
}

//! Upload staging.

use std::io;
use std::path::Path;

/// Write an uploaded artifact to `path`, replacing whatever was there.
///
/// Missing parent directories are created. The path is shared by every task,
/// which is only sound because tasks never overlap.
pub async fn stage_artifact(path: &Path, artifact: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, artifact).await
}

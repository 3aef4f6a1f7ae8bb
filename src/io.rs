//! Buffered whole-file load and atomic-replace save.

use crate::error::{VfsError, VfsResult};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Read/write chunk size.
const BUFFER_SIZE: usize = 4096;

/// Read the whole file into a buffer, in fixed-size chunks with a
/// cancellation checkpoint between chunks. A read error discards the
/// partial buffer.
pub async fn load(path: &Path, cancel: &CancellationToken) -> VfsResult<Vec<u8>> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| VfsError::from_io(e, path))?;

    let mut buffer: Vec<u8> = Vec::new();
    let mut chunk = [0u8; BUFFER_SIZE];
    loop {
        if cancel.is_cancelled() {
            return Err(VfsError::Cancelled);
        }
        let n = file
            .read(&mut chunk)
            .await
            .map_err(|e| VfsError::from_io(e, path))?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }

    Ok(buffer)
}

/// Write `buffer` to `path` through a temp file in the same directory,
/// flushed and renamed into place, so a crash mid-write cannot corrupt
/// an existing destination. Partial writes are looped; cancellation is
/// observed between chunks and removes the temp file.
pub async fn write(path: &Path, buffer: &[u8], cancel: &CancellationToken) -> VfsResult<()> {
    let temp_path = temp_sibling(path);

    let result = write_to_temp(&temp_path, buffer, cancel).await;
    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }

    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        debug!(temp = %temp_path.display(), "rename failed, removing temp file");
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(VfsError::from_io(e, path));
    }

    Ok(())
}

async fn write_to_temp(
    temp_path: &Path,
    buffer: &[u8],
    cancel: &CancellationToken,
) -> VfsResult<()> {
    let mut file = tokio::fs::File::create(temp_path)
        .await
        .map_err(|e| VfsError::from_io(e, temp_path))?;

    for chunk in buffer.chunks(BUFFER_SIZE) {
        if cancel.is_cancelled() {
            return Err(VfsError::Cancelled);
        }
        file.write_all(chunk)
            .await
            .map_err(|e| VfsError::from_io(e, temp_path))?;
    }

    file.flush()
        .await
        .map_err(|e| VfsError::from_io(e, temp_path))?;
    file.sync_all()
        .await
        .map_err(|e| VfsError::from_io(e, temp_path))?;

    Ok(())
}

/// Hidden temp name next to the destination so the rename stays on one
/// filesystem.
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let temp_name = format!(".{}.{}.tmp", name, Uuid::new_v4().simple());
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(temp_name),
        _ => PathBuf::from(temp_name),
    }
}

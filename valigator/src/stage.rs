//! Staging of inbound documents on disk for the engine to read.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

use crate::error::StageError;

/// Extension of staged documents. The engine sniffs YAML and JSON alike from
/// a `.yml` file.
const STAGED_EXTENSION: &str = "yml";

/// A request body persisted under a unique name.
///
/// The file is removed when the value is dropped, so every exit path of a
/// request cleans up after itself. [`StagedDocument::remove`] removes it
/// eagerly and reports failures through the log.
#[derive(Debug)]
pub struct StagedDocument {
    path: PathBuf,
    removed: bool,
}

impl StagedDocument {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the staged file now.
    pub async fn remove(mut self) {
        self.removed = true;
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove staged document");
        }
    }
}

impl Drop for StagedDocument {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove staged document");
        }
    }
}

/// Write `content` to a fresh `<uuid>.yml` file inside `dir`.
///
/// The file is created with `create_new`, so an existing file is never
/// overwritten. If writing fails partway the partial file is removed before
/// the error is returned.
///
/// # Errors
///
/// Returns [`StageError::Create`] if the file cannot be created and
/// [`StageError::Write`] if writing or flushing fails.
pub async fn stage_document(dir: &Path, content: &[u8]) -> Result<StagedDocument, StageError> {
    let path = dir.join(format!("{}.{STAGED_EXTENSION}", Uuid::new_v4()));

    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .await
        .map_err(|source| StageError::Create {
            path: path.clone(),
            source,
        })?;

    // From here on the guard owns the file and removes it on failure.
    let staged = StagedDocument {
        path,
        removed: false,
    };
    let staged = fill_staged(staged, file, content).await?;
    tracing::debug!(path = %staged.path.display(), bytes = content.len(), "Staged document");
    Ok(staged)
}

/// Write and flush `content` through `writer`, deleting the staged file if any
/// step fails. The writer is closed before the staged document is returned.
async fn fill_staged<W>(
    staged: StagedDocument,
    mut writer: W,
    content: &[u8],
) -> Result<StagedDocument, StageError>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        writer.write_all(content).await?;
        writer.flush().await?;
        writer.shutdown().await
    }
    .await;
    drop(writer);

    match written {
        Ok(()) => Ok(staged),
        Err(source) => {
            let path = staged.path.clone();
            staged.remove().await;
            Err(StageError::Write { path, source })
        }
    }
}

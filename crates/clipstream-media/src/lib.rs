//! Media-host collaborator: binary assets live on a third-party host and
//! are addressed by an opaque deletable handle. The core only depends on
//! the [`MediaStore`] contract.

pub mod local;
pub mod remote;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

pub use local::LocalMediaStore;
pub use remote::RemoteMediaHost;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media host request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("media host rejected the operation: {0}")]
    Failed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// What the host returns for a stored asset. `duration` is only reported
/// for video uploads.
#[derive(Debug, Clone)]
pub struct StoredAsset {
    pub url: String,
    pub public_id: String,
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    Video,
}

impl AssetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::Video => "video",
        }
    }
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Upload a local file, returning its public URL and delete handle.
    async fn store(&self, local_path: &Path) -> Result<StoredAsset, MediaError>;

    /// Delete by handle. Implementations tolerate handles that are
    /// already gone.
    async fn remove(&self, public_id: &str, kind: AssetKind) -> Result<(), MediaError>;
}

/// A received upload spooled to local disk. Dropping the guard deletes the
/// file, so every exit path cleans up before an error can propagate, even
/// when validation fails after a partial file was already received.
#[derive(Debug)]
pub struct TempUpload {
    path: PathBuf,
}

impl TempUpload {
    /// Spool `data` into `dir` under a fresh name that keeps the original
    /// extension.
    pub async fn write(dir: &Path, original_name: &str, data: &[u8]) -> Result<Self, MediaError> {
        tokio::fs::create_dir_all(dir).await?;

        let mut name = Uuid::new_v4().to_string();
        if let Some(ext) = Path::new(original_name).extension().and_then(|e| e.to_str()) {
            name.push('.');
            name.push_str(ext);
        }
        let path = dir.join(name);
        tokio::fs::write(&path, data).await?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove temp upload {}: {}", self.path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn temp_upload_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let upload = TempUpload::write(dir.path(), "clip.mp4", b"data").await.unwrap();
        let path = upload.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(path.extension().unwrap(), "mp4");

        drop(upload);
        assert!(!path.exists());
    }
}

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{AssetKind, MediaError, MediaStore, StoredAsset};

/// Disk-backed media store for development and tests: assets live in one
/// directory, the handle is the file name, URLs point at the static
/// route that serves the directory.
pub struct LocalMediaStore {
    dir: PathBuf,
    public_base: String,
}

impl LocalMediaStore {
    pub fn new(dir: PathBuf, public_base: String) -> Self {
        Self {
            dir,
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn store(&self, local_path: &Path) -> Result<StoredAsset, MediaError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut name = Uuid::new_v4().to_string();
        if let Some(ext) = local_path.extension().and_then(|e| e.to_str()) {
            name.push('.');
            name.push_str(ext);
        }

        tokio::fs::copy(local_path, self.dir.join(&name)).await?;
        info!("Stored asset {} in {}", name, self.dir.display());

        Ok(StoredAsset {
            url: format!("{}/{}", self.public_base, name),
            public_id: name,
            duration: None,
        })
    }

    async fn remove(&self, public_id: &str, _kind: AssetKind) -> Result<(), MediaError> {
        match tokio::fs::remove_file(self.dir.join(public_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Asset {} already gone", public_id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_and_remove_roundtrip() {
        let assets = tempfile::tempdir().unwrap();
        let spool = tempfile::tempdir().unwrap();
        let src = spool.path().join("thumb.png");
        tokio::fs::write(&src, b"png-bytes").await.unwrap();

        let store = LocalMediaStore::new(assets.path().to_path_buf(), "/static".into());
        let asset = store.store(&src).await.unwrap();
        assert!(asset.url.starts_with("/static/"));
        assert!(asset.public_id.ends_with(".png"));
        assert!(assets.path().join(&asset.public_id).exists());

        store.remove(&asset.public_id, AssetKind::Image).await.unwrap();
        assert!(!assets.path().join(&asset.public_id).exists());

        // already-gone handles are tolerated
        store.remove(&asset.public_id, AssetKind::Image).await.unwrap();
    }
}

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::{AssetKind, MediaError, MediaStore, StoredAsset};

/// HTTP client for the external media host. Uploads go up as multipart
/// form data; deletion is by opaque handle.
pub struct RemoteMediaHost {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
    public_id: String,
    duration: Option<f64>,
}

impl RemoteMediaHost {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl MediaStore for RemoteMediaHost {
    async fn store(&self, local_path: &Path) -> Result<StoredAsset, MediaError> {
        let data = tokio::fs::read(local_path).await?;
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();

        let form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::bytes(data).file_name(file_name));

        let response = self
            .client
            .post(format!("{}/assets", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MediaError::Failed(format!(
                "upload returned {}",
                response.status()
            )));
        }

        let body: UploadResponse = response.json().await?;
        info!("Stored asset {} at media host", body.public_id);
        Ok(StoredAsset {
            url: body.url,
            public_id: body.public_id,
            duration: body.duration,
        })
    }

    async fn remove(&self, public_id: &str, kind: AssetKind) -> Result<(), MediaError> {
        let response = self
            .client
            .delete(format!("{}/assets/{}", self.base_url, public_id))
            .query(&[("kind", kind.as_str())])
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            warn!("Asset {} already gone from media host", public_id);
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(MediaError::Failed(format!(
                "delete returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

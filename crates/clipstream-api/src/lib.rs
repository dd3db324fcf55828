pub mod comments;
pub mod dashboard;
pub mod error;
pub mod likes;
pub mod middleware;
pub mod pagination;
pub mod playlists;
pub mod session;
pub mod subscriptions;
pub mod tokens;
pub mod tweets;
pub mod upload;
pub mod users;
pub mod videos;

use std::path::PathBuf;
use std::sync::Arc;

use clipstream_db::Database;
use clipstream_media::MediaStore;
use uuid::Uuid;

use crate::error::ApiError;
use crate::tokens::TokenService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub media: Arc<dyn MediaStore>,
    pub tokens: TokenService,
    /// Spool directory for received uploads before they go to the media
    /// host.
    pub tmp_dir: PathBuf,
}

/// Path ids arrive as text; a malformed id is a BadRequest, not a routing
/// failure, so every handler gets the uniform envelope.
pub fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::BadRequest(format!("Invalid {what} id")))
}

pub(crate) fn asset_ref(asset: &clipstream_media::StoredAsset) -> clipstream_types::models::AssetRef {
    clipstream_types::models::AssetRef {
        url: asset.url.clone(),
        public_id: asset.public_id.clone(),
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored media asset: the public URL plus the opaque handle the media
/// host needs to delete it again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRef {
    pub url: String,
    pub public_id: String,
}

/// Full account document as persisted. The password digest and the current
/// refresh token never leave the store layer - handlers work with
/// [`CurrentUser`] instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: AssetRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<AssetRef>,
    #[serde(default)]
    pub watch_history: Vec<Uuid>,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The account shape attached to authenticated requests and returned to
/// clients: a [`User`] with the credential fields stripped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: AssetRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<AssetRef>,
    #[serde(default)]
    pub watch_history: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for CurrentUser {
    fn from(user: User) -> Self {
        CurrentUser {
            id: user.id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            avatar: user.avatar,
            cover_image: user.cover_image,
            watch_history: user.watch_history,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub id: Uuid,
    pub owner: Uuid,
    pub video_file: AssetRef,
    pub thumbnail: AssetRef,
    pub title: String,
    pub description: String,
    /// Seconds, as reported by the media host.
    pub duration: f64,
    #[serde(default)]
    pub views: u64,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub content: String,
    pub video: Uuid,
    pub owner: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tweet {
    pub id: Uuid,
    pub content: String,
    pub owner: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Thin relationship record. Exactly one of `video` / `comment` / `tweet`
/// is set; the (liked_by, target) pair is unique at the store layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Like {
    pub id: Uuid,
    pub liked_by: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tweet: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// subscriber follows channel. The pair is unique at the store layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub subscriber: Uuid,
    pub channel: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub owner: Uuid,
    /// Ordered, no duplicates; only the owner mutates membership.
    #[serde(default)]
    pub videos: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

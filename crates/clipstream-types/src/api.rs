use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AssetRef, CurrentUser};

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

/// Body of login and refresh responses. Both tokens also travel as
/// HttpOnly cookies; the body copy serves non-cookie clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthPayload {
    pub user: CurrentUser,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateAccountRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
}

// -- Content --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommentRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TweetRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePlaylistRequest {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePlaylistRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

// -- Toggles --

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ToggleOutcome {
    pub toggled: bool,
}

// -- Channel views --

#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelProfile {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub avatar: AssetRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<AssetRef>,
    pub subscribers_count: u64,
    pub channels_subscribed_to_count: u64,
    pub is_subscribed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelStats {
    pub id: Uuid,
    pub username: String,
    pub avatar: AssetRef,
    pub video_count: u64,
    pub subscriber_count: u64,
    pub like_count: u64,
}

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use clipstream_db::paginate::PageRequest;
use clipstream_db::{Collection, Filter, Lookup, Projection, Stage};
use clipstream_types::api::{CreatePlaylistRequest, UpdatePlaylistRequest};
use clipstream_types::models::{CurrentUser, Playlist};
use clipstream_types::page::Page;

use crate::error::{ApiError, ApiResponse};
use crate::middleware::ensure_owner;
use crate::pagination::PageParams;
use crate::{AppState, parse_id};

fn load_playlist(state: &AppState, id: Uuid) -> Result<Playlist, ApiError> {
    state
        .db
        .get(Collection::Playlists, &id.to_string())?
        .ok_or_else(|| ApiError::NotFound("Playlist not found".into()))
}

fn video_membership_join() -> Lookup {
    Lookup::new(Collection::Videos, "videos", "id", "videos").with_pipeline(vec![Stage::Project(
        Projection::include(&["id", "title", "thumbnail", "duration", "views"]),
    )])
}

/// POST /playlists
pub async fn create_playlist(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<CreatePlaylistRequest>,
) -> Result<ApiResponse<Playlist>, ApiError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Playlist name is required".into()));
    }
    let description = req.description.trim();
    if description.is_empty() {
        return Err(ApiError::BadRequest(
            "Playlist description is required".into(),
        ));
    }

    let now = Utc::now();
    let playlist = Playlist {
        id: Uuid::new_v4(),
        name: name.to_string(),
        description: description.to_string(),
        owner: current.id,
        videos: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    state.db.insert(Collection::Playlists, &playlist)?;

    Ok(ApiResponse::created(
        playlist,
        "Playlist created successfully",
    ))
}

/// GET /playlists/user/{userId} - a user's playlists with their video
/// membership joined in playlist order.
pub async fn user_playlists(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<ApiResponse<Page<Value>>, ApiError> {
    let owner = parse_id(&user_id, "user")?;

    let req = PageRequest::new(Filter::new().eq("owner", json!(owner)))
        .page(params.page(), params.limit())
        .join(video_membership_join())
        .project(Projection::include(&[
            "id",
            "name",
            "description",
            "created_at",
            "updated_at",
            "videos",
        ]));

    let page = state.db.paginate(Collection::Playlists, &req)?;
    Ok(ApiResponse::ok(page, "User playlists fetched successfully"))
}

/// GET /playlists/{playlistId}
pub async fn get_playlist(
    State(state): State<AppState>,
    Path(playlist_id): Path<String>,
) -> Result<ApiResponse<Value>, ApiError> {
    let id = parse_id(&playlist_id, "playlist")?;

    let owner_join = Lookup::new(Collection::Users, "owner", "id", "owner")
        .first()
        .with_pipeline(vec![Stage::Project(Projection::include(&[
            "id", "username", "avatar",
        ]))]);

    let stages = [
        Stage::Match(Filter::new().eq("id", json!(id))),
        Stage::Lookup(video_membership_join()),
        Stage::Lookup(owner_join),
    ];

    let doc = state
        .db
        .aggregate(Collection::Playlists, &stages)?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::NotFound("Playlist not found".into()))?;

    Ok(ApiResponse::ok(doc, "Playlist fetched successfully"))
}

/// PATCH /playlists/add/{videoId}/{playlistId}
pub async fn add_video_to_playlist(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((video_id, playlist_id)): Path<(String, String)>,
) -> Result<ApiResponse<Playlist>, ApiError> {
    let video = parse_id(&video_id, "video")?;
    let playlist_id = parse_id(&playlist_id, "playlist")?;

    let mut playlist = load_playlist(&state, playlist_id)?;
    ensure_owner(playlist.owner, current.id, "playlist")?;

    // Membership invariant: a video appears at most once.
    if playlist.videos.contains(&video) {
        return Err(ApiError::BadRequest(
            "Video already exists in playlist".into(),
        ));
    }

    playlist.videos.push(video);
    playlist.updated_at = Utc::now();
    state.db.replace(Collection::Playlists, &playlist)?;

    Ok(ApiResponse::ok(
        playlist,
        "Video added to playlist successfully",
    ))
}

/// PATCH /playlists/remove/{videoId}/{playlistId}
pub async fn remove_video_from_playlist(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((video_id, playlist_id)): Path<(String, String)>,
) -> Result<ApiResponse<Playlist>, ApiError> {
    let video = parse_id(&video_id, "video")?;
    let playlist_id = parse_id(&playlist_id, "playlist")?;

    let mut playlist = load_playlist(&state, playlist_id)?;
    ensure_owner(playlist.owner, current.id, "playlist")?;

    playlist.videos.retain(|v| *v != video);
    playlist.updated_at = Utc::now();
    state.db.replace(Collection::Playlists, &playlist)?;

    Ok(ApiResponse::ok(
        playlist,
        "Video removed from playlist successfully",
    ))
}

/// PATCH /playlists/{playlistId}
pub async fn update_playlist(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(playlist_id): Path<String>,
    Json(req): Json<UpdatePlaylistRequest>,
) -> Result<ApiResponse<Playlist>, ApiError> {
    let id = parse_id(&playlist_id, "playlist")?;

    let mut playlist = load_playlist(&state, id)?;
    ensure_owner(playlist.owner, current.id, "playlist")?;

    if let Some(name) = req.name.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        playlist.name = name.to_string();
    }
    if let Some(description) = req
        .description
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        playlist.description = description.to_string();
    }

    playlist.updated_at = Utc::now();
    state.db.replace(Collection::Playlists, &playlist)?;

    Ok(ApiResponse::ok(playlist, "Playlist updated successfully"))
}

/// DELETE /playlists/{playlistId}
pub async fn delete_playlist(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(playlist_id): Path<String>,
) -> Result<ApiResponse<Value>, ApiError> {
    let id = parse_id(&playlist_id, "playlist")?;

    let playlist = load_playlist(&state, id)?;
    ensure_owner(playlist.owner, current.id, "playlist")?;

    state.db.remove(Collection::Playlists, &id.to_string())?;

    Ok(ApiResponse::ok(Value::Null, "Playlist deleted successfully"))
}

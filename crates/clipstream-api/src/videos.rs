use axum::Extension;
use axum::extract::{Multipart, Path, Query, State};
use chrono::Utc;
use serde_json::{Value, json};
use tracing::warn;
use uuid::Uuid;

use clipstream_db::paginate::PageRequest;
use clipstream_db::{Collection, Filter, Lookup, Projection, Stage};
use clipstream_media::AssetKind;
use clipstream_types::models::{CurrentUser, User, Video};
use clipstream_types::page::Page;

use crate::error::{ApiError, ApiResponse};
use crate::middleware::ensure_owner;
use crate::pagination::PageParams;
use crate::upload::UploadForm;
use crate::{AppState, asset_ref, parse_id};

fn owner_join() -> Lookup {
    Lookup::new(Collection::Users, "owner", "id", "owner")
        .first()
        .with_pipeline(vec![Stage::Project(Projection::include(&[
            "id",
            "username",
            "full_name",
            "avatar",
        ]))])
}

fn load_video(state: &AppState, id: Uuid) -> Result<Video, ApiError> {
    state
        .db
        .get(Collection::Videos, &id.to_string())?
        .ok_or_else(|| ApiError::NotFound("Video not found".into()))
}

/// GET /videos - the feed: optional text search, owner filter, sort and
/// page window, owner joined and collapsed per video.
pub async fn list_videos(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<ApiResponse<Page<Value>>, ApiError> {
    let mut filter = Filter::new();
    if let Some(query) = params.query.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        // Search text is matched literally, not as a pattern.
        filter = filter.text(&["title", "description"], &regex::escape(query));
    }
    if let Some(user_id) = params.user_id.as_deref().filter(|s| !s.is_empty()) {
        let owner = parse_id(user_id, "user")?;
        filter = filter.eq("owner", json!(owner));
    }

    let mut req = PageRequest::new(filter)
        .page(params.page(), params.limit())
        .join(owner_join())
        .project(Projection::include(&[
            "id",
            "title",
            "description",
            "video_file",
            "thumbnail",
            "duration",
            "views",
            "created_at",
            "owner",
        ]));
    req.sort = params.sort();

    // Run the store work off the async runtime
    let state2 = state.clone();
    let page = tokio::task::spawn_blocking(move || state2.db.paginate(Collection::Videos, &req))
        .await
        .map_err(|e| ApiError::Internal(format!("spawn_blocking join error: {e}")))??;

    Ok(ApiResponse::ok(page, "Videos fetched successfully"))
}

/// POST /videos - multipart: title, description, video_file, thumbnail.
pub async fn publish_video(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<ApiResponse<Video>, ApiError> {
    let mut form =
        UploadForm::read(&mut multipart, &state.tmp_dir, &["video_file", "thumbnail"]).await?;

    let title = form.required_text("title")?;
    let description = form.required_text("description")?;
    let video_upload = form
        .take_file("video_file")
        .ok_or_else(|| ApiError::BadRequest("video_file is required".into()))?;
    let thumbnail_upload = form
        .take_file("thumbnail")
        .ok_or_else(|| ApiError::BadRequest("thumbnail is required".into()))?;

    let stored_video = state.media.store(video_upload.path()).await?;
    let stored_thumbnail = state.media.store(thumbnail_upload.path()).await?;

    let now = Utc::now();
    let video = Video {
        id: Uuid::new_v4(),
        owner: current.id,
        video_file: asset_ref(&stored_video),
        thumbnail: asset_ref(&stored_thumbnail),
        title,
        description,
        duration: stored_video.duration.unwrap_or(0.0),
        views: 0,
        is_published: true,
        created_at: now,
        updated_at: now,
    };
    state.db.insert(Collection::Videos, &video)?;

    Ok(ApiResponse::created(video, "Video published successfully"))
}

/// GET /videos/{id} - bumps the view counter and moves the video to the
/// front of the caller's watch history before responding with the video
/// and its joined owner.
pub async fn get_video(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(video_id): Path<String>,
) -> Result<ApiResponse<Value>, ApiError> {
    let id = parse_id(&video_id, "video")?;

    let mut video = load_video(&state, id)?;
    video.views += 1;
    state.db.replace(Collection::Videos, &video)?;

    // Watch history: most recent first, one entry per video.
    let mut user: User = state
        .db
        .get(Collection::Users, &current.id.to_string())?
        .ok_or_else(|| ApiError::Unauthorized("Account no longer exists".into()))?;
    user.watch_history.retain(|v| *v != id);
    user.watch_history.insert(0, id);
    state.db.replace(Collection::Users, &user)?;

    let stages = [
        Stage::Match(Filter::new().eq("id", json!(id))),
        Stage::Lookup(owner_join()),
    ];
    let doc = state
        .db
        .aggregate(Collection::Videos, &stages)?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::NotFound("Video not found".into()))?;

    Ok(ApiResponse::ok(doc, "Video fetched successfully"))
}

/// PATCH /videos/{id} - multipart: optional title, description and
/// replacement thumbnail. The old thumbnail is deleted from the media
/// host before the record is rewritten; if that deletion fails the record
/// stays untouched.
pub async fn update_video(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(video_id): Path<String>,
    mut multipart: Multipart,
) -> Result<ApiResponse<Video>, ApiError> {
    let id = parse_id(&video_id, "video")?;
    let mut form = UploadForm::read(&mut multipart, &state.tmp_dir, &["thumbnail"]).await?;

    let mut video = load_video(&state, id)?;
    ensure_owner(video.owner, current.id, "video")?;

    if let Some(title) = form.text("title") {
        video.title = title;
    }
    if let Some(description) = form.text("description") {
        video.description = description;
    }

    if let Some(upload) = form.take_file("thumbnail") {
        let stored = state.media.store(upload.path()).await?;
        let old = std::mem::replace(&mut video.thumbnail, asset_ref(&stored));

        if let Err(e) = state.media.remove(&old.public_id, AssetKind::Image).await {
            warn!("Failed to delete old thumbnail {}: {}", old.public_id, e);
            return Err(ApiError::Dependency(
                "Failed to delete the old thumbnail from the media host".into(),
            ));
        }
    }

    video.updated_at = Utc::now();
    state.db.replace(Collection::Videos, &video)?;

    Ok(ApiResponse::ok(video, "Video updated successfully"))
}

/// DELETE /videos/{id} - both remote assets go first (thumbnail, then
/// video file); any failure aborts with the record retained, and a retry
/// re-attempts the remaining asset since remove() tolerates handles that
/// are already gone. The record delete runs last.
pub async fn delete_video(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(video_id): Path<String>,
) -> Result<ApiResponse<Value>, ApiError> {
    let id = parse_id(&video_id, "video")?;

    let video = load_video(&state, id)?;
    ensure_owner(video.owner, current.id, "video")?;

    if let Err(e) = state
        .media
        .remove(&video.thumbnail.public_id, AssetKind::Image)
        .await
    {
        warn!("Failed to delete thumbnail {}: {}", video.thumbnail.public_id, e);
        return Err(ApiError::Dependency(
            "Failed to delete the thumbnail from the media host".into(),
        ));
    }
    if let Err(e) = state
        .media
        .remove(&video.video_file.public_id, AssetKind::Video)
        .await
    {
        warn!("Failed to delete video file {}: {}", video.video_file.public_id, e);
        return Err(ApiError::Dependency(
            "Failed to delete the video from the media host".into(),
        ));
    }

    state.db.remove(Collection::Videos, &id.to_string())?;

    Ok(ApiResponse::ok(Value::Null, "Video deleted successfully"))
}

/// PATCH /videos/toggle/publish/{id}
pub async fn toggle_publish_status(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(video_id): Path<String>,
) -> Result<ApiResponse<Video>, ApiError> {
    let id = parse_id(&video_id, "video")?;

    let mut video = load_video(&state, id)?;
    ensure_owner(video.owner, current.id, "video")?;

    video.is_published = !video.is_published;
    video.updated_at = Utc::now();
    state.db.replace(Collection::Videos, &video)?;

    let message = if video.is_published {
        "Video is now published"
    } else {
        "Video is now unpublished"
    };
    Ok(ApiResponse::ok(video, message))
}

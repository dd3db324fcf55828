use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use clipstream_db::paginate::PageRequest;
use clipstream_db::{Collection, Filter, Lookup, Projection, Stage};
use clipstream_types::api::CommentRequest;
use clipstream_types::models::{Comment, CurrentUser};
use clipstream_types::page::Page;

use crate::error::{ApiError, ApiResponse};
use crate::middleware::ensure_owner;
use crate::pagination::PageParams;
use crate::{AppState, parse_id};

fn load_comment(state: &AppState, id: Uuid) -> Result<Comment, ApiError> {
    state
        .db
        .get(Collection::Comments, &id.to_string())?
        .ok_or_else(|| ApiError::NotFound("Comment not found".into()))
}

/// GET /comments/{videoId} - the video's comment thread, newest first,
/// each comment's author collapsed to a projected object.
pub async fn list_comments(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<ApiResponse<Page<Value>>, ApiError> {
    let id = parse_id(&video_id, "video")?;

    let author_join = Lookup::new(Collection::Users, "owner", "id", "owner")
        .first()
        .with_pipeline(vec![Stage::Project(Projection::include(&[
            "id", "username", "avatar",
        ]))]);

    let req = PageRequest::new(Filter::new().eq("video", json!(id)))
        .page(params.page(), params.limit())
        .join(author_join)
        .project(Projection::include(&[
            "id",
            "content",
            "created_at",
            "video",
            "owner",
        ]));

    // Run the store work off the async runtime
    let state2 = state.clone();
    let page = tokio::task::spawn_blocking(move || state2.db.paginate(Collection::Comments, &req))
        .await
        .map_err(|e| ApiError::Internal(format!("spawn_blocking join error: {e}")))??;

    Ok(ApiResponse::ok(page, "Comments fetched successfully"))
}

/// POST /comments/{videoId}
pub async fn add_comment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(video_id): Path<String>,
    Json(req): Json<CommentRequest>,
) -> Result<ApiResponse<Comment>, ApiError> {
    let video = parse_id(&video_id, "video")?;

    let content = req.content.trim();
    if content.is_empty() {
        return Err(ApiError::BadRequest("Comment content is missing".into()));
    }

    let now = Utc::now();
    let comment = Comment {
        id: Uuid::new_v4(),
        content: content.to_string(),
        video,
        owner: current.id,
        created_at: now,
        updated_at: now,
    };
    state.db.insert(Collection::Comments, &comment)?;

    Ok(ApiResponse::created(comment, "Comment added successfully"))
}

/// PATCH /comments/c/{commentId}
pub async fn update_comment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(comment_id): Path<String>,
    Json(req): Json<CommentRequest>,
) -> Result<ApiResponse<Comment>, ApiError> {
    let id = parse_id(&comment_id, "comment")?;

    let content = req.content.trim();
    if content.is_empty() {
        return Err(ApiError::BadRequest("Comment content cannot be empty".into()));
    }

    let mut comment = load_comment(&state, id)?;
    ensure_owner(comment.owner, current.id, "comment")?;

    comment.content = content.to_string();
    comment.updated_at = Utc::now();
    state.db.replace(Collection::Comments, &comment)?;

    Ok(ApiResponse::ok(comment, "Comment updated successfully"))
}

/// DELETE /comments/c/{commentId}
pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(comment_id): Path<String>,
) -> Result<ApiResponse<Value>, ApiError> {
    let id = parse_id(&comment_id, "comment")?;

    let comment = load_comment(&state, id)?;
    ensure_owner(comment.owner, current.id, "comment")?;

    state.db.remove(Collection::Comments, &id.to_string())?;

    Ok(ApiResponse::ok(Value::Null, "Comment deleted successfully"))
}

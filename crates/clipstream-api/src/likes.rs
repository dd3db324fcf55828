use axum::Extension;
use axum::extract::{Path, Query, State};
use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use clipstream_db::paginate::PageRequest;
use clipstream_db::{Collection, Filter, Lookup, Projection, Stage};
use clipstream_types::api::ToggleOutcome;
use clipstream_types::models::{CurrentUser, Like};
use clipstream_types::page::Page;

use crate::error::{ApiError, ApiResponse};
use crate::pagination::PageParams;
use crate::{AppState, parse_id};

/// One target kind per like; the pair filter and the partial unique index
/// both key on the same (actor, target) columns.
enum LikeTarget {
    Video(Uuid),
    Comment(Uuid),
    Tweet(Uuid),
}

impl LikeTarget {
    fn field(&self) -> &'static str {
        match self {
            LikeTarget::Video(_) => "video",
            LikeTarget::Comment(_) => "comment",
            LikeTarget::Tweet(_) => "tweet",
        }
    }

    fn id(&self) -> Uuid {
        match self {
            LikeTarget::Video(id) | LikeTarget::Comment(id) | LikeTarget::Tweet(id) => *id,
        }
    }
}

fn toggle_like(
    state: &AppState,
    actor: Uuid,
    target: LikeTarget,
) -> Result<ToggleOutcome, ApiError> {
    let pair = Filter::new()
        .eq("liked_by", json!(actor))
        .eq(target.field(), json!(target.id()));

    let like = Like {
        id: Uuid::new_v4(),
        liked_by: actor,
        video: matches!(target, LikeTarget::Video(_)).then(|| target.id()),
        comment: matches!(target, LikeTarget::Comment(_)).then(|| target.id()),
        tweet: matches!(target, LikeTarget::Tweet(_)).then(|| target.id()),
        created_at: Utc::now(),
    };
    let doc = serde_json::to_value(&like)
        .map_err(|e| ApiError::Internal(format!("like serialization failed: {e}")))?;

    let toggled = state.db.toggle(Collection::Likes, &pair, || doc)?;
    Ok(ToggleOutcome { toggled })
}

/// POST /likes/toggle/v/{videoId}
pub async fn toggle_video_like(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(video_id): Path<String>,
) -> Result<ApiResponse<ToggleOutcome>, ApiError> {
    let id = parse_id(&video_id, "video")?;
    let outcome = toggle_like(&state, current.id, LikeTarget::Video(id))?;
    Ok(ApiResponse::ok(outcome, "Video like toggled successfully"))
}

/// POST /likes/toggle/c/{commentId}
pub async fn toggle_comment_like(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(comment_id): Path<String>,
) -> Result<ApiResponse<ToggleOutcome>, ApiError> {
    let id = parse_id(&comment_id, "comment")?;
    let outcome = toggle_like(&state, current.id, LikeTarget::Comment(id))?;
    Ok(ApiResponse::ok(outcome, "Comment like toggled successfully"))
}

/// POST /likes/toggle/t/{tweetId}
pub async fn toggle_tweet_like(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(tweet_id): Path<String>,
) -> Result<ApiResponse<ToggleOutcome>, ApiError> {
    let id = parse_id(&tweet_id, "tweet")?;
    let outcome = toggle_like(&state, current.id, LikeTarget::Tweet(id))?;
    Ok(ApiResponse::ok(outcome, "Tweet like toggled successfully"))
}

/// GET /likes/videos - the caller's liked videos, newest like first.
pub async fn liked_videos(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(params): Query<PageParams>,
) -> Result<ApiResponse<Page<Value>>, ApiError> {
    let video_join = Lookup::new(Collection::Videos, "video", "id", "video")
        .first()
        .with_pipeline(vec![Stage::Project(Projection::include(&[
            "id",
            "title",
            "thumbnail",
            "duration",
            "views",
            "created_at",
        ]))]);

    let filter = Filter::new()
        .eq("liked_by", json!(current.id))
        .exists("video");

    let req = PageRequest::new(filter)
        .page(params.page(), params.limit())
        .join(video_join)
        .project(Projection::include(&["id", "video", "created_at"]));

    let page = state.db.paginate(Collection::Likes, &req)?;
    Ok(ApiResponse::ok(page, "Liked videos fetched successfully"))
}

use axum::extract::{Path, Query, State};
use serde_json::{Value, json};

use clipstream_db::paginate::PageRequest;
use clipstream_db::{Collection, Filter, Lookup, Projection, Stage};
use clipstream_types::api::ChannelStats;
use clipstream_types::models::User;
use clipstream_types::page::Page;

use crate::error::{ApiError, ApiResponse};
use crate::pagination::PageParams;
use crate::{AppState, parse_id};

/// GET /dashboard/stats/{userId} - video, subscriber and like totals for
/// a channel. The joins produce the arrays; the counting happens here.
pub async fn channel_stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<ApiResponse<ChannelStats>, ApiError> {
    let id = parse_id(&user_id, "user")?;

    let stages = [
        Stage::Match(Filter::new().eq("id", json!(id))),
        Stage::Lookup(Lookup::new(Collection::Videos, "id", "owner", "videos")),
        Stage::Lookup(Lookup::new(
            Collection::Subscriptions,
            "id",
            "channel",
            "subscribers",
        )),
    ];

    let doc = state
        .db
        .aggregate(Collection::Users, &stages)?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    let videos = doc["videos"].as_array().cloned().unwrap_or_default();
    let subscriber_count = doc["subscribers"].as_array().map(Vec::len).unwrap_or(0);

    let video_ids: Vec<Value> = videos
        .iter()
        .filter_map(|v| v.get("id").cloned())
        .collect();
    let like_count = if video_ids.is_empty() {
        0
    } else {
        state
            .db
            .count(Collection::Likes, &Filter::new().is_in("video", video_ids))?
    };

    let user: User = serde_json::from_value(doc)
        .map_err(|e| ApiError::Internal(format!("corrupt account document: {e}")))?;

    Ok(ApiResponse::ok(
        ChannelStats {
            id: user.id,
            username: user.username,
            avatar: user.avatar,
            video_count: videos.len() as u64,
            subscriber_count: subscriber_count as u64,
            like_count,
        },
        "Dashboard stats fetched successfully",
    ))
}

/// GET /dashboard/videos/{userId} - the channel's uploads, newest first.
pub async fn channel_videos(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<ApiResponse<Page<Value>>, ApiError> {
    let id = parse_id(&user_id, "user")?;

    if state.db.get_raw(Collection::Users, &id.to_string())?.is_none() {
        return Err(ApiError::NotFound("User not found".into()));
    }

    let req = PageRequest::new(Filter::new().eq("owner", json!(id)))
        .page(params.page(), params.limit())
        .project(Projection::include(&[
            "id",
            "title",
            "description",
            "thumbnail",
            "duration",
            "views",
            "created_at",
        ]));

    let page = state.db.paginate(Collection::Videos, &req)?;
    Ok(ApiResponse::ok(page, "Channel videos fetched successfully"))
}

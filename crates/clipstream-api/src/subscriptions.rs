use axum::Extension;
use axum::extract::{Path, Query, State};
use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use clipstream_db::paginate::PageRequest;
use clipstream_db::{Collection, Filter, Lookup, Projection, Stage};
use clipstream_types::api::ToggleOutcome;
use clipstream_types::models::{CurrentUser, Subscription};
use clipstream_types::page::Page;

use crate::error::{ApiError, ApiResponse};
use crate::pagination::PageParams;
use crate::{AppState, parse_id};

/// POST /subscriptions/c/{channelId} - flip the caller's subscription to
/// the channel.
pub async fn toggle_subscription(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(channel_id): Path<String>,
) -> Result<ApiResponse<ToggleOutcome>, ApiError> {
    let channel = parse_id(&channel_id, "channel")?;

    let pair = Filter::new()
        .eq("subscriber", json!(current.id))
        .eq("channel", json!(channel));

    let subscription = Subscription {
        id: Uuid::new_v4(),
        subscriber: current.id,
        channel,
        created_at: Utc::now(),
    };
    let doc = serde_json::to_value(&subscription)
        .map_err(|e| ApiError::Internal(format!("subscription serialization failed: {e}")))?;

    let toggled = state.db.toggle(Collection::Subscriptions, &pair, || doc)?;

    Ok(ApiResponse::ok(
        ToggleOutcome { toggled },
        "Subscription toggled successfully",
    ))
}

/// GET /subscriptions/c/{channelId} - who subscribes to this channel.
pub async fn channel_subscribers(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<ApiResponse<Page<Value>>, ApiError> {
    let channel = parse_id(&channel_id, "channel")?;

    let subscriber_join = Lookup::new(Collection::Users, "subscriber", "id", "subscriber")
        .first()
        .with_pipeline(vec![Stage::Project(Projection::include(&[
            "id",
            "username",
            "full_name",
            "avatar",
        ]))]);

    let req = PageRequest::new(Filter::new().eq("channel", json!(channel)))
        .page(params.page(), params.limit())
        .join(subscriber_join)
        .project(Projection::include(&["id", "subscriber", "created_at"]));

    let page = state.db.paginate(Collection::Subscriptions, &req)?;
    Ok(ApiResponse::ok(page, "Subscriber list fetched successfully"))
}

/// GET /subscriptions/u/{subscriberId} - channels this user subscribes to.
pub async fn subscribed_channels(
    State(state): State<AppState>,
    Path(subscriber_id): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<ApiResponse<Page<Value>>, ApiError> {
    let subscriber = parse_id(&subscriber_id, "subscriber")?;

    let channel_join = Lookup::new(Collection::Users, "channel", "id", "channel")
        .first()
        .with_pipeline(vec![Stage::Project(Projection::include(&[
            "id",
            "username",
            "full_name",
            "avatar",
        ]))]);

    let req = PageRequest::new(Filter::new().eq("subscriber", json!(subscriber)))
        .page(params.page(), params.limit())
        .join(channel_join)
        .project(Projection::include(&["id", "channel", "created_at"]));

    let page = state.db.paginate(Collection::Subscriptions, &req)?;
    Ok(ApiResponse::ok(
        page,
        "Subscribed channels fetched successfully",
    ))
}

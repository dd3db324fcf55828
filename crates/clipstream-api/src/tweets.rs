use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use clipstream_db::paginate::PageRequest;
use clipstream_db::{Collection, Filter, Lookup, Projection, Stage};
use clipstream_types::api::TweetRequest;
use clipstream_types::models::{CurrentUser, Tweet};
use clipstream_types::page::Page;

use crate::error::{ApiError, ApiResponse};
use crate::middleware::ensure_owner;
use crate::pagination::PageParams;
use crate::{AppState, parse_id};

fn load_tweet(state: &AppState, id: Uuid) -> Result<Tweet, ApiError> {
    state
        .db
        .get(Collection::Tweets, &id.to_string())?
        .ok_or_else(|| ApiError::NotFound("Tweet not found".into()))
}

/// POST /tweets
pub async fn create_tweet(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<TweetRequest>,
) -> Result<ApiResponse<Tweet>, ApiError> {
    let content = req.content.trim();
    if content.is_empty() {
        return Err(ApiError::BadRequest("Tweet content is missing".into()));
    }

    let now = Utc::now();
    let tweet = Tweet {
        id: Uuid::new_v4(),
        content: content.to_string(),
        owner: current.id,
        created_at: now,
        updated_at: now,
    };
    state.db.insert(Collection::Tweets, &tweet)?;

    Ok(ApiResponse::created(tweet, "Tweet created successfully"))
}

/// GET /tweets/user - the caller's timeline, newest first.
pub async fn user_tweets(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(params): Query<PageParams>,
) -> Result<ApiResponse<Page<Value>>, ApiError> {
    let author_join = Lookup::new(Collection::Users, "owner", "id", "owner")
        .first()
        .with_pipeline(vec![Stage::Project(Projection::include(&[
            "id", "username", "avatar",
        ]))]);

    let req = PageRequest::new(Filter::new().eq("owner", json!(current.id)))
        .page(params.page(), params.limit())
        .join(author_join)
        .project(Projection::include(&[
            "id",
            "content",
            "created_at",
            "updated_at",
            "owner",
        ]));

    let page = state.db.paginate(Collection::Tweets, &req)?;
    Ok(ApiResponse::ok(page, "User tweets fetched successfully"))
}

/// PATCH /tweets/{tweetId}
pub async fn update_tweet(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(tweet_id): Path<String>,
    Json(req): Json<TweetRequest>,
) -> Result<ApiResponse<Tweet>, ApiError> {
    let id = parse_id(&tweet_id, "tweet")?;

    let content = req.content.trim();
    if content.is_empty() {
        return Err(ApiError::BadRequest("Tweet content is missing".into()));
    }

    let mut tweet = load_tweet(&state, id)?;
    ensure_owner(tweet.owner, current.id, "tweet")?;

    tweet.content = content.to_string();
    tweet.updated_at = Utc::now();
    state.db.replace(Collection::Tweets, &tweet)?;

    Ok(ApiResponse::ok(tweet, "Tweet updated successfully"))
}

/// DELETE /tweets/{tweetId}
pub async fn delete_tweet(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(tweet_id): Path<String>,
) -> Result<ApiResponse<Value>, ApiError> {
    let id = parse_id(&tweet_id, "tweet")?;

    let tweet = load_tweet(&state, id)?;
    ensure_owner(tweet.owner, current.id, "tweet")?;

    state.db.remove(Collection::Tweets, &id.to_string())?;

    Ok(ApiResponse::ok(Value::Null, "Tweet deleted successfully"))
}

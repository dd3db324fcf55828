use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, patch, post},
};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use clipstream_api::error::ApiResponse;
use clipstream_api::middleware::require_auth;
use clipstream_api::tokens::{AuthConfig, TokenService};
use clipstream_api::{
    AppState, AppStateInner, comments, dashboard, likes, playlists, subscriptions, tweets, users,
    videos,
};
use clipstream_media::{LocalMediaStore, MediaStore, RemoteMediaHost};

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clipstream=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let host = env_or("CLIPSTREAM_HOST", "0.0.0.0");
    let port: u16 = env_or("CLIPSTREAM_PORT", "3000").parse()?;
    let db_path = env_or("CLIPSTREAM_DB_PATH", "clipstream.db");
    let tmp_dir = PathBuf::from(env_or("CLIPSTREAM_TMP_DIR", "tmp/uploads"));

    // Signing config is built once here and passed down - nothing reads
    // it from the environment after this point.
    let auth = AuthConfig {
        access_secret: env_or("ACCESS_TOKEN_SECRET", "dev-access-secret-change-me"),
        refresh_secret: env_or("REFRESH_TOKEN_SECRET", "dev-refresh-secret-change-me"),
        access_ttl_minutes: env_i64("ACCESS_TOKEN_TTL_MINUTES", 15),
        refresh_ttl_days: env_i64("REFRESH_TOKEN_TTL_DAYS", 10),
    };

    // Init document store
    let db = clipstream_db::Database::open(&PathBuf::from(&db_path))?;

    // Media host: remote when configured, local disk otherwise
    let mut local_media_dir = None;
    let media: Arc<dyn MediaStore> = match std::env::var("MEDIA_HOST_URL") {
        Ok(url) if !url.is_empty() => {
            info!("Using remote media host at {}", url);
            let api_key = env_or("MEDIA_HOST_API_KEY", "");
            Arc::new(RemoteMediaHost::new(url, api_key))
        }
        _ => {
            let dir = PathBuf::from(env_or("CLIPSTREAM_MEDIA_DIR", "media"));
            info!("Using local media store at {}", dir.display());
            local_media_dir = Some(dir.clone());
            Arc::new(LocalMediaStore::new(dir, "/media".into()))
        }
    };

    // Shared state
    let state: AppState = Arc::new(AppStateInner {
        db,
        media,
        tokens: TokenService::new(auth),
        tmp_dir,
    });

    // Routes
    let public_routes = Router::new()
        .route("/api/v1/healthcheck", get(healthcheck))
        .route("/api/v1/users/register", post(users::register))
        .route("/api/v1/users/login", post(users::login))
        .route("/api/v1/users/refresh-token", post(users::refresh))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/v1/users/logout", post(users::logout))
        .route("/api/v1/users/change-password", post(users::change_password))
        .route("/api/v1/users/current-user", get(users::current_user))
        .route("/api/v1/users/update-account", patch(users::update_account))
        .route("/api/v1/users/avatar", patch(users::update_avatar))
        .route("/api/v1/users/cover-image", patch(users::update_cover_image))
        .route("/api/v1/users/c/{username}", get(users::channel_profile))
        .route("/api/v1/users/history", get(users::watch_history))
        .route(
            "/api/v1/videos",
            get(videos::list_videos).post(videos::publish_video),
        )
        .route(
            "/api/v1/videos/{video_id}",
            get(videos::get_video)
                .patch(videos::update_video)
                .delete(videos::delete_video),
        )
        .route(
            "/api/v1/videos/toggle/publish/{video_id}",
            patch(videos::toggle_publish_status),
        )
        .route(
            "/api/v1/comments/{video_id}",
            get(comments::list_comments).post(comments::add_comment),
        )
        .route(
            "/api/v1/comments/c/{comment_id}",
            patch(comments::update_comment).delete(comments::delete_comment),
        )
        .route("/api/v1/likes/toggle/v/{video_id}", post(likes::toggle_video_like))
        .route("/api/v1/likes/toggle/c/{comment_id}", post(likes::toggle_comment_like))
        .route("/api/v1/likes/toggle/t/{tweet_id}", post(likes::toggle_tweet_like))
        .route("/api/v1/likes/videos", get(likes::liked_videos))
        .route(
            "/api/v1/subscriptions/c/{channel_id}",
            post(subscriptions::toggle_subscription).get(subscriptions::channel_subscribers),
        )
        .route(
            "/api/v1/subscriptions/u/{subscriber_id}",
            get(subscriptions::subscribed_channels),
        )
        .route("/api/v1/playlists", post(playlists::create_playlist))
        .route("/api/v1/playlists/user/{user_id}", get(playlists::user_playlists))
        .route(
            "/api/v1/playlists/add/{video_id}/{playlist_id}",
            patch(playlists::add_video_to_playlist),
        )
        .route(
            "/api/v1/playlists/remove/{video_id}/{playlist_id}",
            patch(playlists::remove_video_from_playlist),
        )
        .route(
            "/api/v1/playlists/{playlist_id}",
            get(playlists::get_playlist)
                .patch(playlists::update_playlist)
                .delete(playlists::delete_playlist),
        )
        .route("/api/v1/tweets", post(tweets::create_tweet))
        .route("/api/v1/tweets/user", get(tweets::user_tweets))
        .route(
            "/api/v1/tweets/{tweet_id}",
            patch(tweets::update_tweet).delete(tweets::delete_tweet),
        )
        .route("/api/v1/dashboard/stats/{user_id}", get(dashboard::channel_stats))
        .route("/api/v1/dashboard/videos/{user_id}", get(dashboard::channel_videos))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let mut app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    // The local media store serves its directory directly
    if let Some(dir) = local_media_dir {
        app = app.nest_service("/media", ServeDir::new(dir));
    }

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("clipstream listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn healthcheck() -> ApiResponse<Value> {
    ApiResponse::ok(json!({ "status": "ok" }), "Service is healthy")
}

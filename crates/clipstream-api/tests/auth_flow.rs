//! End-to-end handler tests for the credential lifecycle and the
//! ownership checks, against an in-memory store and a disk media store.

use std::sync::Arc;

use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHasher};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use clipstream_api::error::ApiError;
use clipstream_api::tokens::{AuthConfig, TokenService};
use clipstream_api::{AppState, AppStateInner, likes, users, videos};
use clipstream_db::{Collection, Database, Filter};
use clipstream_media::LocalMediaStore;
use clipstream_types::api::LoginRequest;
use clipstream_types::models::{AssetRef, CurrentUser, User, Video};

fn refresh_body(token: &str) -> Bytes {
    Bytes::from(serde_json::to_vec(&json!({ "refresh_token": token })).unwrap())
}

struct TestEnv {
    state: AppState,
    media_dir: tempfile::TempDir,
    _tmp_dir: tempfile::TempDir,
}

fn test_env() -> TestEnv {
    let media_dir = tempfile::tempdir().unwrap();
    let tmp_dir = tempfile::tempdir().unwrap();

    let state = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        media: Arc::new(LocalMediaStore::new(
            media_dir.path().to_path_buf(),
            "/media".into(),
        )),
        tokens: TokenService::new(AuthConfig {
            access_secret: "test-access-secret".into(),
            refresh_secret: "test-refresh-secret".into(),
            access_ttl_minutes: 15,
            refresh_ttl_days: 10,
        }),
        tmp_dir: tmp_dir.path().to_path_buf(),
    });

    TestEnv {
        state,
        media_dir,
        _tmp_dir: tmp_dir,
    }
}

fn hash(plain: &str) -> String {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .unwrap()
        .to_string()
}

fn seed_user(state: &AppState, username: &str, password: &str) -> User {
    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email: format!("{username}@example.com"),
        full_name: username.to_string(),
        avatar: AssetRef {
            url: "/media/avatar.png".into(),
            public_id: "avatar.png".into(),
        },
        cover_image: None,
        watch_history: Vec::new(),
        password: hash(password),
        refresh_token: None,
        created_at: now,
        updated_at: now,
    };
    state.db.insert(Collection::Users, &user).unwrap();
    user
}

fn as_current(user: &User) -> CurrentUser {
    user.clone().into()
}

fn stored_user(state: &AppState, id: Uuid) -> User {
    state
        .db
        .get(Collection::Users, &id.to_string())
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn login_persists_refresh_token_and_sets_both_carriers() {
    let env = test_env();
    let state = env.state.clone();
    let user = seed_user(&state, "chai", "secret-pass");

    let (jar, _body) = users::login(
        State(state.clone()),
        CookieJar::new(),
        Json(LoginRequest {
            username: Some("chai".into()),
            email: None,
            password: "secret-pass".into(),
        }),
    )
    .await
    .unwrap();

    assert!(jar.get("access_token").is_some());
    let refresh = jar.get("refresh_token").unwrap().value().to_string();

    let stored = stored_user(&state, user.id);
    assert_eq!(stored.refresh_token.as_deref(), Some(refresh.as_str()));
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let env = test_env();
    let state = env.state.clone();
    seed_user(&state, "chai", "secret-pass");

    let err = users::login(
        State(state.clone()),
        CookieJar::new(),
        Json(LoginRequest {
            username: Some("chai".into()),
            email: None,
            password: "wrong".into(),
        }),
    )
    .await
    .err()
    .unwrap();

    assert!(matches!(err, ApiError::Unauthorized(_)));
}

#[tokio::test]
async fn refresh_rotates_and_rejects_the_superseded_token() {
    let env = test_env();
    let state = env.state.clone();
    let user = seed_user(&state, "chai", "secret-pass");

    let (jar, _body) = users::login(
        State(state.clone()),
        CookieJar::new(),
        Json(LoginRequest {
            username: Some("chai".into()),
            email: None,
            password: "secret-pass".into(),
        }),
    )
    .await
    .unwrap();
    let original = jar.get("refresh_token").unwrap().value().to_string();

    // a refresh with the exact persisted token succeeds and rotates it
    users::refresh(State(state.clone()), CookieJar::new(), refresh_body(&original))
        .await
        .unwrap();

    let rotated = stored_user(&state, user.id);
    assert_ne!(rotated.refresh_token.as_deref(), Some(original.as_str()));

    // replaying the superseded token is the reuse case
    let err = users::refresh(State(state.clone()), CookieJar::new(), refresh_body(&original))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ApiError::Unauthorized(_)));
}

#[tokio::test]
async fn refresh_without_any_token_is_unauthorized() {
    let env = test_env();
    let state = env.state.clone();

    let err = users::refresh(State(state), CookieJar::new(), Bytes::new())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ApiError::Unauthorized(_)));
}

#[tokio::test]
async fn logout_clears_the_stored_credential() {
    let env = test_env();
    let state = env.state.clone();
    let mut user = seed_user(&state, "chai", "secret-pass");

    user.refresh_token = Some("some-token".into());
    state.db.replace(Collection::Users, &user).unwrap();

    users::logout(
        State(state.clone()),
        CookieJar::new(),
        Extension(as_current(&user)),
    )
    .await
    .unwrap();

    assert!(stored_user(&state, user.id).refresh_token.is_none());
}

#[tokio::test]
async fn toggle_like_flips_on_each_call() {
    let env = test_env();
    let state = env.state.clone();
    let user = seed_user(&state, "chai", "secret-pass");
    let video_id = Uuid::new_v4();

    let pair = Filter::new()
        .eq("liked_by", json!(user.id))
        .eq("video", json!(video_id));

    for expected in [1, 0, 1] {
        likes::toggle_video_like(
            State(state.clone()),
            Extension(as_current(&user)),
            Path(video_id.to_string()),
        )
        .await
        .unwrap();
        assert_eq!(state.db.count(Collection::Likes, &pair).unwrap(), expected);
    }
}

#[tokio::test]
async fn forbidden_delete_leaves_record_and_assets_untouched() {
    let env = test_env();
    let state = env.state.clone();
    let owner = seed_user(&state, "owner", "secret-pass");
    let mallory = seed_user(&state, "mallory", "secret-pass");

    // put two real assets on the media store
    let spool = tempfile::tempdir().unwrap();
    let video_src = spool.path().join("clip.mp4");
    let thumb_src = spool.path().join("thumb.png");
    tokio::fs::write(&video_src, b"video-bytes").await.unwrap();
    tokio::fs::write(&thumb_src, b"thumb-bytes").await.unwrap();
    let stored_video = state.media.store(&video_src).await.unwrap();
    let stored_thumb = state.media.store(&thumb_src).await.unwrap();

    let now = Utc::now();
    let video = Video {
        id: Uuid::new_v4(),
        owner: owner.id,
        video_file: AssetRef {
            url: stored_video.url.clone(),
            public_id: stored_video.public_id.clone(),
        },
        thumbnail: AssetRef {
            url: stored_thumb.url.clone(),
            public_id: stored_thumb.public_id.clone(),
        },
        title: "mine".into(),
        description: "owner's video".into(),
        duration: 12.0,
        views: 0,
        is_published: true,
        created_at: now,
        updated_at: now,
    };
    state.db.insert(Collection::Videos, &video).unwrap();

    let err = videos::delete_video(
        State(state.clone()),
        Extension(as_current(&mallory)),
        Path(video.id.to_string()),
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(err, ApiError::Forbidden(_)));

    // record and both assets survive the rejected delete
    assert!(
        state
            .db
            .get_raw(Collection::Videos, &video.id.to_string())
            .unwrap()
            .is_some()
    );
    assert!(env.media_dir.path().join(&stored_video.public_id).exists());
    assert!(env.media_dir.path().join(&stored_thumb.public_id).exists());
}

#[tokio::test]
async fn owner_delete_removes_assets_then_record() {
    let env = test_env();
    let state = env.state.clone();
    let owner = seed_user(&state, "owner", "secret-pass");

    let spool = tempfile::tempdir().unwrap();
    let video_src = spool.path().join("clip.mp4");
    let thumb_src = spool.path().join("thumb.png");
    tokio::fs::write(&video_src, b"video-bytes").await.unwrap();
    tokio::fs::write(&thumb_src, b"thumb-bytes").await.unwrap();
    let stored_video = state.media.store(&video_src).await.unwrap();
    let stored_thumb = state.media.store(&thumb_src).await.unwrap();

    let now = Utc::now();
    let video = Video {
        id: Uuid::new_v4(),
        owner: owner.id,
        video_file: AssetRef {
            url: stored_video.url.clone(),
            public_id: stored_video.public_id.clone(),
        },
        thumbnail: AssetRef {
            url: stored_thumb.url.clone(),
            public_id: stored_thumb.public_id.clone(),
        },
        title: "mine".into(),
        description: "owner's video".into(),
        duration: 12.0,
        views: 0,
        is_published: true,
        created_at: now,
        updated_at: now,
    };
    state.db.insert(Collection::Videos, &video).unwrap();

    videos::delete_video(
        State(state.clone()),
        Extension(as_current(&owner)),
        Path(video.id.to_string()),
    )
    .await
    .unwrap();

    assert!(
        state
            .db
            .get_raw(Collection::Videos, &video.id.to_string())
            .unwrap()
            .is_none()
    );
    assert!(!env.media_dir.path().join(&stored_video.public_id).exists());
    assert!(!env.media_dir.path().join(&stored_thumb.public_id).exists());
}

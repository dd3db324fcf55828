use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::{Extension, Json};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::warn;
use uuid::Uuid;

use clipstream_db::{Collection, Filter, Lookup, Projection, Stage};
use clipstream_media::AssetKind;
use clipstream_types::api::{
    AuthPayload, ChangePasswordRequest, ChannelProfile, LoginRequest, RefreshRequest,
    UpdateAccountRequest,
};
use clipstream_types::models::{CurrentUser, User};

use crate::error::{ApiError, ApiResponse};
use crate::tokens::TokenPair;
use crate::upload::UploadForm;
use crate::{AppState, asset_ref, session};

// -- Password hashing (black-box primitive) --

fn hash_password(plain: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))
}

fn verify_password(plain: &str, digest: &str) -> Result<bool, ApiError> {
    let parsed = PasswordHash::new(digest)
        .map_err(|e| ApiError::Internal(format!("stored password digest unreadable: {e}")))?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

fn load_user(state: &AppState, id: Uuid) -> Result<User, ApiError> {
    state
        .db
        .get(Collection::Users, &id.to_string())?
        .ok_or_else(|| ApiError::Unauthorized("Account no longer exists".into()))
}

// -- Handlers --

/// POST /users/register - multipart: full_name, email, username, password,
/// avatar (required file), cover_image (optional file).
pub async fn register(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<ApiResponse<CurrentUser>, ApiError> {
    let mut form = UploadForm::read(
        &mut multipart,
        &state.tmp_dir,
        &["avatar", "cover_image"],
    )
    .await?;

    // Any early return below drops the TempUpload guards, which removes
    // the spooled files before the error leaves the handler.
    let full_name = form.required_text("full_name")?;
    let email = form.required_text("email")?.to_lowercase();
    let username = form.required_text("username")?.to_lowercase();
    let password = form.required_text("password")?;

    let existing_username: Option<User> = state
        .db
        .find_one(Collection::Users, &Filter::new().eq("username", json!(username)))?;
    let existing_email: Option<User> = state
        .db
        .find_one(Collection::Users, &Filter::new().eq("email", json!(email)))?;
    if existing_username.is_some() || existing_email.is_some() {
        return Err(ApiError::Conflict(
            "User with this email or username already exists".into(),
        ));
    }

    let avatar = form
        .take_file("avatar")
        .ok_or_else(|| ApiError::BadRequest("Avatar file is required".into()))?;

    let stored_avatar = state.media.store(avatar.path()).await?;
    let stored_cover = match form.take_file("cover_image") {
        Some(cover) => Some(state.media.store(cover.path()).await?),
        None => None,
    };

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        username,
        email,
        full_name,
        avatar: asset_ref(&stored_avatar),
        cover_image: stored_cover.as_ref().map(asset_ref),
        watch_history: Vec::new(),
        password: hash_password(&password)?,
        refresh_token: None,
        created_at: now,
        updated_at: now,
    };

    // The unique indexes catch the race two concurrent registrations run
    // past the find_one checks above.
    state.db.insert(Collection::Users, &user).map_err(|e| {
        if e.is_duplicate() {
            ApiError::Conflict("User with this email or username already exists".into())
        } else {
            ApiError::from(e)
        }
    })?;

    Ok(ApiResponse::created(
        user.into(),
        "User registered successfully",
    ))
}

/// POST /users/login - username or email plus password; on success both
/// tokens are set as carriers and echoed in the body.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, ApiResponse<AuthPayload>), ApiError> {
    let filter = if let Some(username) = req.username.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Filter::new().eq("username", json!(username.to_lowercase()))
    } else if let Some(email) = req.email.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Filter::new().eq("email", json!(email.to_lowercase()))
    } else {
        return Err(ApiError::BadRequest("username or email is required".into()));
    };

    let mut user: User = state
        .db
        .find_one(Collection::Users, &filter)?
        .ok_or_else(|| ApiError::NotFound("User does not exist".into()))?;

    if !verify_password(&req.password, &user.password)? {
        return Err(ApiError::Unauthorized("Invalid user credentials".into()));
    }

    let pair = state.tokens.rotate(&state.db, &mut user)?;
    let jar = session::set_session(jar, &pair);

    Ok((
        jar,
        ApiResponse::ok(
            AuthPayload {
                user: user.into(),
                access_token: pair.access_token,
                refresh_token: pair.refresh_token,
            },
            "User logged in successfully",
        ),
    ))
}

/// POST /users/logout - clear the stored refresh token and both carriers.
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    Extension(current): Extension<CurrentUser>,
) -> Result<(CookieJar, ApiResponse<Value>), ApiError> {
    let mut user = load_user(&state, current.id)?;
    user.refresh_token = None;
    state.db.replace(Collection::Users, &user)?;

    let jar = session::clear_session(jar);
    Ok((jar, ApiResponse::ok(json!({}), "User logged out")))
}

/// POST /users/refresh-token - exchange the long-lived token for a fresh
/// pair. The equality check against the stored value is the reuse
/// detector: a rotated-away token no longer matches.
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, ApiResponse<TokenPair>), ApiError> {
    // Carrier-only clients send no body at all.
    let body: RefreshRequest = serde_json::from_slice(&body).unwrap_or_default();
    let presented = session::presented_refresh_token(&jar, &body)
        .ok_or_else(|| ApiError::Unauthorized("Unauthorized request".into()))?;

    let claims = state
        .tokens
        .verify_refresh(&presented)
        .map_err(|_| ApiError::Unauthorized("Invalid refresh token".into()))?;

    let mut user: User = state
        .db
        .get(Collection::Users, &claims.sub.to_string())?
        .ok_or_else(|| ApiError::Unauthorized("Invalid refresh token".into()))?;

    if user.refresh_token.as_deref() != Some(presented.as_str()) {
        return Err(ApiError::Unauthorized(
            "Refresh token is expired or used".into(),
        ));
    }

    let pair = state.tokens.rotate(&state.db, &mut user)?;
    let jar = session::set_session(jar, &pair);

    Ok((jar, ApiResponse::ok(pair, "Access token refreshed")))
}

/// POST /users/change-password
pub async fn change_password(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<ApiResponse<Value>, ApiError> {
    if req.old_password.is_empty() || req.new_password.is_empty() {
        return Err(ApiError::BadRequest(
            "Both old and new password are required".into(),
        ));
    }

    let mut user = load_user(&state, current.id)?;
    if !verify_password(&req.old_password, &user.password)? {
        return Err(ApiError::BadRequest("Invalid password".into()));
    }

    user.password = hash_password(&req.new_password)?;
    user.updated_at = Utc::now();
    state.db.replace(Collection::Users, &user)?;

    Ok(ApiResponse::ok(json!({}), "Password changed successfully"))
}

/// GET /users/current-user
pub async fn current_user(
    Extension(current): Extension<CurrentUser>,
) -> Result<ApiResponse<CurrentUser>, ApiError> {
    Ok(ApiResponse::ok(
        current,
        "Current user fetched successfully",
    ))
}

/// PATCH /users/update-account - full name and/or email.
pub async fn update_account(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<UpdateAccountRequest>,
) -> Result<ApiResponse<CurrentUser>, ApiError> {
    let full_name = req.full_name.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let email = req.email.as_deref().map(str::trim).filter(|s| !s.is_empty());
    if full_name.is_none() && email.is_none() {
        return Err(ApiError::BadRequest(
            "At least one of full_name or email is required".into(),
        ));
    }

    let mut user = load_user(&state, current.id)?;
    if let Some(full_name) = full_name {
        user.full_name = full_name.to_string();
    }
    if let Some(email) = email {
        user.email = email.to_lowercase();
    }
    user.updated_at = Utc::now();

    state.db.replace(Collection::Users, &user).map_err(|e| {
        if e.is_duplicate() {
            ApiError::Conflict("Email already in use".into())
        } else {
            ApiError::from(e)
        }
    })?;

    Ok(ApiResponse::ok(
        user.into(),
        "Account details updated successfully",
    ))
}

/// PATCH /users/avatar - multipart with a single `avatar` file.
pub async fn update_avatar(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<ApiResponse<CurrentUser>, ApiError> {
    let mut form = UploadForm::read(&mut multipart, &state.tmp_dir, &["avatar"]).await?;
    let upload = form
        .take_file("avatar")
        .ok_or_else(|| ApiError::BadRequest("Avatar file is missing".into()))?;

    let stored = state.media.store(upload.path()).await?;

    let mut user = load_user(&state, current.id)?;
    let old = std::mem::replace(&mut user.avatar, asset_ref(&stored));
    user.updated_at = Utc::now();
    state.db.replace(Collection::Users, &user)?;

    // The record already points at the new asset; a failed cleanup of the
    // old one surfaces as a dependency failure rather than silently
    // leaking the asset.
    if let Err(e) = state.media.remove(&old.public_id, AssetKind::Image).await {
        warn!("Failed to delete old avatar {}: {}", old.public_id, e);
        return Err(ApiError::Dependency(
            "Failed to delete the old avatar from the media host".into(),
        ));
    }

    Ok(ApiResponse::ok(
        user.into(),
        "Avatar image updated successfully",
    ))
}

/// PATCH /users/cover-image - multipart with a single `cover_image` file.
pub async fn update_cover_image(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<ApiResponse<CurrentUser>, ApiError> {
    let mut form = UploadForm::read(&mut multipart, &state.tmp_dir, &["cover_image"]).await?;
    let upload = form
        .take_file("cover_image")
        .ok_or_else(|| ApiError::BadRequest("Cover image file is missing".into()))?;

    let stored = state.media.store(upload.path()).await?;

    let mut user = load_user(&state, current.id)?;
    let old = user.cover_image.replace(asset_ref(&stored));
    user.updated_at = Utc::now();
    state.db.replace(Collection::Users, &user)?;

    if let Some(old) = old {
        if let Err(e) = state.media.remove(&old.public_id, AssetKind::Image).await {
            warn!("Failed to delete old cover image {}: {}", old.public_id, e);
            return Err(ApiError::Dependency(
                "Failed to delete the old cover image from the media host".into(),
            ));
        }
    }

    Ok(ApiResponse::ok(
        user.into(),
        "Cover image updated successfully",
    ))
}

/// GET /users/c/{username} - channel profile with subscriber counts and
/// whether the caller subscribes. The two lookups produce the joined
/// arrays; the scalar derivation happens here rather than in the
/// pipeline.
pub async fn channel_profile(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(username): Path<String>,
) -> Result<ApiResponse<ChannelProfile>, ApiError> {
    let username = username.trim().to_lowercase();
    if username.is_empty() {
        return Err(ApiError::BadRequest("Username is missing".into()));
    }

    let stages = [
        Stage::Match(Filter::new().eq("username", json!(username))),
        Stage::Lookup(Lookup::new(
            Collection::Subscriptions,
            "id",
            "channel",
            "subscribers",
        )),
        Stage::Lookup(Lookup::new(
            Collection::Subscriptions,
            "id",
            "subscriber",
            "subscribed_to",
        )),
    ];

    let doc = state
        .db
        .aggregate(Collection::Users, &stages)?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::NotFound("Channel does not exist".into()))?;

    let caller = current.id.to_string();
    let subscribers = doc["subscribers"].as_array().cloned().unwrap_or_default();
    let subscribed_to = doc["subscribed_to"].as_array().map(Vec::len).unwrap_or(0);
    let is_subscribed = subscribers
        .iter()
        .any(|s| s["subscriber"].as_str() == Some(caller.as_str()));

    let user: User = serde_json::from_value(doc)
        .map_err(|e| ApiError::Internal(format!("corrupt account document: {e}")))?;

    Ok(ApiResponse::ok(
        ChannelProfile {
            id: user.id,
            username: user.username,
            full_name: user.full_name,
            email: user.email,
            avatar: user.avatar,
            cover_image: user.cover_image,
            subscribers_count: subscribers.len() as u64,
            channels_subscribed_to_count: subscribed_to as u64,
            is_subscribed,
        },
        "User channel fetched successfully",
    ))
}

/// GET /users/history - the caller's watch history, each video joined
/// with its owner collapsed to a single projected object.
pub async fn watch_history(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<ApiResponse<Value>, ApiError> {
    let owner_join = Lookup::new(Collection::Users, "owner", "id", "owner")
        .first()
        .with_pipeline(vec![Stage::Project(Projection::include(&[
            "id",
            "username",
            "full_name",
            "avatar",
        ]))]);

    let history_join = Lookup::new(Collection::Videos, "watch_history", "id", "watch_history")
        .with_pipeline(vec![
            Stage::Lookup(owner_join),
            Stage::Project(Projection::include(&[
                "id",
                "title",
                "description",
                "thumbnail",
                "duration",
                "views",
                "created_at",
                "owner",
            ])),
        ]);

    let stages = [
        Stage::Match(Filter::new().eq("id", json!(current.id))),
        Stage::Lookup(history_join),
    ];

    let doc = state
        .db
        .aggregate(Collection::Users, &stages)?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::Unauthorized("Account no longer exists".into()))?;

    let history = doc
        .get("watch_history")
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));

    Ok(ApiResponse::ok(
        history,
        "Watch history fetched successfully",
    ))
}

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;

use clipstream_db::Collection;
use clipstream_types::models::CurrentUser;

use crate::error::ApiError;
use crate::{AppState, session};

/// Access guard for every identity-scoped route: extract the short-lived
/// token from its carrier or the Authorization header, verify it, resolve
/// the account (credential fields stripped) and attach it to the request.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = jar
        .get(session::ACCESS_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| bearer_token(&req));

    let token = token.ok_or_else(|| ApiError::Unauthorized("Missing access token".into()))?;

    let claims = state.tokens.verify_access(&token).map_err(|e| {
        debug!("Access token rejected: {}", e);
        ApiError::Unauthorized("Invalid access token".into())
    })?;

    let mut doc = state
        .db
        .get_raw(Collection::Users, &claims.sub.to_string())?
        .ok_or_else(|| ApiError::Unauthorized("Invalid access token".into()))?;

    // The credential fields never travel past the guard.
    if let Some(obj) = doc.as_object_mut() {
        obj.remove("password");
        obj.remove("refresh_token");
    }
    let user: CurrentUser = serde_json::from_value::<CurrentUser>(doc)
        .map_err(|e| ApiError::Internal(format!("corrupt account document: {e}")))?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

fn bearer_token(req: &Request) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Shared owner-equality check for owned-content mutation: the caller
/// must be the stored owner, otherwise Forbidden.
pub fn ensure_owner(owner: uuid::Uuid, caller: uuid::Uuid, what: &str) -> Result<(), ApiError> {
    if owner == caller {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "You are not allowed to modify this {what}"
        )))
    }
}

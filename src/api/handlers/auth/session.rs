//! Session lifecycle endpoints: login, token refresh, logout, and Owner
//! impersonation.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info};

use super::guard::authorize;
use super::password::verify_password;
use super::role::Role;
use super::state::AuthState;
use super::storage::{
    IdentityRecord, ProfileRecord, delete_session, find_session_for_rotation, insert_session,
    lookup_identity, lookup_profile, record_login_time, rotate_session,
};
use super::sweeper::SweepScheduler;
use super::token::{generate_refresh_secret, issue};
use super::types::{
    LoginRequest, LoginResponse, LogoutRequest, MessageResponse, RefreshRequest, RefreshResponse,
    SignInAsRequest,
};
use super::utils::{extract_client_ip, extract_user_agent, hash_token, now};

/// Authenticate credentials and issue a new session.
///
/// The response never distinguishes an unknown identity from a wrong
/// password, and disabled or suspended identities fail the same way.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued", body = LoginResponse),
        (status = 400, description = "Missing fields"),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Store failure")
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    sweeper: Extension<Arc<SweepScheduler>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    // Request hook for background cleanup; returns immediately.
    sweeper.trigger(&pool);

    let Some(Json(request)) = payload else {
        return missing_fields();
    };
    let user_id = request.user_id.trim();
    if user_id.is_empty() || request.password.is_empty() {
        return missing_fields();
    }

    let identity = match lookup_identity(&pool, user_id).await {
        Ok(Some(identity)) => identity,
        Ok(None) => return invalid_credentials(),
        Err(err) => {
            error!("failed to lookup identity: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if !credentials_usable(&identity) {
        return invalid_credentials();
    }

    match verify_password(&request.password, &identity.password_hash) {
        Ok(true) => {}
        Ok(false) => return invalid_credentials(),
        Err(err) => {
            error!("password verification failed: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let profile = match lookup_profile(&pool, &identity.user_id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            // No profile means no role binding; such a token could never
            // pass the guard.
            return invalid_credentials();
        }
        Err(err) => {
            error!("failed to lookup profile: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let issued = match issue_session(&pool, &auth_state, &identity.user_id, &headers).await {
        Ok(issued) => issued,
        Err(err) => {
            error!("failed to issue session: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if let Err(err) = record_login_time(&pool, &identity.user_id).await {
        // Login stands even when the bookkeeping write fails.
        error!("failed to record login time: {err}");
    }

    info!(user_id = %identity.user_id, "login succeeded");
    (
        StatusCode::OK,
        Json(login_response(&identity.user_id, &profile, &issued)),
    )
        .into_response()
}

/// Rotate the bearer token of an existing session in place.
///
/// The refresh secret and its window stay untouched; only the bearer token
/// and its mirrored expiry change.
#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token rotated", body = RefreshResponse),
        (status = 400, description = "Missing fields"),
        (status = 401, description = "Refresh window expired"),
        (status = 404, description = "Session not found"),
        (status = 500, description = "Store failure")
    ),
    tag = "auth"
)]
pub async fn refresh(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    sweeper: Extension<Arc<SweepScheduler>>,
    payload: Option<Json<RefreshRequest>>,
) -> Response {
    sweeper.trigger(&pool);

    let Some(Json(request)) = payload else {
        return missing_fields();
    };
    let user_id = request.user_id.trim();
    if user_id.is_empty() || request.token.is_empty() || request.refresh_token.is_empty() {
        return missing_fields();
    }

    let token_hash = hash_token(&request.token);
    let refresh_hash = hash_token(&request.refresh_token);
    let session = match find_session_for_rotation(&pool, user_id, &token_hash, &refresh_hash).await
    {
        Ok(Some(session)) => session,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(MessageResponse {
                    message: "Session not found".to_string(),
                }),
            )
                .into_response();
        }
        Err(err) => {
            error!("failed to lookup session for rotation: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if refresh_window_closed(session.expires_at, now()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(MessageResponse {
                message: "Refresh window expired".to_string(),
            }),
        )
            .into_response();
    }

    let ttl = auth_state.config().token_ttl_seconds();
    let (token, expires_at) = match issue(auth_state.signing_key(), &session.user_id, ttl) {
        Ok(minted) => minted,
        Err(err) => {
            error!("failed to mint rotated token: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if let Err(err) = rotate_session(&pool, session.id, &hash_token(&token), expires_at).await {
        error!("failed to rotate session: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    info!(user_id = %session.user_id, "session rotated");
    (
        StatusCode::OK,
        Json(RefreshResponse {
            token,
            expires_at: expires_at.to_rfc3339(),
        }),
    )
        .into_response()
}

/// Revoke a session. Revocation is physical deletion, so the token is
/// rejected on the very next request regardless of its signature.
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Session revoked", body = MessageResponse),
        (status = 400, description = "Missing fields"),
        (status = 404, description = "Session not found"),
        (status = 500, description = "Store failure")
    ),
    tag = "auth"
)]
pub async fn logout(pool: Extension<PgPool>, payload: Option<Json<LogoutRequest>>) -> Response {
    let Some(Json(request)) = payload else {
        return missing_fields();
    };
    let user_id = request.user_id.trim();
    if user_id.is_empty() || request.token.is_empty() {
        return missing_fields();
    }

    match delete_session(&pool, user_id, &hash_token(&request.token)).await {
        Ok(true) => {
            info!(user_id, "logout succeeded");
            (
                StatusCode::OK,
                Json(MessageResponse {
                    message: "Logged out".to_string(),
                }),
            )
                .into_response()
        }
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(MessageResponse {
                message: "Session not found".to_string(),
            }),
        )
            .into_response(),
        Err(err) => {
            error!("failed to delete session: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Owner impersonation: issue a session for the target identity and retire
/// the owner's own session in the same flow.
#[utoipa::path(
    post,
    path = "/v1/auth/sign-in-as",
    request_body = SignInAsRequest,
    responses(
        (status = 200, description = "Session issued for the target identity", body = LoginResponse),
        (status = 400, description = "Missing fields"),
        (status = 401, description = "Invalid or expired token"),
        (status = 403, description = "Caller is not an Owner"),
        (status = 404, description = "Target identity not found"),
        (status = 500, description = "Store failure")
    ),
    tag = "auth"
)]
pub async fn sign_in_as(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    sweeper: Extension<Arc<SweepScheduler>>,
    payload: Option<Json<SignInAsRequest>>,
) -> Response {
    sweeper.trigger(&pool);

    let Some(Json(request)) = payload else {
        return missing_fields();
    };

    let caller = match authorize(
        &pool,
        Some(&request.user_id),
        Some(&request.token),
        Some(&request.role),
    )
    .await
    {
        Ok(caller) => caller,
        Err(denied) => return denied.into_response(),
    };

    // The guard proves claim consistency; impersonation additionally
    // requires the Owner position itself.
    if caller.role != Role::Owner {
        return (
            StatusCode::FORBIDDEN,
            Json(MessageResponse {
                message: "Owner access required".to_string(),
            }),
        )
            .into_response();
    }

    let target = request.sign_in_as.trim();
    if target.is_empty() {
        return missing_fields();
    }

    let (target_identity, target_profile) = match target_with_profile(&pool, target).await {
        Ok(Some(found)) => found,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(MessageResponse {
                    message: "User not found".to_string(),
                }),
            )
                .into_response();
        }
        Err(err) => {
            error!("failed to lookup impersonation target: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let issued = match issue_session(&pool, &auth_state, &target_identity.user_id, &headers).await {
        Ok(issued) => issued,
        Err(err) => {
            error!("failed to issue impersonation session: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // Retire the owner's session so exactly one credential stays live.
    match delete_session(&pool, &caller.user_id, &hash_token(&request.token)).await {
        Ok(_) => {}
        Err(err) => error!("failed to retire owner session: {err}"),
    }

    info!(owner = %caller.user_id, target = %target_identity.user_id, "impersonation session issued");
    (
        StatusCode::OK,
        Json(login_response(
            &target_identity.user_id,
            &target_profile,
            &issued,
        )),
    )
        .into_response()
}

/// A freshly minted credential pair with its mirrored expiry.
struct IssuedSession {
    token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

/// Mint a token + refresh secret and record the session row.
async fn issue_session(
    pool: &PgPool,
    auth_state: &AuthState,
    user_id: &str,
    headers: &HeaderMap,
) -> anyhow::Result<IssuedSession> {
    let ttl = auth_state.config().token_ttl_seconds();
    let (token, expires_at) = issue(auth_state.signing_key(), user_id, ttl)?;
    let refresh_token = generate_refresh_secret()?;

    let ip_address = extract_client_ip(headers);
    let user_agent = extract_user_agent(headers);

    insert_session(
        pool,
        user_id,
        &hash_token(&token),
        Some(&hash_token(&refresh_token)),
        ip_address.as_deref(),
        user_agent.as_deref(),
        Some(expires_at),
    )
    .await?;

    Ok(IssuedSession {
        token,
        refresh_token,
        expires_at,
    })
}

async fn target_with_profile(
    pool: &PgPool,
    user_id: &str,
) -> anyhow::Result<Option<(IdentityRecord, ProfileRecord)>> {
    let Some(identity) = lookup_identity(pool, user_id).await? else {
        return Ok(None);
    };
    let Some(profile) = lookup_profile(pool, user_id).await? else {
        return Ok(None);
    };
    Ok(Some((identity, profile)))
}

fn login_response(user_id: &str, profile: &ProfileRecord, issued: &IssuedSession) -> LoginResponse {
    LoginResponse {
        message: "Login successful".to_string(),
        token: issued.token.clone(),
        refresh_token: issued.refresh_token.clone(),
        user_id: user_id.to_string(),
        fullname: profile.fullname.clone(),
        email: profile.email.clone(),
        position: profile.position.clone(),
        expires_at: issued.expires_at.to_rfc3339(),
    }
}

/// A NULL expiry means the token is self-expiring; rotation stays allowed.
fn refresh_window_closed(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires_at.is_some_and(|expires_at| expires_at < now)
}

fn credentials_usable(identity: &IdentityRecord) -> bool {
    identity.is_active && !identity.is_suspended
}

fn invalid_credentials() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(MessageResponse {
            message: "Invalid ID or Password".to_string(),
        }),
    )
        .into_response()
}

fn missing_fields() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(MessageResponse {
            message: "Missing fields".to_string(),
        }),
    )
        .into_response()
}

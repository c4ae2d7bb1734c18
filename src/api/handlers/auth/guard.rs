//! Access guard for role-scoped operations.
//!
//! Every privileged route presents a (user id, token, claimed role) triple.
//! The guard resolves the token against the session ledger, re-checks expiry
//! against the clock (stale rows stay in the ledger until the sweeper runs,
//! so presence alone proves nothing), and compares the claimed role with the
//! identity's stored binding. It performs no mutation.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::PgPool;
use tracing::error;

use super::role::Role;
use super::storage::{SessionRecord, find_session, lookup_role};
use super::utils::{hash_token, now};

/// Why a request was denied.
#[derive(Debug)]
pub enum AccessDenied {
    /// One of user id, token, or claimed role was absent or empty.
    MissingCredentials,
    /// No ledger row matches the presented token.
    InvalidToken,
    /// The session exists but its expiry has passed.
    TokenExpired,
    /// No role binding exists for the identity.
    IdentityNotFound,
    /// The claimed role differs from the stored binding; carries the true
    /// role so an already-authenticated client can correct itself.
    RoleMismatch { actual: Role },
    /// Store failure; details are logged server-side only.
    Internal,
}

/// Authenticated context handed to the protected operation.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub role: Role,
}

/// Authorize a (user id, token, claimed role) triple.
///
/// # Errors
/// Returns [`AccessDenied`] describing the first failed check.
pub async fn authorize(
    pool: &PgPool,
    user_id: Option<&str>,
    token: Option<&str>,
    claimed_role: Option<&str>,
) -> Result<AuthenticatedUser, AccessDenied> {
    let (user_id, token, claimed_role) = match (
        non_empty(user_id),
        non_empty(token),
        non_empty(claimed_role),
    ) {
        (Some(user_id), Some(token), Some(claimed_role)) => (user_id, token, claimed_role),
        _ => return Err(AccessDenied::MissingCredentials),
    };

    let token_hash = hash_token(token);
    let session = find_session(pool, user_id, &token_hash)
        .await
        .map_err(|err| {
            error!("failed to lookup session: {err}");
            AccessDenied::Internal
        })?;
    let Some(session) = session else {
        return Err(AccessDenied::InvalidToken);
    };

    check_session_expiry(&session, now())?;

    let actual = lookup_role(pool, user_id).await.map_err(|err| {
        error!("failed to lookup role binding: {err}");
        AccessDenied::Internal
    })?;
    let Some(actual) = actual else {
        return Err(AccessDenied::IdentityNotFound);
    };

    check_role(actual, Role::parse(claimed_role))?;

    Ok(AuthenticatedUser {
        user_id: session.user_id,
        role: actual,
    })
}

/// Expiry check independent of the sweeper: a row past its expiry is
/// rejected even though it has not been deleted yet.
fn check_session_expiry(session: &SessionRecord, now: DateTime<Utc>) -> Result<(), AccessDenied> {
    match session.expires_at {
        Some(expires_at) if expires_at < now => Err(AccessDenied::TokenExpired),
        _ => Ok(()),
    }
}

/// Compare the stored binding with the claimed role. An unparseable claim
/// fails exactly like a legitimate mismatch.
fn check_role(actual: Role, claimed: Option<Role>) -> Result<(), AccessDenied> {
    match claimed {
        Some(claimed) if claimed == actual => Ok(()),
        _ => Err(AccessDenied::RoleMismatch { actual }),
    }
}

impl IntoResponse for AccessDenied {
    fn into_response(self) -> Response {
        match self {
            Self::MissingCredentials => (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Missing token, user_id, or role"})),
            )
                .into_response(),
            Self::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "Invalid token"})),
            )
                .into_response(),
            Self::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "Token expired"})),
            )
                .into_response(),
            Self::IdentityNotFound => (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "User not found"})),
            )
                .into_response(),
            Self::RoleMismatch { actual } => (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "error": "Role mismatch",
                    "correct_position": actual.as_str(),
                })),
            )
                .into_response(),
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub user_id: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub refresh_token: String,
    pub user_id: String,
    pub fullname: Option<String>,
    pub email: Option<String>,
    pub position: String,
    /// RFC 3339 expiry timestamp, mirrored from the signed token.
    pub expires_at: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshRequest {
    pub user_id: String,
    pub token: String,
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshResponse {
    pub token: String,
    pub expires_at: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LogoutRequest {
    pub user_id: String,
    pub token: String,
}

/// Owner impersonation: the guard triple plus the target identity.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignInAsRequest {
    pub user_id: String,
    pub token: String,
    pub role: String,
    pub sign_in_as: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct OtpRequest {
    /// User id or email address the code is scoped to.
    pub subject: String,
    /// Purpose tag, e.g. "LOGIN" or "INTERN_APPLY".
    pub purpose: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct OtpVerifyRequest {
    pub subject: String,
    pub code: String,
    pub purpose: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

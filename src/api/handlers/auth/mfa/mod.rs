//! One-time code (OTP) issuance and verification.
//!
//! Flow Overview:
//! 1) A caller requests a code for a (subject, purpose) pair; any previous
//!    unverified code for the pair is invalidated.
//! 2) The code travels out-of-band through the [`Notifier`]; it is never
//!    echoed back in the issuance response, so a caller other than the
//!    legitimate subject learns nothing.
//! 3) Verification consumes the code: a second attempt with the same code
//!    is rejected as invalid.
//!
//! Subjects are either an email address or a user id; user ids are resolved
//! to the profile's email for delivery.

pub(crate) mod storage;

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Duration;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::api::notify::Notifier;

use super::state::AuthState;
use super::storage::lookup_profile;
use super::types::{MessageResponse, OtpRequest, OtpVerifyRequest};
use super::utils::{generate_otp, normalize_email, now, valid_email};
use self::storage::{VerifyOutcome, create_entry, verify_code};

const DEFAULT_OTP_LENGTH: usize = 6;
const DEFAULT_OTP_TTL_MINUTES: i64 = 5;

/// OTP configuration loaded at startup.
#[derive(Clone, Debug)]
pub struct MfaConfig {
    otp_length: usize,
    otp_ttl_minutes: i64,
}

impl MfaConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            otp_length: DEFAULT_OTP_LENGTH,
            otp_ttl_minutes: DEFAULT_OTP_TTL_MINUTES,
        }
    }

    #[must_use]
    pub fn with_otp_length(mut self, length: usize) -> Self {
        self.otp_length = length.clamp(4, 10);
        self
    }

    #[must_use]
    pub fn with_otp_ttl_minutes(mut self, minutes: i64) -> Self {
        self.otp_ttl_minutes = minutes.max(1);
        self
    }

    #[must_use]
    pub fn otp_length(&self) -> usize {
        self.otp_length
    }

    #[must_use]
    pub fn otp_ttl_minutes(&self) -> i64 {
        self.otp_ttl_minutes
    }
}

impl Default for MfaConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Issue a fresh code for (subject, purpose) and hand it to the notifier.
///
/// The response is deliberately uniform: it never reveals whether the
/// subject exists, and never contains the code.
#[utoipa::path(
    post,
    path = "/v1/auth/otp/request",
    request_body = OtpRequest,
    responses(
        (status = 202, description = "Code queued for out-of-band delivery", body = MessageResponse),
        (status = 400, description = "Missing subject or purpose"),
        (status = 500, description = "Store failure")
    ),
    tag = "mfa"
)]
pub async fn request_otp(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    notifier: Extension<Arc<dyn Notifier>>,
    payload: Option<Json<OtpRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return missing_fields();
    };
    let subject = request.subject.trim();
    let purpose = request.purpose.trim();
    if subject.is_empty() || purpose.is_empty() {
        return missing_fields();
    }

    let config = auth_state.mfa();
    let code = generate_otp(config.otp_length());
    let expires_at = now() + Duration::minutes(config.otp_ttl_minutes());

    if let Err(err) = create_entry(&pool, subject, purpose, &code, expires_at).await {
        error!("failed to store otp entry: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    // Delivery is best-effort and must never change the response shape.
    match resolve_recipient(&pool, subject).await {
        Some(recipient) => {
            let body = format!(
                "Your one-time code for {purpose} is {code}. \
                 It expires in {} minutes. Do not share it with anyone.",
                config.otp_ttl_minutes()
            );
            if let Err(err) = notifier.notify(&recipient, &format!("OTP for {purpose}"), &body) {
                warn!("otp delivery failed: {err}");
            }
        }
        None => warn!(subject, "no delivery address for otp subject"),
    }

    info!(purpose, "otp issued");
    (
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: "If the subject exists, a code has been sent".to_string(),
        }),
    )
        .into_response()
}

/// Verify and consume a code.
#[utoipa::path(
    post,
    path = "/v1/auth/otp/verify",
    request_body = OtpVerifyRequest,
    responses(
        (status = 200, description = "Code verified", body = MessageResponse),
        (status = 400, description = "Missing fields, invalid code, or expired code"),
        (status = 500, description = "Store failure")
    ),
    tag = "mfa"
)]
pub async fn verify_otp(
    pool: Extension<PgPool>,
    payload: Option<Json<OtpVerifyRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return missing_fields();
    };
    let subject = request.subject.trim();
    let code = request.code.trim();
    let purpose = request.purpose.trim();
    if subject.is_empty() || code.is_empty() || purpose.is_empty() {
        return missing_fields();
    }

    match verify_code(&pool, subject, code, purpose, now()).await {
        Ok(VerifyOutcome::Verified) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: "OTP verified successfully".to_string(),
            }),
        )
            .into_response(),
        Ok(VerifyOutcome::Invalid) => (
            StatusCode::BAD_REQUEST,
            Json(MessageResponse {
                message: "Invalid or expired OTP".to_string(),
            }),
        )
            .into_response(),
        Ok(VerifyOutcome::Expired) => (
            StatusCode::BAD_REQUEST,
            Json(MessageResponse {
                message: "OTP has expired".to_string(),
            }),
        )
            .into_response(),
        Err(err) => {
            error!("failed to verify otp: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Map a subject to a delivery address: emails are used directly, user ids
/// go through the profile's email.
async fn resolve_recipient(pool: &PgPool, subject: &str) -> Option<String> {
    let normalized = normalize_email(subject);
    if valid_email(&normalized) {
        return Some(normalized);
    }
    match lookup_profile(pool, subject).await {
        Ok(profile) => profile.and_then(|profile| profile.email),
        Err(err) => {
            error!("failed to resolve otp recipient: {err}");
            None
        }
    }
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

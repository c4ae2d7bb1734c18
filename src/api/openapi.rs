//! OpenAPI document assembly.
//!
//! Routes annotate themselves with `#[utoipa::path]`; this module collects
//! them into one spec served at `/v1/openapi.json` and printed by the
//! `openapi` binary for CI diffs.

use utoipa::OpenApi;

use crate::api::handlers::{auth, health};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Praktiko API",
        description = "Session and credential management for the Praktiko internship platform"
    ),
    paths(
        health::health,
        auth::session::login,
        auth::session::refresh,
        auth::session::logout,
        auth::session::sign_in_as,
        auth::mfa::request_otp,
        auth::mfa::verify_otp,
    ),
    components(schemas(
        health::Health,
        auth::role::Role,
        auth::types::LoginRequest,
        auth::types::LoginResponse,
        auth::types::RefreshRequest,
        auth::types::RefreshResponse,
        auth::types::LogoutRequest,
        auth::types::SignInAsRequest,
        auth::types::OtpRequest,
        auth::types::OtpVerifyRequest,
        auth::types::MessageResponse,
    )),
    tags(
        (name = "auth", description = "Session lifecycle and access control"),
        (name = "mfa", description = "One-time codes"),
        (name = "health", description = "Service health")
    )
)]
struct ApiDoc;

/// Build the OpenAPI document for this service.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

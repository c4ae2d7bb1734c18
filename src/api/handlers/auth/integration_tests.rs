//! Database-backed lifecycle tests.
//!
//! These run against a disposable PostgreSQL instance; set
//! `PRAKTIKO_TEST_DSN` and run with `cargo test -- --ignored`.
//! The tests share one database, so they serialize on [`DB_LOCK`].

use anyhow::{Context, Result};
use axum::{Json, extract::Extension, http::HeaderMap, http::StatusCode};
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use super::guard::{AccessDenied, authorize};
use super::mfa::storage::{VerifyOutcome, create_entry, sweep_expired_codes, verify_code};
use super::mfa::{MfaConfig, request_otp};
use super::password::verify_password;
use super::role::Role;
use super::session::{login, logout, refresh, sign_in_as};
use super::state::{AuthConfig, AuthState};
use super::storage::{
    EnrollOutcome, delete_identity, delete_sessions_for_user, find_session, insert_identity,
    insert_session, lookup_identity, next_username_sequence, set_password,
    sweep_expired_sessions,
};
use super::sweeper::{SweepConfig, SweepScheduler};
use super::types::{
    LoginRequest, LoginResponse, LogoutRequest, OtpRequest, RefreshRequest, RefreshResponse,
    SignInAsRequest,
};
use super::utils::{hash_token, now};
use crate::api::notify::{LogNotifier, Notifier};

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

static DB_LOCK: Mutex<()> = Mutex::new(());

/// Serialize tests that share the database; a panicked holder must not
/// wedge the rest of the suite.
fn db_lock() -> MutexGuard<'static, ()> {
    DB_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn test_pool() -> Result<PgPool> {
    let dsn = std::env::var("PRAKTIKO_TEST_DSN")
        .context("PRAKTIKO_TEST_DSN must point at a disposable database")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&dsn)
        .await
        .context("failed to connect test pool")?;
    apply_schema(&pool).await?;
    Ok(pool)
}

async fn apply_schema(pool: &PgPool) -> Result<()> {
    for (index, statement) in split_sql_statements(SCHEMA_SQL).iter().enumerate() {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("failed to execute schema statement {}", index + 1))?;
    }
    Ok(())
}

fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") && current.is_empty() {
            continue;
        }
        current.push_str(line);
        current.push('\n');

        if trimmed.ends_with(';') {
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}

fn auth_state() -> Arc<AuthState> {
    Arc::new(AuthState::new(
        AuthConfig::new(),
        MfaConfig::new(),
        SecretString::from("integration-test-signing-key".to_string()),
    ))
}

/// One scheduler for the whole run, so handler-triggered sweeps fire at
/// most once per interval instead of on every test's first request.
fn scheduler() -> Arc<SweepScheduler> {
    static SCHEDULER: OnceLock<Arc<SweepScheduler>> = OnceLock::new();
    SCHEDULER
        .get_or_init(|| Arc::new(SweepScheduler::new(SweepConfig::new())))
        .clone()
}

async fn json_body<T: DeserializeOwned>(response: axum::response::Response) -> Result<T> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .context("failed to read response body")?;
    serde_json::from_slice(&bytes).context("failed to decode response body")
}

/// Reset one identity so tests can re-run against a dirty database.
async fn reset_identity(pool: &PgPool, user_id: &str) -> Result<()> {
    delete_identity(pool, user_id).await?;
    Ok(())
}

async fn seed_identity(pool: &PgPool, user_id: &str, password: &str, role: Role) -> Result<()> {
    reset_identity(pool, user_id).await?;
    let outcome = insert_identity(
        pool,
        user_id,
        password,
        Some("Test Person"),
        Some(&format!("{}@example.com", user_id.to_lowercase())),
        role,
    )
    .await?;
    assert!(matches!(outcome, EnrollOutcome::Created));
    Ok(())
}

async fn login_ok(pool: &PgPool, user_id: &str, password: &str) -> Result<LoginResponse> {
    let response = login(
        HeaderMap::new(),
        Extension(pool.clone()),
        Extension(auth_state()),
        Extension(scheduler()),
        Some(Json(LoginRequest {
            user_id: user_id.to_string(),
            password: password.to_string(),
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await
}

#[tokio::test]
#[ignore = "requires PostgreSQL via PRAKTIKO_TEST_DSN"]
async fn login_authorize_logout_lifecycle() -> Result<()> {
    let _db = db_lock();
    let pool = test_pool().await?;
    seed_identity(&pool, "it-u1", "pw1", Role::Intern).await?;

    let session = login_ok(&pool, "it-u1", "pw1").await?;
    assert_eq!(session.user_id, "it-u1");
    assert_eq!(session.position, "Intern");
    assert!(!session.refresh_token.is_empty());

    // Freshly issued token authorizes with the identity's true role.
    let context = authorize(&pool, Some("it-u1"), Some(&session.token), Some("Intern"))
        .await
        .expect("fresh session should authorize");
    assert_eq!(context.user_id, "it-u1");
    assert_eq!(context.role, Role::Intern);

    // A claimed role that differs from the stored binding is refused.
    let denied = authorize(&pool, Some("it-u1"), Some(&session.token), Some("Owner")).await;
    assert!(matches!(
        denied,
        Err(AccessDenied::RoleMismatch {
            actual: Role::Intern
        })
    ));

    let response = logout(
        Extension(pool.clone()),
        Some(Json(LogoutRequest {
            user_id: "it-u1".to_string(),
            token: session.token.clone(),
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Revocation is immediate: the same token no longer authorizes.
    let denied = authorize(&pool, Some("it-u1"), Some(&session.token), Some("Intern")).await;
    assert!(matches!(denied, Err(AccessDenied::InvalidToken)));

    // Logging out twice reports the session as gone.
    let response = logout(
        Extension(pool.clone()),
        Some(Json(LogoutRequest {
            user_id: "it-u1".to_string(),
            token: session.token,
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
#[ignore = "requires PostgreSQL via PRAKTIKO_TEST_DSN"]
async fn wrong_password_and_unknown_user_fail_alike() -> Result<()> {
    let _db = db_lock();
    let pool = test_pool().await?;
    seed_identity(&pool, "it-u2", "correct", Role::Employee).await?;

    for (user_id, password) in [("it-u2", "wrong"), ("it-nobody", "correct")] {
        let response = login(
            HeaderMap::new(),
            Extension(pool.clone()),
            Extension(auth_state()),
            Extension(scheduler()),
            Some(Json(LoginRequest {
                user_id: user_id.to_string(),
                password: password.to_string(),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    Ok(())
}

#[tokio::test]
#[ignore = "requires PostgreSQL via PRAKTIKO_TEST_DSN"]
async fn refresh_rotates_in_place_and_respects_the_window() -> Result<()> {
    let _db = db_lock();
    let pool = test_pool().await?;
    seed_identity(&pool, "it-u3", "pw3", Role::Hr).await?;

    let session = login_ok(&pool, "it-u3", "pw3").await?;

    let response = refresh(
        Extension(pool.clone()),
        Extension(auth_state()),
        Extension(scheduler()),
        Some(Json(RefreshRequest {
            user_id: "it-u3".to_string(),
            token: session.token.clone(),
            refresh_token: session.refresh_token.clone(),
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let rotated: RefreshResponse = json_body(response).await?;
    assert_ne!(rotated.token, session.token);

    // Rotation replaced the row in place: the old token is gone, the new
    // one resolves, and no extra session appeared.
    assert!(
        find_session(&pool, "it-u3", &hash_token(&session.token))
            .await?
            .is_none()
    );
    assert!(
        find_session(&pool, "it-u3", &hash_token(&rotated.token))
            .await?
            .is_some()
    );

    // Close the refresh window and try again with the rotated pair.
    sqlx::query("UPDATE sessions SET expires_at = NOW() - INTERVAL '1 hour' WHERE user_id = $1")
        .bind("it-u3")
        .execute(&pool)
        .await?;

    let response = refresh(
        Extension(pool.clone()),
        Extension(auth_state()),
        Extension(scheduler()),
        Some(Json(RefreshRequest {
            user_id: "it-u3".to_string(),
            token: rotated.token.clone(),
            refresh_token: session.refresh_token.clone(),
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The failed rotation left the row's token untouched.
    assert!(
        find_session(&pool, "it-u3", &hash_token(&rotated.token))
            .await?
            .is_some()
    );

    // An unknown triple is reported as missing, not expired.
    let response = refresh(
        Extension(pool.clone()),
        Extension(auth_state()),
        Extension(scheduler()),
        Some(Json(RefreshRequest {
            user_id: "it-u3".to_string(),
            token: rotated.token,
            refresh_token: "not-the-refresh-secret".to_string(),
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
#[ignore = "requires PostgreSQL via PRAKTIKO_TEST_DSN"]
async fn expired_sessions_are_rejected_before_the_sweep_runs() -> Result<()> {
    let _db = db_lock();
    let pool = test_pool().await?;
    seed_identity(&pool, "it-u4", "pw4", Role::User).await?;

    let session = login_ok(&pool, "it-u4", "pw4").await?;
    sqlx::query("UPDATE sessions SET expires_at = NOW() - INTERVAL '1 minute' WHERE user_id = $1")
        .bind("it-u4")
        .execute(&pool)
        .await?;

    // The row still exists, but the guard re-checks expiry on read.
    let denied = authorize(&pool, Some("it-u4"), Some(&session.token), Some("User")).await;
    assert!(matches!(denied, Err(AccessDenied::TokenExpired)));

    Ok(())
}

#[tokio::test]
#[ignore = "requires PostgreSQL via PRAKTIKO_TEST_DSN"]
async fn sweep_removes_exactly_the_strictly_expired_rows() -> Result<()> {
    let _db = db_lock();
    let pool = test_pool().await?;
    seed_identity(&pool, "it-u5", "pw5", Role::User).await?;

    let reference = now();
    let past = reference - chrono::Duration::minutes(10);
    let future = reference + chrono::Duration::minutes(10);

    insert_session(
        &pool,
        "it-u5",
        &hash_token("expired"),
        None,
        None,
        None,
        Some(past),
    )
    .await?;
    insert_session(
        &pool,
        "it-u5",
        &hash_token("live"),
        None,
        None,
        None,
        Some(future),
    )
    .await?;
    insert_session(&pool, "it-u5", &hash_token("untracked"), None, None, None, None).await?;

    // Other tests may leave their own expired rows behind, so the exact
    // count is only bounded below.
    let removed = sweep_expired_sessions(&pool, reference).await?;
    assert!(removed >= 1);
    assert!(find_session(&pool, "it-u5", &hash_token("expired")).await?.is_none());
    assert!(find_session(&pool, "it-u5", &hash_token("live")).await?.is_some());
    assert!(
        find_session(&pool, "it-u5", &hash_token("untracked"))
            .await?
            .is_some()
    );

    // Idempotent: a second pass at the same instant removes nothing.
    let removed = sweep_expired_sessions(&pool, reference).await?;
    assert_eq!(removed, 0);

    Ok(())
}

#[tokio::test]
#[ignore = "requires PostgreSQL via PRAKTIKO_TEST_DSN"]
async fn otp_codes_are_single_use_and_superseded_by_reissue() -> Result<()> {
    let _db = db_lock();
    let pool = test_pool().await?;
    sqlx::query("DELETE FROM mfa_verifications WHERE subject = $1")
        .bind("a@x.com")
        .execute(&pool)
        .await?;

    let expires_at = now() + chrono::Duration::minutes(5);

    // A second issuance for the same (subject, purpose) invalidates the first.
    create_entry(&pool, "a@x.com", "LOGIN", "111111", expires_at).await?;
    create_entry(&pool, "a@x.com", "LOGIN", "222222", expires_at).await?;
    assert_eq!(
        verify_code(&pool, "a@x.com", "111111", "LOGIN", now()).await?,
        VerifyOutcome::Invalid
    );

    // The live code verifies exactly once.
    assert_eq!(
        verify_code(&pool, "a@x.com", "222222", "LOGIN", now()).await?,
        VerifyOutcome::Verified
    );
    assert_eq!(
        verify_code(&pool, "a@x.com", "222222", "LOGIN", now()).await?,
        VerifyOutcome::Invalid
    );

    // Purpose is part of the scope.
    create_entry(&pool, "a@x.com", "INTERN_APPLY", "333333", expires_at).await?;
    assert_eq!(
        verify_code(&pool, "a@x.com", "333333", "LOGIN", now()).await?,
        VerifyOutcome::Invalid
    );

    // Expired entries are rejected without being deleted, then swept.
    create_entry(
        &pool,
        "a@x.com",
        "LOGIN",
        "444444",
        now() - chrono::Duration::minutes(1),
    )
    .await?;
    assert_eq!(
        verify_code(&pool, "a@x.com", "444444", "LOGIN", now()).await?,
        VerifyOutcome::Expired
    );
    assert_eq!(
        verify_code(&pool, "a@x.com", "444444", "LOGIN", now()).await?,
        VerifyOutcome::Expired
    );
    let swept = sweep_expired_codes(&pool, now()).await?;
    assert!(swept >= 1);
    assert_eq!(
        verify_code(&pool, "a@x.com", "444444", "LOGIN", now()).await?,
        VerifyOutcome::Invalid
    );

    Ok(())
}

#[tokio::test]
#[ignore = "requires PostgreSQL via PRAKTIKO_TEST_DSN"]
async fn otp_request_response_is_uniform_and_code_free() -> Result<()> {
    let _db = db_lock();
    let pool = test_pool().await?;
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

    for subject in ["someone@example.com", "it-no-such-user"] {
        let response = request_otp(
            Extension(pool.clone()),
            Extension(auth_state()),
            Extension(notifier.clone()),
            Some(Json(OtpRequest {
                subject: subject.to_string(),
                purpose: "LOGIN".to_string(),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body: serde_json::Value = json_body(response).await?;
        let text = body.to_string();
        // The issuance response must never leak the stored code.
        let stored: Option<String> = sqlx::query_scalar(
            "SELECT code FROM mfa_verifications WHERE subject = $1 AND purpose = 'LOGIN' AND NOT verified",
        )
        .bind(subject)
        .fetch_optional(&pool)
        .await?;
        let code = stored.context("otp entry should exist")?;
        assert!(!text.contains(&code));
    }

    Ok(())
}

#[tokio::test]
#[ignore = "requires PostgreSQL via PRAKTIKO_TEST_DSN"]
async fn owner_can_impersonate_and_loses_their_own_session() -> Result<()> {
    let _db = db_lock();
    let pool = test_pool().await?;
    seed_identity(&pool, "it-owner", "owner-pw", Role::Owner).await?;
    seed_identity(&pool, "it-target", "target-pw", Role::Intern).await?;

    let owner_session = login_ok(&pool, "it-owner", "owner-pw").await?;

    let response = sign_in_as(
        HeaderMap::new(),
        Extension(pool.clone()),
        Extension(auth_state()),
        Extension(scheduler()),
        Some(Json(SignInAsRequest {
            user_id: "it-owner".to_string(),
            token: owner_session.token.clone(),
            role: "Owner".to_string(),
            sign_in_as: "it-target".to_string(),
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let target_session: LoginResponse = json_body(response).await?;
    assert_eq!(target_session.user_id, "it-target");
    assert_eq!(target_session.position, "Intern");

    // The owner's own credential was retired in the exchange.
    let denied = authorize(
        &pool,
        Some("it-owner"),
        Some(&owner_session.token),
        Some("Owner"),
    )
    .await;
    assert!(matches!(denied, Err(AccessDenied::InvalidToken)));

    // The minted credential authorizes as the target.
    let context = authorize(
        &pool,
        Some("it-target"),
        Some(&target_session.token),
        Some("Intern"),
    )
    .await
    .expect("target session should authorize");
    assert_eq!(context.role, Role::Intern);

    // Non-owners cannot reach the impersonation path.
    let intern_session = login_ok(&pool, "it-target", "target-pw").await?;
    let response = sign_in_as(
        HeaderMap::new(),
        Extension(pool.clone()),
        Extension(auth_state()),
        Extension(scheduler()),
        Some(Json(SignInAsRequest {
            user_id: "it-target".to_string(),
            token: intern_session.token,
            role: "Intern".to_string(),
            sign_in_as: "it-owner".to_string(),
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
#[ignore = "requires PostgreSQL via PRAKTIKO_TEST_DSN"]
async fn duplicate_enrollment_reports_conflict() -> Result<()> {
    let _db = db_lock();
    let pool = test_pool().await?;
    seed_identity(&pool, "it-dup", "pw", Role::User).await?;

    let outcome = insert_identity(&pool, "it-dup", "other-pw", None, None, Role::User).await?;
    assert!(matches!(outcome, EnrollOutcome::Conflict));

    // The original credentials survive the refused enrollment.
    let identity = lookup_identity(&pool, "it-dup")
        .await?
        .context("identity should exist")?;
    assert!(verify_password("pw", &identity.password_hash)?);

    Ok(())
}

#[tokio::test]
#[ignore = "requires PostgreSQL via PRAKTIKO_TEST_DSN"]
async fn password_change_and_identity_removal() -> Result<()> {
    let _db = db_lock();
    let pool = test_pool().await?;
    seed_identity(&pool, "it-u6", "before", Role::Employee).await?;

    assert!(set_password(&pool, "it-u6", "after").await?);
    let identity = lookup_identity(&pool, "it-u6")
        .await?
        .context("identity should exist")?;
    assert!(verify_password("after", &identity.password_hash)?);
    assert!(!verify_password("before", &identity.password_hash)?);

    // Unknown identities are reported, not silently ignored.
    assert!(!set_password(&pool, "it-nobody", "pw").await?);

    // Bulk revocation and cascade-on-delete.
    let session = login_ok(&pool, "it-u6", "after").await?;
    let second = login_ok(&pool, "it-u6", "after").await?;
    assert_eq!(delete_sessions_for_user(&pool, "it-u6").await?, 2);
    assert!(
        find_session(&pool, "it-u6", &hash_token(&session.token))
            .await?
            .is_none()
    );
    assert!(
        find_session(&pool, "it-u6", &hash_token(&second.token))
            .await?
            .is_none()
    );

    let third = login_ok(&pool, "it-u6", "after").await?;
    assert!(delete_identity(&pool, "it-u6").await?);
    assert!(
        find_session(&pool, "it-u6", &hash_token(&third.token))
            .await?
            .is_none(),
        "sessions must cascade with their identity"
    );

    Ok(())
}

#[tokio::test]
#[ignore = "requires PostgreSQL via PRAKTIKO_TEST_DSN"]
async fn username_sequence_is_monotonic_per_category_and_year() -> Result<()> {
    let _db = db_lock();
    let pool = test_pool().await?;
    sqlx::query("DELETE FROM username_sequences WHERE category = $1")
        .bind("T")
        .execute(&pool)
        .await?;

    assert_eq!(next_username_sequence(&pool, "T", 2026).await?, 1);
    assert_eq!(next_username_sequence(&pool, "T", 2026).await?, 2);
    assert_eq!(next_username_sequence(&pool, "T", 2026).await?, 3);

    // A new year restarts the counter; the old year is untouched.
    assert_eq!(next_username_sequence(&pool, "T", 2027).await?, 1);
    assert_eq!(next_username_sequence(&pool, "T", 2026).await?, 4);

    Ok(())
}

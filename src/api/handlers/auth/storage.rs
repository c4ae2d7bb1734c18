//! Database helpers for identities, profiles, sessions, and the username
//! sequence counter.
//!
//! The session ledger is the single source of truth for revocation: rows are
//! physically deleted at logout, by the expiry sweeper, or by cascade when
//! the owning user is removed.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::password::hash_password;
use super::role::Role;
use super::utils::is_unique_violation;

/// Outcome when attempting to create a new identity + profile pair.
#[derive(Debug)]
pub enum EnrollOutcome {
    Created,
    Conflict,
}

/// Identity fields needed for credential verification.
pub struct IdentityRecord {
    pub user_id: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_suspended: bool,
}

/// Profile fields used to enrich login responses.
pub struct ProfileRecord {
    pub fullname: Option<String>,
    pub email: Option<String>,
    pub position: String,
}

/// One row of the session ledger.
pub struct SessionRecord {
    pub id: Uuid,
    pub user_id: String,
    pub expires_at: Option<DateTime<Utc>>,
}

pub async fn lookup_identity(
    pool: &PgPool,
    user_id: &str,
) -> Result<Option<IdentityRecord>> {
    let query = r"
        SELECT user_id, password_hash, is_active, is_suspended
        FROM users
        WHERE user_id = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup identity")?;

    Ok(row.map(|row| IdentityRecord {
        user_id: row.get("user_id"),
        password_hash: row.get("password_hash"),
        is_active: row.get("is_active"),
        is_suspended: row.get("is_suspended"),
    }))
}

/// Insert an identity and its profile in one transaction.
///
/// Used by the enrollment collaborator; the position string must come from
/// [`Role::as_str`] so the guard can parse it back.
pub async fn insert_identity(
    pool: &PgPool,
    user_id: &str,
    password: &str,
    fullname: Option<&str>,
    email: Option<&str>,
    role: Role,
) -> Result<EnrollOutcome> {
    let password_hash = hash_password(password)?;
    let mut tx = pool.begin().await.context("begin identity transaction")?;

    let query = r"
        INSERT INTO users (user_id, password_hash)
        VALUES ($1, $2)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let inserted = sqlx::query(query)
        .bind(user_id)
        .bind(&password_hash)
        .execute(&mut *tx)
        .instrument(span)
        .await;

    if let Err(err) = inserted {
        if is_unique_violation(&err) {
            let _ = tx.rollback().await;
            return Ok(EnrollOutcome::Conflict);
        }
        return Err(err).context("failed to insert identity");
    }

    let query = r"
        INSERT INTO profiles (user_id, fullname, email, position)
        VALUES ($1, $2, $3, $4)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(fullname)
        .bind(email)
        .bind(role.as_str())
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert profile")?;

    tx.commit().await.context("commit identity transaction")?;
    Ok(EnrollOutcome::Created)
}

/// Remove an identity; sessions and profile rows cascade at the schema level.
pub async fn delete_identity(pool: &PgPool, user_id: &str) -> Result<bool> {
    let query = "DELETE FROM users WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete identity")?;
    Ok(result.rows_affected() > 0)
}

/// Store a fresh password hash; reports whether the identity existed.
pub async fn set_password(pool: &PgPool, user_id: &str, plaintext: &str) -> Result<bool> {
    let password_hash = hash_password(plaintext)?;
    let query = "UPDATE users SET password_hash = $2 WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(&password_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to set password")?;
    Ok(result.rows_affected() > 0)
}

pub async fn record_login_time(pool: &PgPool, user_id: &str) -> Result<()> {
    let query = "UPDATE users SET last_login_at = NOW() WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to record login time")?;
    Ok(())
}

pub async fn lookup_profile(pool: &PgPool, user_id: &str) -> Result<Option<ProfileRecord>> {
    let query = r"
        SELECT fullname, email, position
        FROM profiles
        WHERE user_id = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup profile")?;

    Ok(row.map(|row| ProfileRecord {
        fullname: row.get("fullname"),
        email: row.get("email"),
        position: row.get("position"),
    }))
}

/// Resolve the role binding for an identity.
///
/// A profile whose position string no longer parses as a known role is
/// treated as having no usable binding.
pub async fn lookup_role(pool: &PgPool, user_id: &str) -> Result<Option<Role>> {
    let profile = lookup_profile(pool, user_id).await?;
    Ok(profile.and_then(|profile| {
        let role = Role::parse(&profile.position);
        if role.is_none() {
            tracing::warn!(user_id, position = %profile.position, "unrecognized position string");
        }
        role
    }))
}

/// Record a freshly issued credential in the session ledger.
#[allow(clippy::too_many_arguments)]
pub async fn insert_session(
    pool: &PgPool,
    user_id: &str,
    token_hash: &[u8],
    refresh_hash: Option<&[u8]>,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<()> {
    let query = r"
        INSERT INTO sessions
            (user_id, token_hash, refresh_hash, ip_address, user_agent, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(token_hash)
        .bind(refresh_hash)
        .bind(ip_address)
        .bind(user_agent)
        .bind(expires_at)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert session")?;
    Ok(())
}

/// Exact-match session lookup used by the access guard.
///
/// Deliberately does NOT filter on expiry: stale rows stay visible until the
/// sweeper removes them, and the guard re-checks `expires_at` itself so it
/// can distinguish an expired token from an unknown one.
pub async fn find_session(
    pool: &PgPool,
    user_id: &str,
    token_hash: &[u8],
) -> Result<Option<SessionRecord>> {
    let query = r"
        SELECT id, user_id, expires_at
        FROM sessions
        WHERE user_id = $1
          AND token_hash = $2
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;

    Ok(row.map(session_from_row))
}

/// Triple-match lookup used by token rotation.
pub async fn find_session_for_rotation(
    pool: &PgPool,
    user_id: &str,
    token_hash: &[u8],
    refresh_hash: &[u8],
) -> Result<Option<SessionRecord>> {
    let query = r"
        SELECT id, user_id, expires_at
        FROM sessions
        WHERE user_id = $1
          AND token_hash = $2
          AND refresh_hash = $3
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(token_hash)
        .bind(refresh_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session for rotation")?;

    Ok(row.map(session_from_row))
}

/// Overwrite a session's bearer token and expiry in place.
///
/// Rotation keeps the same row: the refresh secret and its window are not
/// extended, only the bearer token changes.
pub async fn rotate_session(
    pool: &PgPool,
    session_id: Uuid,
    new_token_hash: &[u8],
    new_expires_at: DateTime<Utc>,
) -> Result<()> {
    let query = r"
        UPDATE sessions
        SET token_hash = $2,
            expires_at = $3
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(session_id)
        .bind(new_token_hash)
        .bind(new_expires_at)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to rotate session")?;
    Ok(())
}

/// Revoke one session; reports whether a row was actually removed.
pub async fn delete_session(
    pool: &PgPool,
    user_id: &str,
    token_hash: &[u8],
) -> Result<bool> {
    let query = "DELETE FROM sessions WHERE user_id = $1 AND token_hash = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session")?;
    Ok(result.rows_affected() > 0)
}

/// Bulk revocation of every session an identity owns.
pub async fn delete_sessions_for_user(pool: &PgPool, user_id: &str) -> Result<u64> {
    let query = "DELETE FROM sessions WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete sessions for user")?;
    Ok(result.rows_affected())
}

/// Delete every session whose expiry is strictly in the past.
///
/// Rows with a NULL expiry are self-expiring tokens and are never swept.
pub async fn sweep_expired_sessions(pool: &PgPool, now: DateTime<Utc>) -> Result<u64> {
    let query = r"
        DELETE FROM sessions
        WHERE expires_at IS NOT NULL
          AND expires_at < $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(now)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to sweep expired sessions")?;
    Ok(result.rows_affected())
}

/// Claim the next number in a per-(category, year) username sequence.
///
/// Single atomic upsert so concurrent enrollments never observe the same
/// value; the year key makes the counter restart on rollover.
pub async fn next_username_sequence(
    pool: &PgPool,
    category: &str,
    year: i32,
) -> Result<i32> {
    let query = r"
        INSERT INTO username_sequences (category, year, next_value, issued)
        VALUES ($1, $2, 2, 1)
        ON CONFLICT (category, year) DO UPDATE
        SET next_value = username_sequences.next_value + 1,
            issued = username_sequences.issued + 1
        RETURNING next_value - 1 AS claimed
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(category)
        .bind(year)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to advance username sequence")?;
    Ok(row.get("claimed"))
}

fn session_from_row(row: sqlx::postgres::PgRow) -> SessionRecord {
    SessionRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        expires_at: row.get("expires_at"),
    }
}

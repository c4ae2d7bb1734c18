//! Storage helpers for one-time codes.
//!
//! At most one unverified code exists per (subject, purpose): issuing a new
//! code deletes the previous unverified ones in the same transaction, so an
//! older code can never race a newer one.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;

/// Result of a verification attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum VerifyOutcome {
    /// Code matched and was consumed; it can never be used again.
    Verified,
    /// No unverified entry matches: wrong code, wrong purpose, or already
    /// consumed.
    Invalid,
    /// Entry matched but its expiry has passed. The row is left for the
    /// sweeper; rejection here does not delete it.
    Expired,
}

/// Store a fresh code for (subject, purpose), invalidating any outstanding
/// unverified code for the same pair.
pub(crate) async fn create_entry(
    pool: &PgPool,
    subject: &str,
    purpose: &str,
    code: &str,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin otp transaction")?;

    let query = r"
        DELETE FROM mfa_verifications
        WHERE subject = $1
          AND purpose = $2
          AND NOT verified
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(subject)
        .bind(purpose)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to clear outstanding codes")?;

    let query = r"
        INSERT INTO mfa_verifications (subject, code, purpose, expires_at)
        VALUES ($1, $2, $3, $4)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(subject)
        .bind(code)
        .bind(purpose)
        .bind(expires_at)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert otp entry")?;

    tx.commit().await.context("commit otp transaction")?;
    Ok(())
}

/// Attempt to consume a code. Consumption marks the row verified; verified
/// rows never match again.
pub(crate) async fn verify_code(
    pool: &PgPool,
    subject: &str,
    code: &str,
    purpose: &str,
    now: DateTime<Utc>,
) -> Result<VerifyOutcome> {
    let query = r"
        SELECT id, expires_at
        FROM mfa_verifications
        WHERE subject = $1
          AND code = $2
          AND purpose = $3
          AND NOT verified
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(subject)
        .bind(code)
        .bind(purpose)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup otp entry")?;

    let Some(row) = row else {
        return Ok(VerifyOutcome::Invalid);
    };

    let expires_at: DateTime<Utc> = row.get("expires_at");
    if expires_at < now {
        return Ok(VerifyOutcome::Expired);
    }

    let id: i64 = row.get("id");
    let query = r"
        UPDATE mfa_verifications
        SET verified = TRUE
        WHERE id = $1
          AND NOT verified
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to mark otp entry verified")?;

    // A concurrent verify may have consumed the row between lookup and
    // update; the guard on NOT verified makes exactly one caller win.
    if result.rows_affected() == 0 {
        return Ok(VerifyOutcome::Invalid);
    }

    Ok(VerifyOutcome::Verified)
}

/// Purge every expired entry, verified or not.
pub(crate) async fn sweep_expired_codes(pool: &PgPool, now: DateTime<Utc>) -> Result<u64> {
    let query = "DELETE FROM mfa_verifications WHERE expires_at < $1";
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
        .context("failed to sweep expired otp entries")?;
    Ok(result.rows_affected())
}

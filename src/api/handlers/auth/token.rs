//! Bearer token issuance and opaque refresh secret generation.
//!
//! Bearer tokens are HS256-signed JWTs carrying the subject identity and an
//! expiry claim; the expiry is mirrored into the session ledger so the
//! server can revoke tokens before their signature expires. Refresh secrets
//! are plain random identifiers, equality-checked against the ledger and
//! never cryptographically verified.

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{EncodingKey, Header};
use rand::{RngCore, rngs::OsRng};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::utils::now;

/// Claims embedded in every bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Claims {
    /// Subject: the owning user id.
    pub(crate) sub: String,
    /// Issued-at (Unix timestamp).
    pub(crate) iat: i64,
    /// Expiration (Unix timestamp).
    pub(crate) exp: i64,
    /// Unique token id, so re-issuing within the same second still yields a
    /// distinct token.
    pub(crate) jti: String,
}

/// Mint a signed bearer token for `subject`, valid for `ttl_seconds`.
///
/// Returns the token together with its expiry timestamp so the caller can
/// mirror it into the session ledger.
///
/// # Errors
/// Fails only on signing-layer misconfiguration; an empty signing key is
/// rejected at startup, never per request.
pub(crate) fn issue(
    secret: &SecretString,
    subject: &str,
    ttl_seconds: i64,
) -> Result<(String, DateTime<Utc>)> {
    let issued_at = now();
    let expires_at = issued_at + Duration::seconds(ttl_seconds);
    let claims = Claims {
        sub: subject.to_string(),
        iat: issued_at.timestamp(),
        exp: expires_at.timestamp(),
        jti: Uuid::new_v4().to_string(),
    };

    let key = EncodingKey::from_secret(secret.expose_secret().as_bytes());
    let token = jsonwebtoken::encode(&Header::default(), &claims, &key)
        .context("failed to sign bearer token")?;

    Ok((token, expires_at))
}

/// Generate an opaque refresh secret (32 random bytes, base64url).
///
/// Uniqueness across live sessions is statistical, not enforced.
pub(crate) fn generate_refresh_secret() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate refresh secret")?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

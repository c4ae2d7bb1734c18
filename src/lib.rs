//! # Praktiko (Session & Credential Authority)
//!
//! `praktiko` is the session/credential management core of the Praktiko
//! internship platform. It authenticates users, issues time-bound bearer
//! tokens with opaque refresh secrets, and gates role-scoped operations
//! behind an access guard backed by a server-side session ledger.
//!
//! ## Session Model
//!
//! Every login records a session row keyed by the SHA-256 digest of the
//! issued token; raw tokens never touch the database. The ledger is the
//! single source of truth for revocation: a cryptographically valid,
//! unexpired-by-signature token is still rejected once its row is deleted,
//! which gives immediate logout semantics a pure stateless JWT cannot.
//!
//! - **Rotation:** `POST /v1/auth/refresh` replaces the bearer token of an
//!   existing session in place. The refresh secret and its window are never
//!   extended by rotation.
//! - **Revocation:** physical deletion, at logout, at expiry sweep, or
//!   cascaded when the owning user is removed.
//!
//! ## Roles
//!
//! Each identity carries exactly one position (`Developer`, `HR`, `Owner`,
//! `Intern`, `Employee`, `User`). Role-scoped requests present a
//! (user id, token, claimed role) triple; the guard compares the claim
//! against the stored binding and reports the true position on mismatch.
//!
//! ## One-Time Codes
//!
//! Sensitive actions are gated by single-use numeric codes scoped to a
//! (subject, purpose) pair. Codes are delivered out-of-band through a
//! `Notifier` and are never echoed back to the requesting caller.
//!
//! Expired sessions and codes are removed by a rate-limited background
//! sweeper triggered from the request path but running detached from it.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

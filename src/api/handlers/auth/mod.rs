//! Authentication, session ledger, access guard, and one-time codes.
//!
//! Flow Overview:
//! 1) `POST /v1/auth/login` verifies credentials, mints a signed bearer
//!    token plus an opaque refresh secret, and records the session.
//! 2) Role-scoped operations pass their (user id, token, claimed role)
//!    triple through [`guard::authorize`], which consults the ledger and
//!    the identity's stored position.
//! 3) `POST /v1/auth/refresh` rotates the bearer token of a session in
//!    place; `POST /v1/auth/logout` deletes it.
//! 4) One-time codes gate sensitive actions and are delivered out-of-band.
//!
//! Security boundaries:
//! - Raw tokens and refresh secrets are never persisted, only SHA-256
//!   digests.
//! - The ledger, not the token signature, decides whether a credential is
//!   still live.
//! - OTP issuance responses are uniform and never contain the code.

pub mod guard;
pub mod mfa;
pub(crate) mod password;
pub mod role;
pub mod session;
pub mod state;
pub mod storage;
pub mod sweeper;
pub(crate) mod token;
pub mod types;
pub(crate) mod utils;

#[cfg(test)]
mod integration_tests;

pub use guard::{AccessDenied, AuthenticatedUser, authorize};
pub use mfa::MfaConfig;
pub use role::Role;
pub use state::{AuthConfig, AuthState};
pub use sweeper::{SweepConfig, SweepScheduler};

//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the
//! appropriate action, such as starting the API server with its full
//! configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::auth;
use anyhow::{Context, Result, anyhow};
use secrecy::SecretString;
use url::Url;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    // Fail early on malformed connection strings instead of at pool setup.
    Url::parse(&dsn).with_context(|| format!("invalid DSN: {dsn}"))?;

    let signing_key = matches
        .get_one::<String>("signing-key")
        .cloned()
        .context("missing required argument: --signing-key")?;
    if signing_key.trim().is_empty() {
        return Err(anyhow!("signing key must not be empty"));
    }

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        signing_key: SecretString::from(signing_key),
        token_ttl_seconds: auth_opts.token_ttl_seconds,
        otp_length: auth_opts.otp_length,
        otp_ttl_minutes: auth_opts.otp_ttl_minutes,
        session_sweep_minutes: auth_opts.session_sweep_minutes,
        mfa_sweep_minutes: auth_opts.mfa_sweep_minutes,
    }))
}

//! Auth-related CLI arguments: token TTL, OTP shape, and sweep cadence.

use anyhow::{Context, Result};
use clap::{Arg, Command};

pub const ARG_TOKEN_TTL_SECONDS: &str = "token-ttl-seconds";
pub const ARG_OTP_LENGTH: &str = "otp-length";
pub const ARG_OTP_TTL_MINUTES: &str = "otp-ttl-minutes";
pub const ARG_SESSION_SWEEP_MINUTES: &str = "session-sweep-minutes";
pub const ARG_MFA_SWEEP_MINUTES: &str = "mfa-sweep-minutes";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOKEN_TTL_SECONDS)
                .long(ARG_TOKEN_TTL_SECONDS)
                .help("Bearer token lifetime in seconds")
                .default_value("3600")
                .env("PRAKTIKO_TOKEN_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64).range(60..)),
        )
        .arg(
            Arg::new(ARG_OTP_LENGTH)
                .long(ARG_OTP_LENGTH)
                .help("Number of digits in one-time codes")
                .default_value("6")
                .env("PRAKTIKO_OTP_LENGTH")
                .value_parser(clap::value_parser!(u8).range(4..=10)),
        )
        .arg(
            Arg::new(ARG_OTP_TTL_MINUTES)
                .long(ARG_OTP_TTL_MINUTES)
                .help("One-time code lifetime in minutes")
                .default_value("5")
                .env("PRAKTIKO_OTP_TTL_MINUTES")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_SESSION_SWEEP_MINUTES)
                .long(ARG_SESSION_SWEEP_MINUTES)
                .help("Minimum minutes between expired-session sweeps")
                .default_value("15")
                .env("PRAKTIKO_SESSION_SWEEP_MINUTES")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_MFA_SWEEP_MINUTES)
                .long(ARG_MFA_SWEEP_MINUTES)
                .help("Minimum minutes between expired-code sweeps")
                .default_value("10")
                .env("PRAKTIKO_MFA_SWEEP_MINUTES")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

/// Parsed auth options.
#[derive(Debug)]
pub struct Options {
    pub token_ttl_seconds: i64,
    pub otp_length: u8,
    pub otp_ttl_minutes: i64,
    pub session_sweep_minutes: u64,
    pub mfa_sweep_minutes: u64,
}

impl Options {
    /// Extract auth options from parsed matches.
    ///
    /// # Errors
    /// Returns an error when a defaulted argument is unexpectedly absent.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        Ok(Self {
            token_ttl_seconds: matches
                .get_one::<i64>(ARG_TOKEN_TTL_SECONDS)
                .copied()
                .context("missing token-ttl-seconds")?,
            otp_length: matches
                .get_one::<u8>(ARG_OTP_LENGTH)
                .copied()
                .context("missing otp-length")?,
            otp_ttl_minutes: matches
                .get_one::<i64>(ARG_OTP_TTL_MINUTES)
                .copied()
                .context("missing otp-ttl-minutes")?,
            session_sweep_minutes: matches
                .get_one::<u64>(ARG_SESSION_SWEEP_MINUTES)
                .copied()
                .context("missing session-sweep-minutes")?,
            mfa_sweep_minutes: matches
                .get_one::<u64>(ARG_MFA_SWEEP_MINUTES)
                .copied()
                .context("missing mfa-sweep-minutes")?,
        })
    }
}

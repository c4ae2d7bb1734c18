use crate::api;
use crate::api::handlers::auth::{AuthConfig, MfaConfig, SweepConfig};
use anyhow::Result;
use secrecy::SecretString;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub signing_key: SecretString,
    pub token_ttl_seconds: i64,
    pub otp_length: u8,
    pub otp_ttl_minutes: i64,
    pub session_sweep_minutes: u64,
    pub mfa_sweep_minutes: u64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = AuthConfig::new().with_token_ttl_seconds(args.token_ttl_seconds);

    let mfa_config = MfaConfig::new()
        .with_otp_length(usize::from(args.otp_length))
        .with_otp_ttl_minutes(args.otp_ttl_minutes);

    let sweep_config = SweepConfig::new()
        .with_session_interval_minutes(args.session_sweep_minutes)
        .with_mfa_interval_minutes(args.mfa_sweep_minutes);

    api::new(
        args.port,
        args.dsn,
        args.signing_key,
        auth_config,
        mfa_config,
        sweep_config,
    )
    .await
}

//! Auth state and configuration.

use secrecy::SecretString;

use super::mfa::MfaConfig;

const DEFAULT_TOKEN_TTL_SECONDS: i64 = 60 * 60;

/// Core auth configuration loaded at startup.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    token_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn token_ttl_seconds(&self) -> i64 {
        self.token_ttl_seconds
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide auth state shared by the handlers: configuration plus the
/// signing key for the token issuer.
pub struct AuthState {
    config: AuthConfig,
    mfa: MfaConfig,
    signing_key: SecretString,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig, mfa: MfaConfig, signing_key: SecretString) -> Self {
        Self {
            config,
            mfa,
            signing_key,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn mfa(&self) -> &MfaConfig {
        &self.mfa
    }

    pub(crate) fn signing_key(&self) -> &SecretString {
        &self.signing_key
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("config", &self.config)
            .field("mfa", &self.mfa)
            .field("signing_key", &"***")
            .finish()
    }
}

//! Rate-limited background sweeping of expired sessions and OTP entries.
//!
//! `trigger` is called from the request path; when a sweep kind's minimum
//! interval has elapsed it claims the slot with a compare-and-swap and
//! spawns the sweep as a detached task, so cleanup cost never lands on a
//! foreground request. A lost CAS race means another request already
//! launched the sweep.

use sqlx::PgPool;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, info};

use super::mfa::storage::sweep_expired_codes;
use super::storage::sweep_expired_sessions;
use super::utils::now;

const DEFAULT_SESSION_SWEEP_MINUTES: u64 = 15;
const DEFAULT_MFA_SWEEP_MINUTES: u64 = 10;

/// Minimum intervals between runs of each sweep kind.
#[derive(Clone, Copy, Debug)]
pub struct SweepConfig {
    session_interval: Duration,
    mfa_interval: Duration,
}

impl SweepConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_interval: Duration::from_secs(DEFAULT_SESSION_SWEEP_MINUTES * 60),
            mfa_interval: Duration::from_secs(DEFAULT_MFA_SWEEP_MINUTES * 60),
        }
    }

    #[must_use]
    pub fn with_session_interval_minutes(mut self, minutes: u64) -> Self {
        self.session_interval = Duration::from_secs(minutes.max(1) * 60);
        self
    }

    #[must_use]
    pub fn with_mfa_interval_minutes(mut self, minutes: u64) -> Self {
        self.mfa_interval = Duration::from_secs(minutes.max(1) * 60);
        self
    }

    #[must_use]
    pub fn session_interval(&self) -> Duration {
        self.session_interval
    }

    #[must_use]
    pub fn mfa_interval(&self) -> Duration {
        self.mfa_interval
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-process sweep scheduler.
///
/// Last-run markers hold milliseconds since scheduler start, offset by one
/// so zero means "never ran". Claiming is a CAS, so concurrent triggers
/// cannot double-launch the same kind; the sweeps themselves stay
/// idempotent either way.
pub struct SweepScheduler {
    config: SweepConfig,
    started: Instant,
    last_session_run: AtomicU64,
    last_mfa_run: AtomicU64,
}

impl SweepScheduler {
    #[must_use]
    pub fn new(config: SweepConfig) -> Self {
        Self {
            config,
            started: Instant::now(),
            last_session_run: AtomicU64::new(0),
            last_mfa_run: AtomicU64::new(0),
        }
    }

    /// Request-path hook: launches any sweep whose interval has elapsed and
    /// returns immediately. Sweep failures are logged, never propagated.
    pub fn trigger(&self, pool: &PgPool) {
        let elapsed = self.elapsed_ms();

        if claim(
            &self.last_session_run,
            elapsed,
            as_millis(self.config.session_interval),
        ) {
            let pool = pool.clone();
            tokio::spawn(async move {
                match sweep_expired_sessions(&pool, now()).await {
                    Ok(count) => info!(count, "session sweep finished"),
                    Err(err) => error!("session sweep failed: {err}"),
                }
            });
        }

        if claim(
            &self.last_mfa_run,
            elapsed,
            as_millis(self.config.mfa_interval),
        ) {
            let pool = pool.clone();
            tokio::spawn(async move {
                match sweep_expired_codes(&pool, now()).await {
                    Ok(count) => info!(count, "mfa sweep finished"),
                    Err(err) => error!("mfa sweep failed: {err}"),
                }
            });
        }
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX - 1)
    }
}

/// Claim a sweep slot. `marker` stores the last run's elapsed-ms plus one;
/// zero means the kind has never run and always claims.
fn claim(marker: &AtomicU64, elapsed_ms: u64, interval_ms: u64) -> bool {
    let previous = marker.load(Ordering::Acquire);
    if previous != 0 && elapsed_ms.saturating_sub(previous - 1) < interval_ms {
        return false;
    }
    marker
        .compare_exchange(
            previous,
            elapsed_ms + 1,
            Ordering::AcqRel,
            Ordering::Acquire,
        )
        .is_ok()
}

fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

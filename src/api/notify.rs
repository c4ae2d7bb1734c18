//! Best-effort notification abstraction.
//!
//! One-time codes and other side-channel messages leave the service through
//! a [`Notifier`]. Delivery is fire-and-forget from the caller's point of
//! view: a failed send is logged and reported upward as an error, but no
//! auth decision ever depends on it.
//!
//! The default sender for local dev is [`LogNotifier`], which logs the
//! message instead of delivering real email. A production deployment
//! implements the trait over its mail transport of choice.

use anyhow::Result;
use tracing::info;

/// Outbound delivery abstraction.
pub trait Notifier: Send + Sync {
    /// Deliver a message or return an error; callers treat failures as
    /// reportable, never blocking.
    fn notify(&self, recipient: &str, subject: &str, body: &str) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        info!(recipient, subject, body, "notification send stub");
        Ok(())
    }
}

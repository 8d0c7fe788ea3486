//! Configuration for box command sets

use std::time::Duration;

/// Behavior knobs shared by every command issued through one client
///
/// # Defaults
/// - Call timeout: 5 seconds, used only when the caller's context has no deadline
/// - Idempotency flags forwarded to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxConfig {
    /// Upper bound on waiting for a reply when the context carries no deadline
    pub call_timeout: Option<Duration>,

    /// Send `if_exists` / `if_not_exists` in the option maps.
    ///
    /// When disabled the engine always raises the duplicate/missing error and
    /// suppression happens purely on this side. The outcome is the same.
    pub forward_idempotency_flags: bool,
}

impl Default for BoxConfig {
    fn default() -> Self {
        Self {
            call_timeout: Some(Duration::from_secs(5)),
            forward_idempotency_flags: true,
        }
    }
}

impl BoxConfig {
    /// Sets the fallback call timeout
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Waits for replies without a fallback timeout
    pub fn no_call_timeout(mut self) -> Self {
        self.call_timeout = None;
        self
    }

    /// Sets whether idempotency flags are sent to the engine
    pub fn forward_idempotency_flags(mut self, forward: bool) -> Self {
        self.forward_idempotency_flags = forward;
        self
    }
}

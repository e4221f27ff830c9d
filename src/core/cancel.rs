//! Shared cancellation token for the run scheduler.
//!
//! Three stages: 0 (running), 1 (graceful — stop dispatching new work,
//! finish in-flight stacks), 2 (forward signal to children), 3 (force-kill).
//! A single `ctrlc` handler escalates the stage on each signal; everything
//! else only ever reads it.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

pub const RUNNING: u8 = 0;
pub const GRACEFUL: u8 = 1;
pub const FORWARD: u8 = 2;
pub const FORCE: u8 = 3;

#[derive(Clone)]
pub struct CancellationToken(Arc<AtomicU8>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicU8::new(RUNNING)))
    }

    pub fn stage(&self) -> u8 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn is_canceled(&self) -> bool {
        self.stage() != RUNNING
    }

    /// Escalate to the next stage, saturating at `FORCE`.
    pub fn escalate(&self) -> u8 {
        let next = (self.stage() + 1).min(FORCE);
        self.0.store(next, Ordering::SeqCst);
        next
    }

    /// Install a `ctrlc` handler that escalates this token on each
    /// interrupt signal. Returns an error if a handler is already
    /// installed for this process (the `ctrlc` crate allows only one).
    pub fn install_signal_handler(&self) -> Result<(), ctrlc::Error> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            token.escalate();
        })
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalation_saturates_at_force() {
        let token = CancellationToken::new();
        assert_eq!(token.stage(), RUNNING);
        assert_eq!(token.escalate(), GRACEFUL);
        assert_eq!(token.escalate(), FORWARD);
        assert_eq!(token.escalate(), FORCE);
        assert_eq!(token.escalate(), FORCE);
    }

    #[test]
    fn clone_shares_the_same_underlying_state() {
        let a = CancellationToken::new();
        let b = a.clone();
        a.escalate();
        assert_eq!(b.stage(), GRACEFUL);
    }
}

//! The process-wide shutdown flag.
//!
//! This is the "can I still block?" collaborator every blocking operation
//! consults at its entry point. It is deliberately a single global: the
//! flag models a property of the whole cooperative scheduler, not of any
//! one channel, and every channel created anywhere in the process must
//! observe the same shutdown decision.

use std::sync::atomic::{AtomicBool, Ordering};

static SHUTTING_DOWN: AtomicBool = AtomicBool::new(false);

/// Returns `true` once [`begin_shutdown`] has been called.
///
/// Blocking operations (`send`, `recv`, `choose`) check this before doing
/// any other work and fail with [`Error::Canceled`](crate::Error::Canceled)
/// if it is set, rather than parking a task that will never be resumed.
pub fn can_block() -> bool {
    !SHUTTING_DOWN.load(Ordering::Acquire)
}

/// Signals that the process is shutting down. Idempotent.
///
/// After this call, every channel operation that would otherwise park
/// fails fast with [`Error::Canceled`](crate::Error::Canceled) instead.
/// Channels and tasks that are already parked are not woken by this call
/// alone; a real scheduler integration is expected to also cancel or
/// drain outstanding tasks through its own mechanism.
pub fn begin_shutdown() {
    SHUTTING_DOWN.store(true, Ordering::Release);
}

#[cfg(test)]
/// Test-only: clears the flag so independent tests don't leak state.
///
/// Not part of the public API: real processes never un-shut-down.
pub(crate) fn reset_for_test() {
    SHUTTING_DOWN.store(false, Ordering::Release);
}

//! Error taxonomy shared by every channel operation.

use std::fmt;

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure modes a channel operation can report.
///
/// Every variant maps onto one of the error kinds described for the
/// underlying C channel primitive this crate generalizes: a blocking
/// rendezvous/buffer hybrid guarded by a process-wide shutdown flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The process-wide shutdown flag is set; no new blocking work is
    /// accepted. Checked at the entry of every operation that could park.
    Canceled,
    /// The handle does not refer to a live channel of the expected type.
    ///
    /// Unreachable through this crate's typed [`Sender`](crate::Sender)/
    /// [`Receiver`](crate::Receiver) API (the compiler rejects the wrong
    /// handle at the call site); kept so the error surface matches the
    /// untyped handle-table collaborator this crate assumes exists
    /// upstream of it.
    BadHandle,
    /// A malformed clause was passed to [`choose`](crate::choose) (for
    /// instance, an empty clause list).
    Invalid,
    /// The channel was marked done, either before the call or while the
    /// caller was parked waiting on it.
    Pipe,
    /// The deadline elapsed (or `deadline == 0` and nothing was ready).
    TimedOut,
    /// Allocation of the channel's ring buffer failed.
    Oom,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::Canceled => "operation canceled: process is shutting down",
            Error::BadHandle => "handle does not refer to a channel",
            Error::Invalid => "malformed clause",
            Error::Pipe => "channel is done",
            Error::TimedOut => "deadline elapsed",
            Error::Oom => "allocation failed",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for Error {}

//! # Error & Event Vocabulary
//!
//! Every fallible kernel entry point returns one of the types in this
//! module instead of a bare `()`. There are two distinct error channels:
//!
//! - [`KernelError`] — reported synchronously, at the call that failed
//!   (e.g. the task table is full). These are programmer-visible setup
//!   failures, not runtime conditions a correct caller routinely handles.
//! - [`Event`] — the *event slot*: the value a waker publishes into a
//!   woken task's TCB, and the value every blocking wait-primitive
//!   operation ultimately returns. `Event::Timeout` and `Event::Stopped`
//!   are ordinary results, not errors — a correct caller must handle
//!   both, same as a successful transfer.

use core::fmt;

/// Failures reported synchronously by kernel setup calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// The task table ([`crate::config::MAX_TASKS`]) is full.
    TooManyTasks,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            KernelError::TooManyTasks => "task table is full",
        };
        f.write_str(msg)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for KernelError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            KernelError::TooManyTasks => defmt::write!(fmt, "TooManyTasks"),
        }
    }
}

/// The outcome a waker publishes into a blocked task's event slot, and
/// that a wait-primitive operation ultimately returns to its caller.
///
/// `Success` always carries a byte count (possibly zero — e.g. a
/// zero-length send is a legitimate no-op). `Timeout` and `Stopped` are
/// the two non-success outcomes; every public message-buffer operation
/// collapses `Timeout`/`Stopped` to `0` at the API boundary, while
/// internal code can still distinguish the two when it needs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The operation completed; the task transferred this many bytes.
    Success(usize),
    /// The operation's deadline elapsed before it could complete.
    Timeout,
    /// The object being waited on was killed while the task was parked.
    Stopped,
}

impl Event {
    /// Collapse to the byte count the public C-shaped API returns:
    /// the transfer count on success, `0` on timeout or stop.
    #[inline]
    pub const fn transferred(self) -> usize {
        match self {
            Event::Success(n) => n,
            Event::Timeout | Event::Stopped => 0,
        }
    }
}

//! The typed handles callers actually hold.
//!
//! The data model describes channels as objects owned by a handle table,
//! reached only through opaque integer handles that get type-checked on
//! every call. A strongly-typed Rust API gets that type check for free
//! from the compiler (a [`Sender<T>`] can never be handed to code
//! expecting a `Receiver<U>`), so [`Error::BadHandle`] only remains
//! reachable in principle, not through this crate's own surface.

use std::cell::RefCell;
use std::rc::Rc;

use crate::channel::ChannelCore;
use crate::clock::{SystemTimer, Timer};
use crate::error::{Error, Result};
use crate::future::{RecvFuture, SendFuture};
use crate::select::{RecvCase, SendCase};

/// Creates a channel with the given buffering capacity, using the
/// default wall-clock timer for any deadline passed to `send`/`recv`.
///
/// `capacity == 0` yields a pure-rendezvous channel: every send parks
/// until a receiver is waiting. `T` may be `()` for a signal-only
/// channel, matching the zero-`elem_size` case.
pub fn channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    channel_with_timer(capacity, Rc::new(SystemTimer))
}

/// Like [`channel`], but with an explicit [`Timer`] — the hook tests use
/// to make deadline behavior deterministic.
pub fn channel_with_timer<T>(capacity: usize, timer: Rc<dyn Timer>) -> (Sender<T>, Receiver<T>) {
    let core = Rc::new(RefCell::new(ChannelCore::new(capacity)));
    (
        Sender {
            core: core.clone(),
            timer: timer.clone(),
        },
        Receiver { core, timer },
    )
}

/// The sending half of a channel.
///
/// Cloning a `Sender` shares the same underlying channel; the channel
/// itself only becomes unreachable for sends once every clone is
/// dropped or [`Sender::done`] is called explicitly.
pub struct Sender<T> {
    pub(crate) core: Rc<RefCell<ChannelCore<T>>>,
    pub(crate) timer: Rc<dyn Timer>,
}

impl<T> Sender<T> {
    /// Sends `value`, parking until a receiver or buffer slot is
    /// available, the deadline elapses, or the channel closes.
    ///
    /// `deadline` is an absolute time in milliseconds on this sender's
    /// [`Timer`]; `-1` waits indefinitely, `0` fails immediately with
    /// [`Error::TimedOut`] instead of parking.
    pub fn send(&self, value: T, deadline: i64) -> SendFuture<T> {
        SendFuture::new(self.core.clone(), self.timer.clone(), deadline, value)
    }

    /// Builds a [`SendCase`] clause for use with [`crate::choose`],
    /// borrowing this sender for the duration of the choice call.
    pub fn case(&self, value: T) -> SendCase<'_, T> {
        SendCase::new(&self.core, value)
    }

    /// Marks the channel done: no further sends will be accepted, and
    /// every currently-parked clause (on either side) wakes with
    /// [`Error::Pipe`]. Buffered items remain readable until drained.
    ///
    /// Fails with [`Error::Pipe`] if the channel was already done.
    pub fn done(&self) -> Result<()> {
        if self.core.borrow_mut().mark_done() {
            Ok(())
        } else {
            Err(Error::Pipe)
        }
    }

    /// The channel's fixed buffering capacity.
    pub fn capacity(&self) -> usize {
        self.core.borrow().capacity()
    }

    /// Whether the channel has been marked done.
    pub fn is_done(&self) -> bool {
        self.core.borrow().is_done()
    }

    /// The timer this channel was created with, for arming a shared
    /// deadline across a [`crate::choose`] call that mixes clauses from
    /// several channels.
    pub fn timer(&self) -> Rc<dyn Timer> {
        self.timer.clone()
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            timer: self.timer.clone(),
        }
    }
}

/// The receiving half of a channel.
pub struct Receiver<T> {
    pub(crate) core: Rc<RefCell<ChannelCore<T>>>,
    pub(crate) timer: Rc<dyn Timer>,
}

impl<T> Receiver<T> {
    /// Receives a value, parking until one is available, the deadline
    /// elapses, or the channel closes with nothing left to drain.
    pub fn recv(&self, deadline: i64) -> RecvFuture<T> {
        RecvFuture::new(self.core.clone(), self.timer.clone(), deadline)
    }

    /// Builds a [`RecvCase`] clause for use with [`crate::choose`],
    /// writing its eventual result into `out`.
    pub fn case<'a>(&'a self, out: &'a mut Option<T>) -> RecvCase<'a, T> {
        RecvCase::new(&self.core, out)
    }

    /// The channel's fixed buffering capacity.
    pub fn capacity(&self) -> usize {
        self.core.borrow().capacity()
    }

    /// Whether the channel has been marked done.
    pub fn is_done(&self) -> bool {
        self.core.borrow().is_done()
    }

    /// See [`Sender::timer`].
    pub fn timer(&self) -> Rc<dyn Timer> {
        self.timer.clone()
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            timer: self.timer.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTimer;
    use futures::executor::block_on;

    #[test]
    fn buffered_channel_round_trips() {
        let timer: Rc<dyn Timer> = Rc::new(ManualTimer::new());
        let (tx, rx) = channel_with_timer::<i32>(2, timer);
        block_on(tx.send(1, -1)).unwrap();
        block_on(tx.send(2, -1)).unwrap();
        assert_eq!(block_on(rx.recv(-1)).unwrap(), 1);
        assert_eq!(block_on(rx.recv(-1)).unwrap(), 2);
    }

    #[test]
    fn done_then_send_fails_pipe_but_buffer_still_drains() {
        let timer: Rc<dyn Timer> = Rc::new(ManualTimer::new());
        let (tx, rx) = channel_with_timer::<char>(3, timer);
        block_on(tx.send('a', -1)).unwrap();
        block_on(tx.send('b', -1)).unwrap();
        tx.done().unwrap();
        assert_eq!(block_on(tx.send('c', -1)), Err(Error::Pipe));
        assert_eq!(block_on(rx.recv(-1)).unwrap(), 'a');
        assert_eq!(block_on(rx.recv(-1)).unwrap(), 'b');
        assert_eq!(block_on(rx.recv(-1)), Err(Error::Pipe));
        assert_eq!(tx.done(), Err(Error::Pipe));
    }

    #[test]
    fn clone_shares_the_same_channel() {
        let timer: Rc<dyn Timer> = Rc::new(ManualTimer::new());
        let (tx, rx) = channel_with_timer::<i32>(1, timer);
        let tx2 = tx.clone();
        block_on(tx2.send(5, -1)).unwrap();
        assert_eq!(block_on(rx.recv(-1)).unwrap(), 5);
    }
}

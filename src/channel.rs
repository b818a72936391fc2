//! The channel's synchronization core.
//!
//! Everything here runs to completion without suspending; the only
//! suspension point a caller ever sees is constructed one layer up, in
//! `future.rs`, around the `Park` outcomes this module returns. That
//! split mirrors the channel object holding state while the scheduler
//! glue (here, a `Future` impl) drives suspension and resumption.

use std::cell::{RefCell, UnsafeCell};
use std::mem::MaybeUninit;
use std::rc::Rc;

use crate::ring::RingBuffer;
use crate::waiter::{Outcome, RecvWaiter, SendWaiter, WaitTicket, WaiterQueue};

/// Result of a non-parking send attempt.
pub(crate) enum TrySend<T> {
    /// Handed off or buffered; nothing further to do.
    Delivered,
    /// No room and no waiting receiver; the value is handed back so the
    /// caller can park it.
    Full(T),
    /// The channel is done; the value is handed back unconsumed.
    Pipe(T),
}

/// Result of a non-parking receive attempt.
pub(crate) enum TryRecv<T> {
    Delivered(T),
    Empty,
    Pipe,
}

/// The mutable state described by the channel's data model: a bounded
/// ring, the two FIFO waiter lists, and the `done` bit.
pub(crate) struct ChannelCore<T> {
    ring: RingBuffer<UnsafeCell<MaybeUninit<T>>>,
    capacity: usize,
    first: usize,
    count: usize,
    send_waiters: WaiterQueue<SendWaiter<T>>,
    recv_waiters: WaiterQueue<RecvWaiter<T>>,
    done: bool,
}

impl<T> ChannelCore<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            ring: RingBuffer::with_capacity(capacity),
            capacity,
            first: 0,
            count: 0,
            send_waiters: WaiterQueue::new(),
            recv_waiters: WaiterQueue::new(),
            done: false,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done
    }

    /// A send-clause is ready if the channel isn't done and either a
    /// receiver is already waiting or the buffer has room; a done channel
    /// also counts as ready, so a `choose` surfaces `Pipe` for it instead
    /// of parking.
    pub(crate) fn send_ready(&self) -> bool {
        self.done || !self.recv_waiters.is_empty() || self.count < self.capacity
    }

    /// A receive-clause is ready if there's a buffered item, a waiting
    /// sender, or the channel has gone done (so the caller can observe
    /// the close rather than park forever).
    pub(crate) fn recv_ready(&self) -> bool {
        self.count > 0 || !self.send_waiters.is_empty() || self.done
    }

    #[cfg(test)]
    pub(crate) fn send_waiter_count(&self) -> usize {
        self.send_waiters.len()
    }

    #[cfg(test)]
    pub(crate) fn recv_waiter_count(&self) -> usize {
        self.recv_waiters.len()
    }

    /// Attempts direct hand-off or buffered enqueue without parking.
    ///
    /// Hand-off takes precedence over the buffer only when I3 already
    /// holds (a recv-waiter implies `count == 0`); when a buffered
    /// channel has room the buffered path is taken instead, exactly as
    /// laid out for the send fast path.
    pub(crate) fn try_send(&mut self, value: T) -> TrySend<T> {
        if self.done {
            return TrySend::Pipe(value);
        }
        if let Some(r) = self.pop_live_recv_waiter() {
            debug_assert_eq!(self.count, 0, "I3: recv waiters imply empty buffer");
            *r.slot.borrow_mut() = Some(value);
            r.ticket.resolve(Outcome::Ready, r.clause_index);
            self.check_invariants();
            return TrySend::Delivered;
        }
        if self.count < self.capacity {
            let idx = self.ring.index(self.first + self.count);
            unsafe { self.ring.write(idx, value) };
            self.count += 1;
            self.check_invariants();
            return TrySend::Delivered;
        }
        TrySend::Full(value)
    }

    /// Parks a send clause, returning the shared slot so the caller's
    /// future can later observe whether its value was consumed.
    pub(crate) fn park_send(
        &mut self,
        value: T,
        ticket: WaitTicket,
        clause_index: usize,
    ) -> Rc<RefCell<Option<T>>> {
        debug_assert_eq!(self.count, self.capacity, "I2: send waiters imply full buffer");
        log::trace!(
            "parking send clause {clause_index} (capacity {}, {} already waiting)",
            self.capacity,
            self.send_waiters.len()
        );
        let slot = Rc::new(RefCell::new(Some(value)));
        self.send_waiters.push_back(SendWaiter {
            slot: slot.clone(),
            ticket,
            clause_index,
        });
        slot
    }

    /// Withdraws a previously parked send clause (deadline fired, or it
    /// lost a `choose`). Returns the value if it was never handed off.
    pub(crate) fn cancel_send(&mut self, ticket: &WaitTicket) -> Option<T> {
        let waiter = self.send_waiters.remove(ticket)?;
        waiter.slot.borrow_mut().take()
    }

    /// Buffer read, with the "refill from a waiting sender" step that
    /// keeps I2 intact when a full buffer also had a parked sender.
    pub(crate) fn try_recv(&mut self) -> TryRecv<T> {
        if self.count > 0 {
            let idx = self.ring.index(self.first);
            let value = unsafe { self.ring.read(idx) };
            self.first = if self.capacity == 0 { 0 } else { (self.first + 1) % self.capacity };
            self.count -= 1;
            if let Some(s) = self.pop_live_send_waiter() {
                let v = s
                    .slot
                    .borrow_mut()
                    .take()
                    .expect("parked sender's slot holds its value until triggered");
                let idx = self.ring.index(self.first + self.count);
                unsafe { self.ring.write(idx, v) };
                self.count += 1;
                s.ticket.resolve(Outcome::Ready, s.clause_index);
            }
            self.check_invariants();
            return TryRecv::Delivered(value);
        }
        if let Some(s) = self.pop_live_send_waiter() {
            debug_assert_eq!(self.capacity, 0, "rendezvous read only when unbuffered");
            let v = s
                .slot
                .borrow_mut()
                .take()
                .expect("parked sender's slot holds its value until triggered");
            s.ticket.resolve(Outcome::Ready, s.clause_index);
            self.check_invariants();
            return TryRecv::Delivered(v);
        }
        if self.done {
            return TryRecv::Pipe;
        }
        TryRecv::Empty
    }

    /// Parks a receive clause, returning the slot its result will land
    /// in.
    pub(crate) fn park_recv(&mut self, ticket: WaitTicket, clause_index: usize) -> Rc<RefCell<Option<T>>> {
        debug_assert_eq!(self.count, 0, "I3: recv waiters imply empty buffer");
        log::trace!(
            "parking recv clause {clause_index} ({} already waiting)",
            self.recv_waiters.len()
        );
        let slot = Rc::new(RefCell::new(None));
        self.recv_waiters.push_back(RecvWaiter {
            slot: slot.clone(),
            ticket,
            clause_index,
        });
        slot
    }

    /// Withdraws a previously parked receive clause.
    pub(crate) fn cancel_recv(&mut self, ticket: &WaitTicket) {
        self.recv_waiters.remove(ticket);
    }

    /// Marks the channel done, draining and firing every waiter with
    /// `Pipe`. Fails if already done.
    pub(crate) fn mark_done(&mut self) -> bool {
        if self.done {
            return false;
        }
        self.done = true;
        let drained = self.send_waiters.len() + self.recv_waiters.len();
        for w in self.send_waiters.drain_all() {
            w.ticket.resolve(Outcome::Pipe, w.clause_index);
        }
        for w in self.recv_waiters.drain_all() {
            w.ticket.resolve(Outcome::Pipe, w.clause_index);
        }
        log::debug!("channel marked done, draining {drained} waiter(s) with Pipe");
        self.check_invariants();
        true
    }

    /// Pops the head of `send_waiters`, discarding any entries whose
    /// ticket has already been resolved by a sibling `choose` clause on a
    /// different channel.
    ///
    /// A `choose` call parks one sub-clause per channel sharing one
    /// ticket; the moment any sibling fires, the ticket resolves, but the
    /// losing sub-clauses are only unregistered from their own channels
    /// once the `choose` task is rescheduled and runs its cancel pass.
    /// Until then a stale, already-resolved entry can still be sitting at
    /// the front of this queue. Firing it anyway would hand a real
    /// sender's value to a clause nobody will ever collect — the value's
    /// destination (a `SendCase`'s `collect`) is never invoked for a
    /// losing index, so it would vanish silently. Skipping stale entries
    /// here, rather than at parking time, is what `WaitTicket::is_resolved`
    /// exists for.
    fn pop_live_send_waiter(&mut self) -> Option<SendWaiter<T>> {
        while let Some(w) = self.send_waiters.pop_front() {
            if w.ticket.is_resolved() {
                log::trace!("dropping stale send waiter already resolved by a sibling clause");
                continue;
            }
            return Some(w);
        }
        None
    }

    /// Mirror of [`Self::pop_live_send_waiter`] for `recv_waiters`.
    fn pop_live_recv_waiter(&mut self) -> Option<RecvWaiter<T>> {
        while let Some(w) = self.recv_waiters.pop_front() {
            if w.ticket.is_resolved() {
                log::trace!("dropping stale recv waiter already resolved by a sibling clause");
                continue;
            }
            return Some(w);
        }
        None
    }

    #[inline]
    fn check_invariants(&self) {
        debug_assert!(
            self.send_waiters.is_empty() || self.recv_waiters.is_empty(),
            "I1: waiter lists are never both non-empty"
        );
        debug_assert!(
            self.send_waiters.is_empty() || self.count == self.capacity,
            "I2 violated"
        );
        debug_assert!(
            self.recv_waiters.is_empty() || self.count == 0,
            "I3 violated"
        );
        debug_assert!(
            !self.done || (self.send_waiters.is_empty() && self.recv_waiters.is_empty()),
            "I4 violated"
        );
    }
}

impl<T> Drop for ChannelCore<T> {
    fn drop(&mut self) {
        for i in 0..self.count {
            let idx = self.ring.index(self.first + i);
            unsafe { self.ring.drop(idx) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waiter::WaitTicket;

    #[test]
    fn buffered_send_then_recv_round_trips() {
        let mut core = ChannelCore::<i32>::new(2);
        assert!(matches!(core.try_send(1), TrySend::Delivered));
        assert!(matches!(core.try_send(2), TrySend::Delivered));
        assert!(matches!(core.try_send(3), TrySend::Full(3)));
        match core.try_recv() {
            TryRecv::Delivered(v) => assert_eq!(v, 1),
            _ => panic!("expected a value"),
        }
        match core.try_recv() {
            TryRecv::Delivered(v) => assert_eq!(v, 2),
            _ => panic!("expected a value"),
        }
        assert!(matches!(core.try_recv(), TryRecv::Empty));
    }

    #[test]
    fn rendezvous_hands_off_to_parked_receiver() {
        let mut core = ChannelCore::<i32>::new(0);
        let ticket = WaitTicket::new();
        let slot = core.park_recv(ticket.clone(), 0);
        assert!(matches!(core.try_send(42), TrySend::Delivered));
        assert_eq!(ticket.outcome(), Some(Outcome::Ready));
        assert_eq!(slot.borrow_mut().take(), Some(42));
    }

    #[test]
    fn recv_refills_from_parked_sender_on_full_buffer() {
        let mut core = ChannelCore::<i32>::new(1);
        assert!(matches!(core.try_send(1), TrySend::Delivered));
        let ticket = WaitTicket::new();
        core.park_send(2, ticket.clone(), 0);
        match core.try_recv() {
            TryRecv::Delivered(v) => assert_eq!(v, 1),
            _ => panic!("expected a value"),
        }
        assert_eq!(ticket.outcome(), Some(Outcome::Ready));
        match core.try_recv() {
            TryRecv::Delivered(v) => assert_eq!(v, 2),
            _ => panic!("expected a value"),
        }
    }

    #[test]
    fn done_drains_waiters_with_pipe() {
        let mut core = ChannelCore::<i32>::new(0);
        let ticket = WaitTicket::new();
        core.park_recv(ticket.clone(), 0);
        assert!(core.mark_done());
        assert_eq!(ticket.outcome(), Some(Outcome::Pipe));
        assert!(!core.mark_done());
        assert!(matches!(core.try_send(1), TrySend::Pipe(1)));
        assert!(matches!(core.try_recv(), TryRecv::Pipe));
    }

    #[test]
    fn cancel_send_returns_unconsumed_value() {
        let mut core = ChannelCore::<i32>::new(0);
        let ticket = WaitTicket::new();
        core.park_send(7, ticket.clone(), 0);
        assert_eq!(core.cancel_send(&ticket), Some(7));
        assert_eq!(core.cancel_send(&ticket), None);
    }

    #[test]
    fn stale_recv_waiter_resolved_by_a_sibling_clause_is_not_fired() {
        // Stands in for a `choose` clause that lost a race on a different
        // channel: its shared ticket is already resolved, but this
        // channel's own waiter entry hasn't been unregistered yet.
        let mut core = ChannelCore::<i32>::new(0);
        let ticket = WaitTicket::new();
        let slot = core.park_recv(ticket.clone(), 0);
        ticket.resolve(Outcome::Pipe, 7);

        // An unrelated send must skip the stale entry rather than deliver
        // into it, since nobody will ever collect that delivery.
        assert!(matches!(core.try_send(99), TrySend::Full(99)));
        assert_eq!(slot.borrow_mut().take(), None);
    }

    #[test]
    fn stale_send_waiter_resolved_by_a_sibling_clause_is_not_drained() {
        let mut core = ChannelCore::<i32>::new(0);
        let ticket = WaitTicket::new();
        let slot = core.park_send(42, ticket.clone(), 0);
        ticket.resolve(Outcome::Pipe, 3);

        // An unrelated recv must skip the stale entry; the value is left
        // in the shared slot for the clause's own cleanup to reclaim.
        assert!(matches!(core.try_recv(), TryRecv::Empty));
        assert_eq!(slot.borrow_mut().take(), Some(42));
    }
}

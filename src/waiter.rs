//! Parked clauses and the waiter lists they live on.
//!
//! A parked clause does not own a payload buffer the way the original
//! byte-oriented design does (a raw pointer into the caller's stack); in
//! this crate the payload is an owned `T` moved into a slot shared
//! between the clause's future and its waiter-list entry. The slot and
//! the completion ticket together stand in for invariant I5: the value
//! stays alive because the future holds the other end of the `Rc`, and
//! the future cannot be dropped out from under a still-parked clause
//! without also unlinking it (see `Drop` impls in `future.rs`).

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::task::Waker;

/// How a parked clause was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// The counterpart completed the hand-off; the payload slot has
    /// already been filled (recv side) or drained (send side).
    Ready,
    /// The channel was marked done while this clause was parked.
    Pipe,
}

struct TicketInner {
    outcome: Cell<Option<Outcome>>,
    waker: RefCell<Option<Waker>>,
    /// Which clause index actually fired. For a plain send/recv this is
    /// always 0; under `choose` it's shared by every sub-clause's ticket
    /// clone and is how a losing sub-clause's future learns it lost.
    winner: Cell<Option<usize>>,
}

/// A shared completion cell for one parked clause.
///
/// Under `choose`, the same ticket is cloned across every sub-clause of
/// one choice call: whichever sub-clause's counterpart fires first calls
/// [`WaitTicket::resolve`] exactly once (later calls are no-ops), and
/// every sibling sub-clause observes the resolution on its own next poll
/// or wake.
#[derive(Clone)]
pub(crate) struct WaitTicket(Rc<TicketInner>);

impl WaitTicket {
    pub(crate) fn new() -> Self {
        Self(Rc::new(TicketInner {
            outcome: Cell::new(None),
            waker: RefCell::new(None),
            winner: Cell::new(None),
        }))
    }

    pub(crate) fn outcome(&self) -> Option<Outcome> {
        self.0.outcome.get()
    }

    pub(crate) fn winner(&self) -> Option<usize> {
        self.0.winner.get()
    }

    /// Resolves the ticket and wakes whoever is polling on it. Idempotent:
    /// only the first resolution is recorded, matching the channel core's
    /// single trigger-per-clause contract.
    pub(crate) fn resolve(&self, outcome: Outcome, clause_index: usize) {
        if self.0.outcome.get().is_some() {
            return;
        }
        self.0.outcome.set(Some(outcome));
        self.0.winner.set(Some(clause_index));
        if let Some(waker) = self.0.waker.borrow_mut().take() {
            waker.wake();
        }
    }

    pub(crate) fn set_waker(&self, waker: &Waker) {
        *self.0.waker.borrow_mut() = Some(waker.clone());
    }

    pub(crate) fn is_resolved(&self) -> bool {
        self.0.outcome.get().is_some()
    }

    fn ptr_eq(&self, other: &WaitTicket) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// A parked send clause: the value waiting to be handed off or buffered,
/// plus the channel-assigned clause index this entry was tagged with.
pub(crate) struct SendWaiter<T> {
    pub(crate) slot: Rc<RefCell<Option<T>>>,
    pub(crate) ticket: WaitTicket,
    pub(crate) clause_index: usize,
}

/// A parked receive clause: the slot its incoming value will be written
/// into.
pub(crate) struct RecvWaiter<T> {
    pub(crate) slot: Rc<RefCell<Option<T>>>,
    pub(crate) ticket: WaitTicket,
    pub(crate) clause_index: usize,
}

/// FIFO list of parked clauses for one direction on one channel.
///
/// Stands in for the intrusive doubly-linked list named in the external
/// scheduler contract (insert-tail, pop-head, unlink-anywhere, empty
/// test); a `VecDeque` gives the same asymptotics for the list sizes a
/// single cooperative process actually reaches and needs no pinning
/// tricks since entries here are plain owned data, not task stack frames.
pub(crate) struct WaiterQueue<W> {
    entries: VecDeque<W>,
}

impl<W> WaiterQueue<W> {
    pub(crate) fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    pub(crate) fn push_back(&mut self, w: W) {
        self.entries.push_back(w);
    }

    pub(crate) fn pop_front(&mut self) -> Option<W> {
        self.entries.pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn drain_all(&mut self) -> std::collections::vec_deque::Drain<'_, W> {
        self.entries.drain(..)
    }
}

impl<W> Default for WaiterQueue<W> {
    fn default() -> Self {
        Self::new()
    }
}

/// Implemented by waiter entries so a queue can unlink one by ticket
/// identity, independent of direction or payload type.
pub(crate) trait Ticketed {
    fn ticket(&self) -> &WaitTicket;
}

impl<T> Ticketed for SendWaiter<T> {
    fn ticket(&self) -> &WaitTicket {
        &self.ticket
    }
}

impl<T> Ticketed for RecvWaiter<T> {
    fn ticket(&self) -> &WaitTicket {
        &self.ticket
    }
}

impl<W: Ticketed> WaiterQueue<W> {
    /// Removes the entry whose ticket matches, wherever it sits in the
    /// list. Used to withdraw a clause that lost a `choose`, or whose
    /// deadline fired, from a channel it was also parked on.
    pub(crate) fn remove(&mut self, ticket: &WaitTicket) -> Option<W> {
        let pos = self.entries.iter().position(|w| w.ticket().ptr_eq(ticket))?;
        self.entries.remove(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_resolve_is_first_writer_wins() {
        let ticket = WaitTicket::new();
        ticket.resolve(Outcome::Ready, 3);
        ticket.resolve(Outcome::Pipe, 9);
        assert_eq!(ticket.outcome(), Some(Outcome::Ready));
        assert_eq!(ticket.winner(), Some(3));
    }

    #[test]
    fn queue_remove_by_ticket_identity() {
        let mut q: WaiterQueue<SendWaiter<i32>> = WaiterQueue::new();
        let t1 = WaitTicket::new();
        let t2 = WaitTicket::new();
        q.push_back(SendWaiter {
            slot: Rc::new(RefCell::new(Some(1))),
            ticket: t1.clone(),
            clause_index: 0,
        });
        q.push_back(SendWaiter {
            slot: Rc::new(RefCell::new(Some(2))),
            ticket: t2.clone(),
            clause_index: 0,
        });
        assert_eq!(q.len(), 2);
        let removed = q.remove(&t1).expect("present");
        assert_eq!(*removed.slot.borrow(), Some(1));
        assert_eq!(q.len(), 1);
        assert!(q.remove(&t1).is_none());
    }
}

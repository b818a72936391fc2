//! The choice engine: non-deterministic multi-way select across
//! heterogeneous send and receive clauses.
//!
//! The clause array mixes sends and receives on channels of possibly
//! different element types, so clauses are modeled as a tagged variant
//! behind an object-safe trait rather than a single generic buffer; the
//! engine polls structurally and dispatches to each clause's own
//! type-specific copy logic.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::future::LocalBoxFuture;

use crate::channel::{ChannelCore, TryRecv, TrySend};
use crate::clock::Timer;
use crate::error::{Error, Result};
use crate::shutdown::can_block;
use crate::waiter::{Outcome, WaitTicket};

/// One clause in a [`choose`] call: a send or a receive on a specific
/// channel, able to poll its own readiness, fire its fast path, park
/// itself, and withdraw a parked registration.
///
/// Not generic over the element type so that clauses of unrelated
/// channel types can sit side by side in one slice; each implementation
/// owns its own typed storage instead of writing through a shared
/// generic buffer.
pub trait Case {
    /// True if this clause could fire right now without parking.
    fn poll_ready(&self) -> bool;

    /// Executes the fast path. Only ever called when `poll_ready()` was
    /// just observed true.
    fn fire(&mut self) -> Result<()>;

    /// Parks this clause, tagging it with `clause_index` and sharing
    /// `ticket` so any sibling clause in the same `choose` call can be
    /// resolved by the same completion.
    fn park(&mut self, ticket: WaitTicket, clause_index: usize);

    /// Withdraws a parked registration for this clause, if still parked.
    fn cancel(&mut self, ticket: &WaitTicket);

    /// Pulls the final result for a clause that was parked and whose
    /// ticket has now resolved.
    fn collect(&mut self, outcome: Outcome) -> Result<()>;
}

/// A send clause: hands `value` to `channel` if and when this clause
/// fires.
pub struct SendCase<'a, T> {
    channel: &'a Rc<RefCell<ChannelCore<T>>>,
    value: Option<T>,
    slot: Option<Rc<RefCell<Option<T>>>>,
}

impl<'a, T> SendCase<'a, T> {
    pub(crate) fn new(channel: &'a Rc<RefCell<ChannelCore<T>>>, value: T) -> Self {
        Self {
            channel,
            value: Some(value),
            slot: None,
        }
    }

    /// Reclaims this clause's value after a [`choose`] call: `Some` if the
    /// clause never fired (it lost the choice, or the call timed out
    /// before parking), `None` if it was the clause that fired.
    pub fn into_value(self) -> Option<T> {
        self.value
    }
}

impl<'a, T> Case for SendCase<'a, T> {
    fn poll_ready(&self) -> bool {
        self.channel.borrow().send_ready()
    }

    fn fire(&mut self) -> Result<()> {
        let value = self.value.take().expect("fire called at most once");
        match self.channel.borrow_mut().try_send(value) {
            TrySend::Delivered => Ok(()),
            TrySend::Pipe(_) => Err(Error::Pipe),
            TrySend::Full(v) => {
                self.value = Some(v);
                unreachable!("fire is only called when poll_ready() held")
            }
        }
    }

    fn park(&mut self, ticket: WaitTicket, clause_index: usize) {
        let value = self.value.take().expect("park called at most once");
        let slot = self.channel.borrow_mut().park_send(value, ticket, clause_index);
        self.slot = Some(slot);
    }

    fn cancel(&mut self, ticket: &WaitTicket) {
        if let Some(v) = self.channel.borrow_mut().cancel_send(ticket) {
            self.value = Some(v);
            return;
        }
        // The channel-side waiter entry may already be gone: a sibling
        // clause elsewhere could have resolved our shared ticket and then
        // an unrelated operation on this channel popped and dropped our
        // now-stale entry (see `ChannelCore::pop_live_send_waiter`). Our
        // own clone of the slot survives that drop, so the value is still
        // recoverable from it rather than lost.
        if let Some(slot) = self.slot.take() {
            if let Some(v) = slot.borrow_mut().take() {
                self.value = Some(v);
            }
        }
    }

    fn collect(&mut self, outcome: Outcome) -> Result<()> {
        match outcome {
            Outcome::Ready => Ok(()),
            Outcome::Pipe => Err(Error::Pipe),
        }
    }
}

/// A receive clause: writes the delivered value into `out` if and when
/// this clause fires.
pub struct RecvCase<'a, T> {
    channel: &'a Rc<RefCell<ChannelCore<T>>>,
    out: &'a mut Option<T>,
    slot: Option<Rc<RefCell<Option<T>>>>,
}

impl<'a, T> RecvCase<'a, T> {
    pub(crate) fn new(channel: &'a Rc<RefCell<ChannelCore<T>>>, out: &'a mut Option<T>) -> Self {
        Self {
            channel,
            out,
            slot: None,
        }
    }
}

impl<'a, T> Case for RecvCase<'a, T> {
    fn poll_ready(&self) -> bool {
        self.channel.borrow().recv_ready()
    }

    fn fire(&mut self) -> Result<()> {
        match self.channel.borrow_mut().try_recv() {
            TryRecv::Delivered(v) => {
                *self.out = Some(v);
                Ok(())
            }
            TryRecv::Pipe => Err(Error::Pipe),
            TryRecv::Empty => unreachable!("fire is only called when poll_ready() held"),
        }
    }

    fn park(&mut self, ticket: WaitTicket, clause_index: usize) {
        let slot = self.channel.borrow_mut().park_recv(ticket, clause_index);
        self.slot = Some(slot);
    }

    fn cancel(&mut self, ticket: &WaitTicket) {
        self.channel.borrow_mut().cancel_recv(ticket);
    }

    fn collect(&mut self, outcome: Outcome) -> Result<()> {
        match outcome {
            Outcome::Ready => {
                let value = self
                    .slot
                    .take()
                    .and_then(|slot| slot.borrow_mut().take())
                    .expect("resolved receive clause always carries a value");
                *self.out = Some(value);
                Ok(())
            }
            Outcome::Pipe => Err(Error::Pipe),
        }
    }
}

/// Which clause settled a [`choose`] call, and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fired {
    /// Clause `0`-based index completed its operation cleanly.
    Ready(usize),
    /// Clause index whose channel turned out to be done; the clause
    /// surfaced [`Error::Pipe`] instead of completing.
    Pipe(usize),
}

impl Fired {
    /// The index of the clause that settled this call, regardless of
    /// whether it succeeded or observed `Pipe`.
    pub fn index(self) -> usize {
        match self {
            Fired::Ready(i) | Fired::Pipe(i) => i,
        }
    }
}

struct ChooseWait {
    ticket: WaitTicket,
    sleep: Option<LocalBoxFuture<'static, ()>>,
}

impl Future for ChooseWait {
    type Output = Option<usize>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(winner) = this.ticket.winner() {
            return Poll::Ready(Some(winner));
        }
        if let Some(sleep) = this.sleep.as_mut() {
            if sleep.as_mut().poll(cx).is_ready() {
                return Poll::Ready(None);
            }
        }
        this.ticket.set_waker(cx.waker());
        Poll::Pending
    }
}

/// Polls `clauses` in order for a ready one; if none is ready, parks a
/// sub-clause on every channel and waits for the first to fire or for
/// `deadline` to elapse.
///
/// Ties among simultaneously-ready clauses are broken by the lowest
/// index, matching the deterministic reference ordering; randomizing
/// this would not change correctness but is not done here.
pub async fn choose(clauses: &mut [&mut dyn Case], timer: &Rc<dyn Timer>, deadline: i64) -> Result<Fired> {
    if clauses.is_empty() {
        return Err(Error::Invalid);
    }
    if !can_block() {
        return Err(Error::Canceled);
    }

    for i in 0..clauses.len() {
        if clauses[i].poll_ready() {
            return match clauses[i].fire() {
                Ok(()) => Ok(Fired::Ready(i)),
                Err(Error::Pipe) => Ok(Fired::Pipe(i)),
                Err(e) => Err(e),
            };
        }
    }

    if deadline == 0 {
        return Err(Error::TimedOut);
    }

    log::trace!("choose: none of {} clause(s) ready, parking all", clauses.len());
    let ticket = WaitTicket::new();
    for (i, clause) in clauses.iter_mut().enumerate() {
        clause.park(ticket.clone(), i);
    }

    let sleep = (deadline > 0).then(|| timer.sleep_until(deadline as u64));
    let winner = ChooseWait {
        ticket: ticket.clone(),
        sleep,
    }
    .await;

    for clause in clauses.iter_mut() {
        clause.cancel(&ticket);
    }

    match winner {
        Some(i) => {
            log::trace!("choose: clause {i} won after parking");
            let outcome = ticket.outcome().expect("a winning wait always resolved the ticket");
            match clauses[i].collect(outcome) {
                Ok(()) => Ok(Fired::Ready(i)),
                Err(Error::Pipe) => Ok(Fired::Pipe(i)),
                Err(e) => Err(e),
            }
        }
        None => {
            log::trace!("choose: deadline elapsed before any clause fired");
            Err(Error::TimedOut)
        }
    }
}

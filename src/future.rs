//! The suspension point: `Future` impls for a parked send or receive.
//!
//! A cooperative scheduler with first-class tasks would park a clause by
//! linking it into a waiter list and yielding; polling an `async fn` that
//! does the same thing and returns `Poll::Pending` is the native Rust
//! expression of the same suspension point, matching this crate's design
//! note that the two map directly onto each other.

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

struct Parked<T> {
    ticket: WaitTicket,
    slot: Rc<RefCell<Option<T>>>,
    sleep: Option<LocalBoxFuture<'static, ()>>,
}

/// The future returned by [`crate::Sender::send`].
pub struct SendFuture<T> {
    channel: Rc<RefCell<ChannelCore<T>>>,
    timer: Rc<dyn Timer>,
    deadline: i64,
    value: Option<T>,
    parked: Option<Parked<T>>,
}

impl<T> SendFuture<T> {
    pub(crate) fn new(channel: Rc<RefCell<ChannelCore<T>>>, timer: Rc<dyn Timer>, deadline: i64, value: T) -> Self {
        Self {
            channel,
            timer,
            deadline,
            value: Some(value),
            parked: None,
        }
    }
}

impl<T> Future for SendFuture<T> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(parked) = &mut this.parked {
            if let Some(outcome) = parked.ticket.outcome() {
                this.parked = None;
                return Poll::Ready(match outcome {
                    Outcome::Ready => Ok(()),
                    Outcome::Pipe => Err(Error::Pipe),
                });
            }
            if let Some(sleep) = parked.sleep.as_mut() {
                if sleep.as_mut().poll(cx).is_ready() {
                    let ticket = parked.ticket.clone();
                    this.channel.borrow_mut().cancel_send(&ticket);
                    this.parked = None;
                    return Poll::Ready(Err(Error::TimedOut));
                }
            }
            parked.ticket.set_waker(cx.waker());
            return Poll::Pending;
        }

        if !can_block() {
            return Poll::Ready(Err(Error::Canceled));
        }

        let value = this
            .value
            .take()
            .expect("SendFuture polled again after completing");
        let mut core = this.channel.borrow_mut();
        match core.try_send(value) {
            TrySend::Delivered => Poll::Ready(Ok(())),
            TrySend::Pipe(_) => Poll::Ready(Err(Error::Pipe)),
            TrySend::Full(v) => {
                if this.deadline == 0 {
                    return Poll::Ready(Err(Error::TimedOut));
                }
                let ticket = WaitTicket::new();
                ticket.set_waker(cx.waker());
                let slot = core.park_send(v, ticket.clone(), 0);
                drop(core);
                let sleep = (this.deadline > 0).then(|| this.timer.sleep_until(this.deadline as u64));
                this.parked = Some(Parked { ticket, slot, sleep });
                Poll::Pending
            }
        }
    }
}

impl<T> Drop for SendFuture<T> {
    fn drop(&mut self) {
        if let Some(parked) = self.parked.take() {
            if parked.ticket.outcome().is_none() {
                self.channel.borrow_mut().cancel_send(&parked.ticket);
            }
        }
    }
}

/// The future returned by [`crate::Receiver::recv`].
pub struct RecvFuture<T> {
    channel: Rc<RefCell<ChannelCore<T>>>,
    timer: Rc<dyn Timer>,
    deadline: i64,
    parked: Option<Parked<T>>,
}

impl<T> RecvFuture<T> {
    pub(crate) fn new(channel: Rc<RefCell<ChannelCore<T>>>, timer: Rc<dyn Timer>, deadline: i64) -> Self {
        Self {
            channel,
            timer,
            deadline,
            parked: None,
        }
    }
}

impl<T> Future for RecvFuture<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(parked) = &mut this.parked {
            if let Some(outcome) = parked.ticket.outcome() {
                let slot = parked.slot.clone();
                this.parked = None;
                return Poll::Ready(match outcome {
                    Outcome::Ready => Ok(slot
                        .borrow_mut()
                        .take()
                        .expect("resolved receive waiter always has its value")),
                    Outcome::Pipe => Err(Error::Pipe),
                });
            }
            if let Some(sleep) = parked.sleep.as_mut() {
                if sleep.as_mut().poll(cx).is_ready() {
                    let ticket = parked.ticket.clone();
                    this.channel.borrow_mut().cancel_recv(&ticket);
                    this.parked = None;
                    return Poll::Ready(Err(Error::TimedOut));
                }
            }
            parked.ticket.set_waker(cx.waker());
            return Poll::Pending;
        }

        if !can_block() {
            return Poll::Ready(Err(Error::Canceled));
        }

        let mut core = this.channel.borrow_mut();
        match core.try_recv() {
            TryRecv::Delivered(v) => Poll::Ready(Ok(v)),
            TryRecv::Pipe => Poll::Ready(Err(Error::Pipe)),
            TryRecv::Empty => {
                if this.deadline == 0 {
                    return Poll::Ready(Err(Error::TimedOut));
                }
                let ticket = WaitTicket::new();
                ticket.set_waker(cx.waker());
                let slot = core.park_recv(ticket.clone(), 0);
                drop(core);
                let sleep = (this.deadline > 0).then(|| this.timer.sleep_until(this.deadline as u64));
                this.parked = Some(Parked { ticket, slot, sleep });
                Poll::Pending
            }
        }
    }
}

impl<T> Drop for RecvFuture<T> {
    fn drop(&mut self) {
        if let Some(parked) = self.parked.take() {
            if parked.ticket.outcome().is_none() {
                self.channel.borrow_mut().cancel_recv(&parked.ticket);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTimer;
    use futures::executor::block_on;

    #[test]
    fn send_then_recv_unbuffered_hands_off() {
        let channel = Rc::new(RefCell::new(ChannelCore::<i32>::new(0)));
        let timer: Rc<dyn Timer> = Rc::new(ManualTimer::new());

        let recv = RecvFuture::new(channel.clone(), timer.clone(), -1);
        let send = SendFuture::new(channel, timer, -1, 7);

        let (sent, received) = block_on(futures::future::join(send, recv));
        assert!(sent.is_ok());
        assert_eq!(received.unwrap(), 7);
    }

    #[test]
    fn recv_immediate_deadline_times_out_on_empty_channel() {
        let channel = Rc::new(RefCell::new(ChannelCore::<i32>::new(1)));
        let timer: Rc<dyn Timer> = Rc::new(ManualTimer::new());
        let recv = RecvFuture::new(channel, timer, 0);
        assert_eq!(block_on(recv), Err(Error::TimedOut));
    }

    #[test]
    fn send_deadline_elapses_while_parked() {
        let channel = Rc::new(RefCell::new(ChannelCore::<i32>::new(0)));
        let manual = ManualTimer::new();
        let timer: Rc<dyn Timer> = Rc::new(manual.clone());
        let mut send = Box::pin(SendFuture::new(channel.clone(), timer, 10, 1));

        assert_eq!(futures::poll!(send.as_mut()), Poll::Pending);
        manual.advance(10);
        assert_eq!(futures::poll!(send.as_mut()), Poll::Ready(Err(Error::TimedOut)));
        assert_eq!(channel.borrow().send_waiter_count(), 0);
    }
}

//! A CSP-style channel for cooperatively-scheduled tasks.
//!
//! A [`channel`] is a typed FIFO conduit between producers and consumers
//! running as `async` tasks on a single executor. It behaves like a
//! bounded queue that smoothly degrades to a zero-copy rendezvous at
//! capacity zero, and it composes into a non-deterministic multi-way
//! [`choose`] across any number of send/receive clauses on unrelated
//! channel types.
//!
//! ## How it works
//!
//! ```text
//!            send_waiters (FIFO)             recv_waiters (FIFO)
//!                   │                                │
//!     parked   ┌────┴────┐    ring buffer    ┌────────┴──┐  parked
//!     senders  │ s0 │ s1 │  ┌───┬───┬───┐    │ r0 │ r1 │  │  receivers
//!              └─────────┘  │ v0│ v1│   │    └────────────┘
//!                            └───┴───┴───┘
//! ```
//!
//! - A `send` either hands its value straight to a parked receiver, or
//!   enqueues it in the ring buffer, or parks as a send-waiter.
//! - A `recv` mirrors this: it drains the buffer (refilling from a
//!   parked sender if one exists), rendezvous-reads from a parked
//!   sender directly, or parks as a recv-waiter.
//! - `send_waiters` and `recv_waiters` are never both non-empty: a
//!   channel is always either under pressure from one side or idle.
//!
//! Only one task runs at a time; channel state is plain `Cell`/`RefCell`
//! data, not atomics, because nothing here is ever touched concurrently.
//!
//! ## Example
//!
//! ```
//! use baton::channel;
//! use futures::executor::block_on;
//!
//! let (tx, rx) = channel::<i32>(2);
//! block_on(tx.send(1, -1)).unwrap();
//! block_on(tx.send(2, -1)).unwrap();
//! assert_eq!(block_on(rx.recv(-1)).unwrap(), 1);
//! assert_eq!(block_on(rx.recv(-1)).unwrap(), 2);
//! ```
//!
//! ## Choosing among clauses
//!
//! ```
//! use baton::{channel, choose, Fired};
//! use futures::executor::block_on;
//!
//! let (tx_x, rx_x) = channel::<i32>(1);
//! let (tx_y, rx_y) = channel::<i32>(1);
//! block_on(tx_y.send(7, -1)).unwrap();
//!
//! let mut recv_out = None;
//! let mut send_case = tx_x.case(9);
//! let mut recv_case = rx_y.case(&mut recv_out);
//! let mut clauses: Vec<&mut dyn baton::Case> = vec![&mut send_case, &mut recv_case];
//!
//! let fired = block_on(choose(&mut clauses, &tx_x.timer(), -1)).unwrap();
//! assert_eq!(fired, Fired::Ready(0));
//! assert_eq!(block_on(rx_x.recv(-1)).unwrap(), 9);
//! ```

mod channel;
mod clock;
mod error;
mod future;
mod handle;
mod ring;
mod select;
mod shutdown;
mod waiter;

pub use clock::{ManualTimer, SystemTimer, Timer};
pub use error::{Error, Result};
pub use future::{RecvFuture, SendFuture};
pub use handle::{channel, channel_with_timer, Receiver, Sender};
pub use select::{choose, Case, Fired, RecvCase, SendCase};
pub use shutdown::{begin_shutdown, can_block};

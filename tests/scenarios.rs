//! End-to-end scenarios exercising the public API as a caller would,
//! driven by a single-threaded executor and a manual clock so deadline
//! behavior is deterministic.

use std::rc::Rc;

use baton::{channel, channel_with_timer, choose, Case, Error, Fired, ManualTimer, Timer};
use futures::executor::block_on;
use futures_test::{assert_pending, assert_ready_eq};

#[test]
fn unbuffered_rendezvous() {
    // Scenario 1: an unbuffered channel hands a value directly from a
    // parked sender to an arriving receiver with nothing ever buffered.
    let _ = env_logger::try_init();

    let (tx, rx) = channel::<i32>(0);

    let send = tx.send(42, -1);
    let recv = rx.recv(-1);
    let (sent, received) = block_on(futures::future::join(send, recv));

    assert!(sent.is_ok());
    assert_eq!(received.unwrap(), 42);
    assert_eq!(tx.capacity(), 0);
}

#[test]
fn buffered_flow_refills_from_parked_sender() {
    // Scenario 2: a capacity-2 buffer with a third send parked, drained by
    // three receives; the parked sender's value rotates into the freed
    // slot exactly once.
    let (tx, rx) = channel::<i32>(2);

    block_on(tx.send(1, -1)).unwrap();
    block_on(tx.send(2, -1)).unwrap();

    let mut third = Box::pin(tx.send(3, -1));
    assert_pending!(futures::poll!(third.as_mut()));

    assert_eq!(block_on(rx.recv(-1)).unwrap(), 1);
    // The parked send has now been admitted into the buffer.
    assert_ready_eq!(futures::poll!(third.as_mut()), Ok(()));

    assert_eq!(block_on(rx.recv(-1)).unwrap(), 2);
    assert_eq!(block_on(rx.recv(-1)).unwrap(), 3);
}

#[test]
fn close_with_drainable_buffer() {
    // Scenario 3: done() stops new sends but buffered items still drain;
    // once empty, recv also observes Pipe.
    let (tx, rx) = channel::<char>(3);

    block_on(tx.send('a', -1)).unwrap();
    block_on(tx.send('b', -1)).unwrap();
    tx.done().unwrap();

    assert_eq!(block_on(tx.send('c', -1)), Err(Error::Pipe));
    assert_eq!(block_on(rx.recv(-1)).unwrap(), 'a');
    assert_eq!(block_on(rx.recv(-1)).unwrap(), 'b');
    assert_eq!(block_on(rx.recv(-1)), Err(Error::Pipe));
}

#[test]
fn choice_with_one_ready_clause() {
    // Scenario 4: channel X is empty with room, channel Y already holds a
    // value; both clauses are ready, so the lowest-index clause (send on
    // X) wins.
    let (tx_x, rx_x) = channel::<i32>(1);
    let (tx_y, rx_y) = channel::<i32>(1);
    block_on(tx_y.send(7, -1)).unwrap();

    let mut recv_out = None;
    let mut send_case = tx_x.case(9);
    let mut recv_case = rx_y.case(&mut recv_out);
    let mut clauses: Vec<&mut dyn Case> = vec![&mut send_case, &mut recv_case];

    let fired = block_on(choose(&mut clauses, &tx_x.timer(), -1)).unwrap();
    assert_eq!(fired, Fired::Ready(0));
    assert_eq!(block_on(rx_x.recv(-1)).unwrap(), 9);
    assert_eq!(recv_out, None, "the unchosen recv clause did not fire");
}

#[test]
fn choice_parks_then_times_out() {
    // Scenario 5: both clauses are unsatisfiable, so choose parks on both
    // channels and returns TimedOut once the shared deadline elapses,
    // leaving no trace of the parked sub-clauses behind.
    let manual = ManualTimer::new();
    let timer: Rc<dyn Timer> = Rc::new(manual.clone());
    let (tx_x, _rx_x) = channel_with_timer::<i32>(0, timer.clone());
    let (_tx_y, rx_y) = channel_with_timer::<i32>(0, timer.clone());

    let mut recv_out = None;
    let mut send_case = tx_x.case(1);
    let mut recv_case = rx_y.case(&mut recv_out);
    let mut clauses: Vec<&mut dyn Case> = vec![&mut send_case, &mut recv_case];

    let mut fut = Box::pin(choose(&mut clauses, &timer, 10));
    assert_pending!(futures::poll!(fut.as_mut()));
    manual.advance(10);
    assert_ready_eq!(futures::poll!(fut.as_mut()), Err(Error::TimedOut));
}

#[test]
fn choice_parks_then_fires_on_counterpart() {
    // Scenario 6: choose parks a send clause on X; a plain recv on X from
    // another task completes it, and choose reports the winning clause.
    let (tx_x, rx_x) = channel::<i32>(0);
    let (_tx_y, rx_y) = channel::<i32>(0);

    let mut recv_out = None;
    let mut send_case = tx_x.case(1);
    let mut recv_case = rx_y.case(&mut recv_out);
    let mut clauses: Vec<&mut dyn Case> = vec![&mut send_case, &mut recv_case];

    let mut fut = Box::pin(choose(&mut clauses, &tx_x.timer(), -1));
    assert_pending!(futures::poll!(fut.as_mut()));

    let counterpart = rx_x.recv(-1);
    let (fired, delivered) = block_on(futures::future::join(fut, counterpart));

    assert_eq!(fired.unwrap(), Fired::Ready(0));
    assert_eq!(delivered.unwrap(), 1);
    assert_eq!(rx_y.capacity(), 0);
}

#[test]
fn signal_channel_with_zero_sized_payload() {
    // Boundary: T = () channels act as pure signals.
    let (tx, rx) = channel::<()>(1);
    block_on(tx.send((), -1)).unwrap();
    assert_eq!(block_on(rx.recv(-1)), Ok(()));
}

#[test]
fn immediate_deadline_never_parks() {
    // Boundary: deadline == 0 fails fast instead of parking.
    let (tx, _rx) = channel::<i32>(0);
    assert_eq!(block_on(tx.send(1, 0)), Err(Error::TimedOut));
}

#[test]
fn fifo_order_is_preserved_across_buffer_and_rendezvous() {
    // P4: values sent in order are received in the same order, whether or
    // not the buffer was ever actually full.
    let (tx, rx) = channel::<i32>(2);
    block_on(tx.send(1, -1)).unwrap();
    block_on(tx.send(2, -1)).unwrap();
    assert_eq!(block_on(rx.recv(-1)).unwrap(), 1);
    assert_eq!(block_on(rx.recv(-1)).unwrap(), 2);

    for v in 3..=5 {
        block_on(tx.send(v, -1)).unwrap();
        assert_eq!(block_on(rx.recv(-1)).unwrap(), v);
    }
}

#[test]
fn done_is_not_idempotent_but_drain_still_completes() {
    // L2: done() is idempotent against the invariants (never double-drains
    // waiter lists) but its second call is reported as Pipe to the caller.
    let (tx, _rx) = channel::<i32>(1);
    assert!(tx.done().is_ok());
    assert_eq!(tx.done(), Err(Error::Pipe));
}

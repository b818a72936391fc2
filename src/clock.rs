//! The timer/deadline collaborator.
//!
//! A channel operation's `deadline` is an absolute instant, not a duration:
//! callers compute `now + budget` once and pass the result down, which is
//! what lets a [`choose`](crate::choose) over several clauses arm a single
//! shared timer instead of one per clause. Arming that timer and reporting
//! elapsed time is delegated to a [`Timer`] implementation rather than
//! baked into the channel core, mirroring how the real scheduler,
//! handle table, and waiter-list utility are kept outside this crate's
//! synchronization logic.

use futures::future::LocalBoxFuture;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A source of time and of deadline-expiry futures for parked operations.
///
/// Implementations must be cheap to clone (wrapped in an `Rc` by callers)
/// and `sleep_until` must be safe to call from the single task driving a
/// channel's cooperative scheduler; no internal locking is required.
pub trait Timer {
    /// The current time, in milliseconds, on the same clock that
    /// `deadline` parameters are measured against.
    fn now_ms(&self) -> u64;

    /// A future that resolves once `deadline_ms` has passed. Dropping the
    /// future before it resolves cancels the wait with no side effects.
    fn sleep_until(&self, deadline_ms: u64) -> LocalBoxFuture<'static, ()>;
}

/// The default [`Timer`]: wall-clock time, with deadlines served by a
/// short-lived background thread per outstanding sleep.
///
/// This is the one piece of the crate that is not single-threaded: arming
/// a real-time wakeup without cooperation from an external scheduler
/// inherently needs *something* outside the current task to notice time
/// passing. A full scheduler integration (an event loop driving a timer
/// wheel) would replace this with a zero-thread implementation; this one
/// exists so the crate is usable without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimer;

impl SystemTimer {
    /// Milliseconds since the Unix epoch, saturating at zero if the clock
    /// is somehow set before it.
    fn unix_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

impl Timer for SystemTimer {
    fn now_ms(&self) -> u64 {
        Self::unix_ms()
    }

    fn sleep_until(&self, deadline_ms: u64) -> LocalBoxFuture<'static, ()> {
        let now = Self::unix_ms();
        let remaining = deadline_ms.saturating_sub(now);
        Box::pin(Delay::new(Duration::from_millis(remaining)))
    }
}

/// A minimal, executor-agnostic "sleep for a duration" future.
///
/// Parks a background OS thread for the requested duration and wakes the
/// polling task through its [`Waker`](std::task::Waker) when it's done;
/// this is the same trick `futures-timer` and similar crates use to offer
/// timers without depending on a particular async runtime.
struct Delay {
    state: std::sync::Arc<std::sync::Mutex<DelayState>>,
}

struct DelayState {
    done: bool,
    waker: Option<std::task::Waker>,
}

impl Delay {
    fn new(duration: Duration) -> Self {
        let state = std::sync::Arc::new(std::sync::Mutex::new(DelayState {
            done: duration.is_zero(),
            waker: None,
        }));
        if !duration.is_zero() {
            let state = state.clone();
            std::thread::Builder::new()
                .name("baton-timer".into())
                .spawn(move || {
                    std::thread::sleep(duration);
                    let mut guard = state.lock().unwrap();
                    guard.done = true;
                    if let Some(waker) = guard.waker.take() {
                        waker.wake();
                    }
                })
                .expect("failed to spawn timer thread");
        }
        Self { state }
    }
}

impl std::future::Future for Delay {
    type Output = ();

    fn poll(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<()> {
        let mut guard = self.state.lock().unwrap();
        if guard.done {
            std::task::Poll::Ready(())
        } else {
            guard.waker = Some(cx.waker().clone());
            std::task::Poll::Pending
        }
    }
}

/// A [`Timer`] for tests: time only advances when [`ManualTimer::advance`]
/// is called, which makes deadline behavior deterministic without
/// sleeping the test thread.
#[derive(Debug, Clone, Default)]
pub struct ManualTimer {
    inner: std::rc::Rc<std::cell::RefCell<ManualInner>>,
}

#[derive(Debug, Default)]
struct ManualInner {
    now_ms: u64,
    wakers: Vec<(u64, std::task::Waker)>,
}

impl ManualTimer {
    /// Creates a manual timer starting at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the timer's clock by `ms` milliseconds, waking any sleeps
    /// whose deadline has now passed.
    pub fn advance(&self, ms: u64) {
        let mut inner = self.inner.borrow_mut();
        inner.now_ms += ms;
        let now = inner.now_ms;
        inner.wakers.retain(|(deadline, waker)| {
            if *deadline <= now {
                waker.wake_by_ref();
                false
            } else {
                true
            }
        });
    }
}

impl Timer for ManualTimer {
    fn now_ms(&self) -> u64 {
        self.inner.borrow().now_ms
    }

    fn sleep_until(&self, deadline_ms: u64) -> LocalBoxFuture<'static, ()> {
        Box::pin(ManualSleep {
            timer: self.clone(),
            deadline_ms,
        })
    }
}

struct ManualSleep {
    timer: ManualTimer,
    deadline_ms: u64,
}

impl std::future::Future for ManualSleep {
    type Output = ();

    fn poll(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<()> {
        let mut inner = self.timer.inner.borrow_mut();
        if inner.now_ms >= self.deadline_ms {
            std::task::Poll::Ready(())
        } else {
            inner.wakers.push((self.deadline_ms, cx.waker().clone()));
            std::task::Poll::Pending
        }
    }
}

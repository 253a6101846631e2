//! Single-shot timer abstraction, injectable so the engine's timing logic is
//! testable without real wall-clock waits.
//!
//! The original (Go) design exposes `Reset`/`ResetAfterChan`/`Chan()` because
//! a Go `time.Timer` is channel-based: resetting a timer that already fired
//! but whose channel hasn't been drained yet silently double-fires unless the
//! caller knows which situation it's in. `tokio::time::Sleep` is poll-based
//! instead, so both reset variants collapse to the same deadline update here
//! - the distinction is kept as two methods anyway so the engine's call
//! sites read the same as the design they're grounded on, and so a future
//! `Timer` impl backed by a channel-style primitive has a place to diverge.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{self, Instant, Sleep};

/// Used to "disarm" a timer: far enough out that it will not fire during the
/// engine's lifetime, without needing an `Option<Timer>` at every call site.
pub const SENTINEL_DURATION: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// A single-shot timer the engine can await directly inside `tokio::select!`.
pub trait Timer: Future<Output = ()> + Unpin + Send {
    /// Arm the timer for `d` from now, regardless of whether a previous fire
    /// is still pending.
    fn reset(&mut self, d: Duration);

    /// Arm the timer for `d` from now, assuming the previous fire was just
    /// consumed (i.e. this is called from the branch that just observed the
    /// timer complete).
    fn reset_after_fire(&mut self, d: Duration);
}

/// Default [`Timer`] backed by `tokio::time::Sleep`.
pub struct TokioTimer {
    sleep: Pin<Box<Sleep>>,
}

impl TokioTimer {
    /// Create a timer armed with the sentinel (effectively inert) duration.
    pub fn new() -> Self {
        Self {
            sleep: Box::pin(time::sleep(SENTINEL_DURATION)),
        }
    }
}

impl Default for TokioTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Future for TokioTimer {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.sleep.as_mut().poll(cx)
    }
}

impl Timer for TokioTimer {
    fn reset(&mut self, d: Duration) {
        self.sleep.as_mut().reset(Instant::now() + d);
    }

    fn reset_after_fire(&mut self, d: Duration) {
        self.sleep.as_mut().reset(Instant::now() + d);
    }
}

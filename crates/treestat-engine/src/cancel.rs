//! Cooperative cancellation shared by the finalize workers.
//!
//! Cancelling closes a channel that every worker holds a receiver for, so
//! any blocking channel operation can race it with
//! `crossbeam_channel::select!`. The latch only ever trips once and is
//! never reset.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;

/// The cancelling side. Shared behind an `Arc`; any holder may trip it.
pub struct Canceller {
    guard: Mutex<Option<Sender<()>>>,
}

/// The observing side. Cloneable; one per worker.
#[derive(Clone)]
pub struct CancelToken {
    rx: Receiver<()>,
}

/// Create a connected canceller/token pair.
pub fn cancel_pair() -> (Canceller, CancelToken) {
    // Nothing is ever sent; dropping the sender is the signal.
    let (tx, rx) = bounded::<()>(0);
    (
        Canceller {
            guard: Mutex::new(Some(tx)),
        },
        CancelToken { rx },
    )
}

impl Canceller {
    /// Trip the latch. Idempotent.
    pub fn cancel(&self) {
        self.guard.lock().take();
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// The raw channel, for `select!` arms. It becomes ready (with a
    /// disconnect error) exactly when the latch trips.
    pub fn channel(&self) -> &Receiver<()> {
        &self.rx
    }
}

//! Quiescence-window debouncing.

use std::time::Duration;

use tokio::{
    sync::mpsc,
    time::{sleep_until, Instant},
};

/// Cloneable sender side of a [`Debouncer`]. Safe to call from non-async threads.
#[derive(Clone)]
pub struct DebounceHandle {
    tx: mpsc::Sender<()>,
}

impl DebounceHandle {
    pub fn signal(&self) {
        // A full channel already holds an undelivered event, which is all the
        // debouncer needs to know.
        let _ = self.tx.try_send(());
    }
}

/// Coalesces bursts of events into one firing.
///
/// The timer is armed on the first event and pushed back on every later one;
/// [`Debouncer::next`] resolves once no event arrived for a full window. All
/// timer state lives in the struct, so `next` can be dropped and called again
/// (for instance inside `select!`) without losing an armed timer.
pub struct Debouncer {
    window: Duration,
    rx: mpsc::Receiver<()>,
    deadline: Option<Instant>,
    pending: usize,
}

pub fn debouncer(window: Duration) -> (DebounceHandle, Debouncer) {
    let (tx, rx) = mpsc::channel(16);
    (
        DebounceHandle { tx },
        Debouncer {
            window,
            rx,
            deadline: None,
            pending: 0,
        },
    )
}

impl Debouncer {
    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Register an event directly, without going through a handle.
    pub fn record(&mut self) {
        self.pending += 1;
        self.deadline = Some(Instant::now() + self.window);
    }

    /// Wait for the next quiet period after at least one event.
    ///
    /// Returns how many events were coalesced, or `None` once every handle is
    /// dropped and nothing is pending.
    pub async fn next(&mut self) -> Option<usize> {
        loop {
            match self.deadline {
                None => {
                    self.rx.recv().await?;
                    self.record();
                }
                Some(deadline) => {
                    tokio::select! {
                        _ = sleep_until(deadline) => return Some(self.take()),
                        event = self.rx.recv() => match event {
                            Some(()) => self.record(),
                            None => {
                                sleep_until(deadline).await;
                                return Some(self.take());
                            }
                        },
                    }
                }
            }
        }
    }

    fn take(&mut self) -> usize {
        self.deadline = None;
        std::mem::take(&mut self.pending)
    }
}

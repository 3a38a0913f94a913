//! Poll loop driving a scan source over time.
//!
//! Both `scan` and `monitor` are a timed series of captures folded into one
//! session; they differ only in band/channel filtering and in how each cycle
//! is rendered.

pub mod poll_loop;

pub use poll_loop::{run, CycleReport, PollConfig, StopReason};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::warn;

/// Cooperative cancellation flag shared between the signal handler and the loop.
///
/// The loop only looks at it between cycles, so a capture in flight always
/// finishes (or times out) before the command winds down.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle that is cancelled by the first Ctrl-C.
    pub fn on_ctrl_c() -> Self {
        let cancel = Self::new();
        let handle = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing current capture");
                handle.cancel();
            }
        });
        cancel
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

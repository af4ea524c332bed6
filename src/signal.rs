//! Reply signals that let a `get_*` call wait for its notification.
//!
//! A caller arms the signal *before* queueing its query so a reply that
//! arrives immediately cannot be missed.  The notification task fulfils the
//! signal once per decoded reply, which completes every armed waiter exactly
//! once.  A waiter that gives up on timeout just drops its receiver; its
//! slot is pruned by the next `arm` or cleared by the next reply.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;

/// Which reply a waiter is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// Short power-state frame.
    State,
    /// Long brightness/pattern frame.
    Info,
}

/// One pending-reply slot per [`ReplyKind`].
#[derive(Debug, Default)]
pub struct ReplySignal {
    waiters: Mutex<Vec<oneshot::Sender<()>>>,
}

impl ReplySignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in the next reply.
    pub fn arm(&self) -> Reply {
        let (tx, rx) = oneshot::channel();
        let mut waiters = self.lock();
        // Waiters that timed out dropped their receiver; forget them.
        waiters.retain(|waiter| !waiter.is_closed());
        waiters.push(tx);
        Reply { rx }
    }

    /// Release every armed waiter.  Returns how many were still listening.
    pub fn fulfil(&self) -> usize {
        let waiters = std::mem::take(&mut *self.lock());
        waiters.into_iter().filter_map(|tx| tx.send(()).ok()).count()
    }

    /// Number of waiters registered and not yet fulfilled.
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<oneshot::Sender<()>>> {
        // A poisoned lock only means another thread panicked mid-push; the
        // vector itself is still valid.
        self.waiters.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// The waiting side of an armed [`ReplySignal`].
#[derive(Debug)]
pub struct Reply {
    rx: oneshot::Receiver<()>,
}

impl Reply {
    /// Wait for the reply for at most `timeout`.
    ///
    /// Returns `true` if the reply arrived in time.  A timeout is not an
    /// error: the caller falls back to whatever state is cached.
    pub async fn wait(self, timeout: Duration) -> bool {
        matches!(tokio::time::timeout(timeout, self.rx).await, Ok(Ok(())))
    }
}

/// The pair of signals shared by the client and the notification task.
#[derive(Debug, Default)]
pub struct ReplySignals {
    pub state: ReplySignal,
    pub info: ReplySignal,
}

impl ReplySignals {
    pub fn get(&self, kind: ReplyKind) -> &ReplySignal {
        match kind {
            ReplyKind::State => &self.state,
            ReplyKind::Info => &self.info,
        }
    }
}

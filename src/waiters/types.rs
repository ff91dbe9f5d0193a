//! Waiter types for parked long-poll requests.

use crate::types::{Changes, Timestamp};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

/// Unique identifier for a waiter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WaiterId(pub u64);

/// A parked request, owned by the registry until it is resolved.
#[derive(Debug)]
pub struct Waiter {
    id: WaiterId,
    watermark: Timestamp,
    resolver: oneshot::Sender<Changes>,
    /// Timeout timer, aborted when dispatch gets here first.
    timer: Option<AbortHandle>,
}

impl Waiter {
    pub(crate) fn new(id: WaiterId, watermark: Timestamp, resolver: oneshot::Sender<Changes>) -> Self {
        Self {
            id,
            watermark,
            resolver,
            timer: None,
        }
    }

    pub fn id(&self) -> WaiterId {
        self.id
    }

    pub fn watermark(&self) -> Timestamp {
        self.watermark
    }

    pub(crate) fn set_timer(&mut self, timer: AbortHandle) {
        self.timer = Some(timer);
    }

    /// Forget the timer without aborting it. Used by the timer itself.
    pub(crate) fn detach_timer(&mut self) {
        self.timer = None;
    }

    /// Deliver the result. Returns false if the requester already went away.
    pub fn resolve(self, changes: Changes) -> bool {
        if let Some(timer) = self.timer {
            timer.abort();
        }
        self.resolver.send(changes).is_ok()
    }
}

/// Requester's side of a parked request.
#[derive(Debug)]
pub struct WaiterHandle {
    pub id: WaiterId,
    pub watermark: Timestamp,
    /// Channel the single resolution arrives on.
    pub receiver: oneshot::Receiver<Changes>,
}

impl WaiterHandle {
    /// Wait for the resolution.
    ///
    /// Errors only if the waiter was dropped unresolved, which happens when
    /// the owning service is torn down.
    pub async fn recv(self) -> Result<Changes, oneshot::error::RecvError> {
        self.receiver.await
    }

    /// Check for a resolution without waiting.
    pub fn try_recv(&mut self) -> Result<Changes, oneshot::error::TryRecvError> {
        self.receiver.try_recv()
    }
}

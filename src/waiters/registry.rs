//! Registry of parked waiters.

use crate::types::Timestamp;
use std::collections::HashMap;
use tokio::sync::oneshot;
use tracing::trace;

use super::types::{Waiter, WaiterHandle, WaiterId};

/// The set of currently parked requests.
///
/// Not synchronised on its own. The owning service holds it under the
/// same lock as the change log, so that "check, then park" and "append,
/// then drain" never interleave.
#[derive(Debug)]
pub struct WaiterRegistry {
    /// Pending waiters by ID.
    waiters: HashMap<WaiterId, Waiter>,
    /// Counter for generating waiter IDs.
    next_id: u64,
}

impl WaiterRegistry {
    pub fn new() -> Self {
        Self {
            waiters: HashMap::new(),
            next_id: 1,
        }
    }

    /// Park a request waiting for changes after `watermark`.
    pub fn register(&mut self, watermark: Timestamp) -> WaiterHandle {
        let id = WaiterId(self.next_id);
        self.next_id += 1;

        let (sender, receiver) = oneshot::channel();
        self.waiters.insert(id, Waiter::new(id, watermark, sender));
        trace!(waiter = id.0, watermark = watermark.0, "waiter registered");

        WaiterHandle {
            id,
            watermark,
            receiver,
        }
    }

    /// Attach the timeout timer to a pending waiter.
    pub(crate) fn set_timer(&mut self, id: WaiterId, timer: tokio::task::AbortHandle) {
        match self.waiters.get_mut(&id) {
            Some(waiter) => waiter.set_timer(timer),
            None => timer.abort(),
        }
    }

    /// Take a waiter out if it is still pending.
    ///
    /// `Some` means the caller now owns the only right to resolve it;
    /// `None` means someone else already did.
    pub fn cancel(&mut self, id: WaiterId) -> Option<Waiter> {
        self.waiters.remove(&id)
    }

    /// Empty the registry, returning every pending waiter in
    /// registration order.
    pub fn drain_all(&mut self) -> Vec<Waiter> {
        let mut drained: Vec<Waiter> = self.waiters.drain().map(|(_, w)| w).collect();
        drained.sort_by_key(|w| w.id());
        drained
    }

    pub fn is_pending(&self, id: WaiterId) -> bool {
        self.waiters.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

impl Default for WaiterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Changes;

    #[test]
    fn test_register_cancel() {
        let mut registry = WaiterRegistry::new();

        let handle = registry.register(Timestamp(10));
        assert_eq!(registry.len(), 1);
        assert!(registry.is_pending(handle.id));

        let waiter = registry.cancel(handle.id).unwrap();
        assert_eq!(waiter.watermark(), Timestamp(10));
        assert!(registry.is_empty());

        // Second cancel loses.
        assert!(registry.cancel(handle.id).is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let mut registry = WaiterRegistry::new();
        let a = registry.register(Timestamp(0));
        let b = registry.register(Timestamp(0));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_drain_all_empties_in_order() {
        let mut registry = WaiterRegistry::new();
        let first = registry.register(Timestamp(1));
        let second = registry.register(Timestamp(2));
        let third = registry.register(Timestamp(3));

        let drained = registry.drain_all();
        let ids: Vec<WaiterId> = drained.iter().map(|w| w.id()).collect();
        assert_eq!(ids, vec![first.id, second.id, third.id]);
        assert!(registry.is_empty());
        assert!(registry.drain_all().is_empty());

        // Drained waiters can no longer be cancelled.
        assert!(registry.cancel(second.id).is_none());
    }

    #[test]
    fn test_resolve_delivers_once() {
        let mut registry = WaiterRegistry::new();
        let mut handle = registry.register(Timestamp(5));

        assert!(handle.try_recv().is_err());

        let waiter = registry.cancel(handle.id).unwrap();
        assert!(waiter.resolve(Changes::empty(Timestamp(6))));

        let changes = handle.try_recv().unwrap();
        assert_eq!(changes.server_time, Timestamp(6));
        assert!(changes.is_empty());
    }

    #[test]
    fn test_resolve_after_requester_left() {
        let mut registry = WaiterRegistry::new();
        let handle = registry.register(Timestamp(5));
        let id = handle.id;
        drop(handle);

        let waiter = registry.cancel(id).unwrap();
        assert!(!waiter.resolve(Changes::empty(Timestamp(6))));
    }

    #[tokio::test]
    async fn test_set_timer_on_resolved_waiter_aborts_it() {
        let mut registry = WaiterRegistry::new();
        let handle = registry.register(Timestamp(0));
        registry.cancel(handle.id);

        let timer = tokio::spawn(std::future::pending::<()>());
        registry.set_timer(handle.id, timer.abort_handle());

        let result = timer.await;
        assert!(result.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_resolve_aborts_timer() {
        let mut registry = WaiterRegistry::new();
        let handle = registry.register(Timestamp(0));

        let timer = tokio::spawn(std::future::pending::<()>());
        registry.set_timer(handle.id, timer.abort_handle());

        let waiter = registry.drain_all().pop().unwrap();
        assert!(waiter.resolve(Changes::empty(Timestamp(1))));

        assert!(timer.await.unwrap_err().is_cancelled());
        assert!(handle.recv().await.is_ok());
    }
}

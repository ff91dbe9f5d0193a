//! Service object tying the record store, change log and waiter
//! registry together.

use crate::error::Result;
use crate::records::{ChangeLog, RecordStore};
use crate::types::{
    ChangeEvent, ChangedRecord, Changes, Clock, Comment, Record, RecordInput, SystemClock,
    Timestamp, Tombstone,
};
use crate::waiters::{WaiterHandle, WaiterId, WaiterRegistry};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Default time a long poll stays parked before answering empty.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(90);

/// Service configuration.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// How long a parked request waits before it is answered with an
    /// empty change set.
    pub poll_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Everything guarded by the service lock.
#[derive(Debug, Default)]
struct State {
    records: RecordStore,
    log: ChangeLog,
    waiters: WaiterRegistry,
    /// Highest `serverTime` handed to a client so far.
    last_served: Option<Timestamp>,
}

impl State {
    /// Records changed after `watermark`, most recently changed first,
    /// one entry per key.
    fn resolve_query(&self, watermark: Timestamp) -> Vec<ChangedRecord> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        for event in self.log.entries_since(watermark) {
            if !seen.insert(event.key.as_str()) {
                continue;
            }
            match self.records.get(&event.key) {
                Some(record) => found.push(ChangedRecord::Live(record.clone())),
                None => found.push(ChangedRecord::Deleted(Tombstone::new(&event.key))),
            }
        }

        found
    }

    /// Server time to hand out. Never behind the newest change stamp or
    /// anything handed out before, and remembered so later changes are
    /// stamped strictly after it.
    fn server_time(&mut self, clock: &dyn Clock) -> Timestamp {
        let mut served = clock.now();
        if let Some(latest) = self.log.latest() {
            served = served.max(latest);
        }
        if let Some(last) = self.last_served {
            served = served.max(last);
        }
        self.last_served = Some(served);
        served
    }

    /// Stamp for a new change: strictly after any watermark a client may
    /// hold. The log raises it further if the clock stepped back.
    fn next_stamp(&self, clock: &dyn Clock) -> Timestamp {
        let now = clock.now();
        match self.last_served {
            Some(last) => now.max(Timestamp(last.0.saturating_add(1))),
            None => now,
        }
    }
}

/// Outcome of [`Service::poll`].
#[derive(Debug)]
pub enum Poll {
    /// Changes were already available.
    Ready(Changes),
    /// Nothing newer yet; the request is parked.
    Parked(WaiterHandle),
}

/// The change feed service.
///
/// Cheap to clone; clones share the same state. All mutations, parks and
/// timeouts run under one lock covering the store, the log and the
/// registry together.
#[derive(Clone)]
pub struct Service {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
    config: ServiceConfig,
}

impl Service {
    /// Create a service on the wall clock.
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a service with a custom time source.
    pub fn with_clock(config: ServiceConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            clock,
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Current server time, as reported in `serverTime`.
    pub fn server_time(&self) -> Timestamp {
        self.state.lock().server_time(self.clock.as_ref())
    }

    // --- Record Operations ---

    pub fn get(&self, key: &str) -> Option<Record> {
        self.state.lock().records.get(key).cloned()
    }

    /// Create or replace a record.
    pub fn put(&self, key: &str, input: RecordInput) {
        let mut state = self.state.lock();
        state.records.put(input.into_record(key));
        self.dispatch(&mut state, key);
    }

    /// Delete a record. Returns false if it did not exist, in which case
    /// no change is registered.
    pub fn delete(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        if state.records.delete(key).is_none() {
            return false;
        }
        self.dispatch(&mut state, key);
        true
    }

    /// Append a comment to an existing record.
    pub fn add_comment(&self, key: &str, comment: Comment) -> Result<()> {
        let mut state = self.state.lock();
        state.records.add_comment(key, comment)?;
        self.dispatch(&mut state, key);
        Ok(())
    }

    /// All current records.
    pub fn list(&self) -> Changes {
        let mut state = self.state.lock();
        Changes {
            server_time: state.server_time(self.clock.as_ref()),
            changes: state
                .records
                .list()
                .into_iter()
                .map(ChangedRecord::Live)
                .collect(),
        }
    }

    // --- Change Feed ---

    /// Records changed after `watermark`. See [`State::resolve_query`].
    pub fn resolve_query(&self, watermark: Timestamp) -> Vec<ChangedRecord> {
        self.state.lock().resolve_query(watermark)
    }

    /// Note a change to `key` made outside the record operations above and
    /// wake every parked request.
    pub fn register_change(&self, key: &str) {
        let mut state = self.state.lock();
        self.dispatch(&mut state, key);
    }

    /// Answer now if anything changed after `watermark`, otherwise park.
    ///
    /// Parking spawns the timeout timer, so this must be called from
    /// within a Tokio runtime.
    pub fn poll(&self, watermark: Timestamp) -> Poll {
        let mut state = self.state.lock();

        let changes = state.resolve_query(watermark);
        if !changes.is_empty() {
            return Poll::Ready(Changes {
                server_time: state.server_time(self.clock.as_ref()),
                changes,
            });
        }

        let handle = state.waiters.register(watermark);
        let id = handle.id;

        let service = self.clone();
        let timeout = self.config.poll_timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            service.expire(id);
        });
        state.waiters.set_timer(id, timer.abort_handle());

        debug!(
            waiter = id.0,
            watermark = watermark.0,
            pending = state.waiters.len(),
            "poll parked"
        );
        Poll::Parked(handle)
    }

    /// Long-poll for changes after `watermark`.
    ///
    /// Resolves immediately, on the next mutation, or with an empty change
    /// set once the poll timeout elapses.
    pub async fn changes_since(&self, watermark: Timestamp) -> Changes {
        match self.poll(watermark) {
            Poll::Ready(changes) => changes,
            Poll::Parked(handle) => match handle.recv().await {
                Ok(changes) => changes,
                Err(_) => Changes::empty(self.server_time()),
            },
        }
    }

    /// Number of parked requests.
    pub fn pending_waiters(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Answer every parked request with an empty change set. Used on
    /// shutdown so open polls do not hold the server up.
    pub fn release_all(&self) -> usize {
        let mut state = self.state.lock();
        let server_time = state.server_time(self.clock.as_ref());
        let waiters = state.waiters.drain_all();
        let count = waiters.len();
        for waiter in waiters {
            waiter.resolve(Changes::empty(server_time));
        }
        if count > 0 {
            debug!(count, "released parked polls");
        }
        count
    }

    /// Stamp the change, then resolve every parked request against the
    /// full change set since its own watermark.
    fn dispatch(&self, state: &mut State, key: &str) {
        let at = state.next_stamp(self.clock.as_ref());
        let stamp = state.log.append(ChangeEvent::new(key, at));
        let waiters = state.waiters.drain_all();
        debug!(
            key,
            stamp = stamp.0,
            waiters = waiters.len(),
            "change registered"
        );

        if waiters.is_empty() {
            return;
        }

        let server_time = state.server_time(self.clock.as_ref());
        for waiter in waiters {
            let id = waiter.id();
            let changes = state.resolve_query(waiter.watermark());
            if !waiter.resolve(Changes {
                server_time,
                changes,
            }) {
                trace!(waiter = id.0, "requester gone before dispatch");
            }
        }
    }

    /// Timer path. Returns true if this call resolved the waiter.
    fn expire(&self, id: WaiterId) -> bool {
        let mut state = self.state.lock();
        let Some(mut waiter) = state.waiters.cancel(id) else {
            trace!(waiter = id.0, "timer fired after dispatch");
            return false;
        };

        waiter.detach_timer();
        let server_time = state.server_time(self.clock.as_ref());
        waiter.resolve(Changes::empty(server_time));
        debug!(waiter = id.0, "poll timed out");
        true
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::types::ManualClock;

    fn test_service() -> (Service, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Timestamp(1_000)));
        let service = Service::with_clock(ServiceConfig::default(), clock.clone());
        (service, clock)
    }

    fn keys(changes: &[ChangedRecord]) -> Vec<&str> {
        changes.iter().map(|c| c.key()).collect()
    }

    #[test]
    fn test_put_and_get() {
        let (service, _) = test_service();
        service.put("alice", RecordInput::new("Alice", "S"));

        let record = service.get("alice").unwrap();
        assert_eq!(record.presenter, "Alice");
        assert!(record.comments.is_empty());
        assert!(service.get("bob").is_none());
    }

    #[test]
    fn test_resolve_query_newest_first_dedup() {
        let (service, clock) = test_service();
        let t0 = service.server_time();

        clock.advance(1);
        service.put("a", RecordInput::new("A", "first"));
        clock.advance(1);
        service.put("b", RecordInput::new("B", "S"));
        clock.advance(1);
        service.put("a", RecordInput::new("A", "second"));

        let changes = service.resolve_query(t0);
        assert_eq!(keys(&changes), vec!["a", "b"]);
        match &changes[0] {
            ChangedRecord::Live(record) => assert_eq!(record.summary, "second"),
            other => panic!("expected live record, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_query_tombstone() {
        let (service, clock) = test_service();
        service.put("alice", RecordInput::new("Alice", "S"));
        let before_delete = clock.advance(1);

        clock.advance(1);
        assert!(service.delete("alice"));

        let changes = service.resolve_query(before_delete);
        assert_eq!(changes, vec![ChangedRecord::Deleted(Tombstone::new("alice"))]);
    }

    #[test]
    fn test_delete_missing_registers_nothing() {
        let (service, _) = test_service();
        assert!(!service.delete("ghost"));
        assert!(service.resolve_query(Timestamp(i64::MIN)).is_empty());
    }

    #[test]
    fn test_comment_unknown_key() {
        let (service, _) = test_service();
        let result = service.add_comment("ghost", Comment::new("Bob", "hi"));
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
        assert!(service.resolve_query(Timestamp(i64::MIN)).is_empty());
    }

    #[test]
    fn test_watermark_is_exclusive() {
        let (service, clock) = test_service();
        let stamp = clock.advance(1);
        service.put("a", RecordInput::new("A", "S"));

        assert!(service.resolve_query(stamp).is_empty());
        assert_eq!(keys(&service.resolve_query(Timestamp(stamp.0 - 1))), vec!["a"]);
    }

    #[test]
    fn test_server_time_not_behind_log() {
        let (service, clock) = test_service();
        clock.set(Timestamp(500));
        service.put("a", RecordInput::new("A", "S"));
        clock.set(Timestamp(400));

        assert_eq!(service.server_time(), Timestamp(500));
    }

    #[tokio::test]
    async fn test_poll_ready_when_changes_exist() {
        let (service, clock) = test_service();
        let t0 = service.server_time();
        clock.advance(1);
        service.put("a", RecordInput::new("A", "S"));

        match service.poll(t0) {
            Poll::Ready(changes) => assert_eq!(keys(&changes.changes), vec!["a"]),
            Poll::Parked(_) => panic!("expected immediate answer"),
        }
        assert_eq!(service.pending_waiters(), 0);
    }

    #[tokio::test]
    async fn test_parked_poll_resolved_by_change() {
        let (service, clock) = test_service();
        let t0 = service.server_time();

        let Poll::Parked(handle) = service.poll(t0) else {
            panic!("expected park");
        };
        assert_eq!(service.pending_waiters(), 1);

        clock.advance(1);
        service.put("a", RecordInput::new("A", "S"));
        assert_eq!(service.pending_waiters(), 0);

        let changes = handle.recv().await.unwrap();
        assert_eq!(keys(&changes.changes), vec!["a"]);
        assert_eq!(changes.server_time, clock.now());
    }

    #[tokio::test]
    async fn test_change_in_served_millisecond_is_delivered() {
        let (service, clock) = test_service();
        let t0 = service.list().server_time;
        assert_eq!(t0, Timestamp(1_000));

        let Poll::Parked(handle) = service.poll(t0) else {
            panic!("expected park");
        };

        // The clock has not moved since t0 was handed out.
        service.put("alice", RecordInput::new("Alice", "S"));

        let changes = handle.recv().await.unwrap();
        assert_eq!(keys(&changes.changes), vec!["alice"]);
        assert!(changes.server_time > t0);
        assert_eq!(clock.now(), t0);

        // A client re-polling from the old watermark still sees it.
        assert_eq!(keys(&service.resolve_query(t0)), vec!["alice"]);
        assert!(service.resolve_query(changes.server_time).is_empty());
    }

    #[test]
    fn test_stamps_follow_served_time() {
        let (service, clock) = test_service();

        // Nothing served yet: stamps come straight from the clock.
        service.put("a", RecordInput::new("A", "S"));
        service.put("b", RecordInput::new("B", "S"));
        assert_eq!(keys(&service.resolve_query(Timestamp(999))), vec!["b", "a"]);
        assert!(service.resolve_query(clock.now()).is_empty());

        let served = service.server_time();
        service.put("c", RecordInput::new("C", "S"));
        assert_eq!(keys(&service.resolve_query(served)), vec!["c"]);

        // Served time does not step back with the clock.
        clock.set(Timestamp(10));
        assert!(service.server_time() > served);
    }

    #[tokio::test]
    async fn test_expire_after_dispatch_is_noop() {
        let (service, clock) = test_service();
        let Poll::Parked(mut handle) = service.poll(service.server_time()) else {
            panic!("expected park");
        };
        let id = handle.id;

        clock.advance(1);
        service.put("a", RecordInput::new("A", "S"));
        assert!(!service.expire(id));

        let changes = handle.try_recv().unwrap();
        assert_eq!(keys(&changes.changes), vec!["a"]);
    }

    #[tokio::test]
    async fn test_dispatch_after_expire_is_noop() {
        let (service, clock) = test_service();
        let Poll::Parked(mut handle) = service.poll(service.server_time()) else {
            panic!("expected park");
        };

        assert!(service.expire(handle.id));
        clock.advance(1);
        service.put("a", RecordInput::new("A", "S"));

        assert!(handle.try_recv().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_release_all() {
        let (service, _) = test_service();
        let t0 = service.server_time();
        let Poll::Parked(first) = service.poll(t0) else {
            panic!("expected park");
        };
        let Poll::Parked(second) = service.poll(t0) else {
            panic!("expected park");
        };

        assert_eq!(service.release_all(), 2);
        assert!(first.recv().await.unwrap().is_empty());
        assert!(second.recv().await.unwrap().is_empty());
        assert_eq!(service.release_all(), 0);
    }
}

//! Append-only change log.

use crate::types::{ChangeEvent, Timestamp};

/// Append-only, time-ordered list of change events.
///
/// Events are never removed or reordered. Their timestamps are
/// non-decreasing in append order, which lets readers walk backwards from
/// the newest entry and stop at the first one that is not newer than the
/// watermark.
#[derive(Debug, Default)]
pub struct ChangeLog {
    entries: Vec<ChangeEvent>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event.
    ///
    /// A stamp older than the newest entry (wall clock stepped back) is
    /// raised to the newest entry's stamp so the early-exit scan in
    /// [`ChangeLog::entries_since`] stays correct.
    pub fn append(&mut self, mut event: ChangeEvent) -> Timestamp {
        if let Some(latest) = self.latest() {
            if event.timestamp < latest {
                event.timestamp = latest;
            }
        }
        let stamp = event.timestamp;
        self.entries.push(event);
        stamp
    }

    /// Events strictly newer than `watermark`, newest first.
    pub fn entries_since(&self, watermark: Timestamp) -> EntriesSince<'_> {
        EntriesSince {
            inner: self.entries.iter().rev(),
            watermark,
            done: false,
        }
    }

    /// Timestamp of the newest entry.
    pub fn latest(&self) -> Option<Timestamp> {
        self.entries.last().map(|e| e.timestamp)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Iterator returned by [`ChangeLog::entries_since`].
pub struct EntriesSince<'a> {
    inner: std::iter::Rev<std::slice::Iter<'a, ChangeEvent>>,
    watermark: Timestamp,
    done: bool,
}

impl<'a> Iterator for EntriesSince<'a> {
    type Item = &'a ChangeEvent;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let event = self.inner.next()?;
        if event.timestamp > self.watermark {
            Some(event)
        } else {
            // Everything further back is at least as old.
            self.done = true;
            None
        }
    }
}

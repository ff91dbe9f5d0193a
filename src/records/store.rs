//! In-memory record store.

use crate::error::{Result, ServiceError};
use crate::types::{Comment, Record};
use std::collections::HashMap;

/// Records by key.
///
/// Not synchronised on its own; the owning service serialises access
/// together with the change log and waiter registry.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: HashMap<String, Record>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// Insert or replace a record. Returns the previous version.
    pub fn put(&mut self, record: Record) -> Option<Record> {
        self.records.insert(record.key.clone(), record)
    }

    pub fn delete(&mut self, key: &str) -> Option<Record> {
        self.records.remove(key)
    }

    /// Append a comment to an existing record.
    pub fn add_comment(&mut self, key: &str, comment: Comment) -> Result<()> {
        let record = self
            .records
            .get_mut(key)
            .ok_or_else(|| ServiceError::item_not_found(key))?;
        record.comments.push(comment);
        Ok(())
    }

    /// Snapshot of all records, sorted by key.
    pub fn list(&self) -> Vec<Record> {
        let mut records: Vec<Record> = self.records.values().cloned().collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

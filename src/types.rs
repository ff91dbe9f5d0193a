//! Core types for the change feed.

use crate::error::{Result, ServiceError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since Unix epoch.
///
/// Used both for stamping changes and as the watermark a client polls
/// with. Stamps are non-decreasing but not unique.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current wall-clock time.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Timestamp(i64::try_from(millis).unwrap_or(i64::MAX))
    }

    /// Parse a `changesSince` query value.
    ///
    /// Accepts what a browser client would send: integers, decimals,
    /// `0x`/`0o`/`0b` literals and the empty string (read as zero).
    /// Fractional values are floored, which keeps `stamp > watermark`
    /// exact for integer stamps.
    pub fn parse_watermark(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Timestamp(0));
        }

        let radix = match trimmed.get(..2) {
            Some("0x" | "0X") => Some(16),
            Some("0o" | "0O") => Some(8),
            Some("0b" | "0B") => Some(2),
            _ => None,
        };
        if let Some(radix) = radix {
            return parse_radix_literal(&trimmed[2..], radix);
        }

        let value: f64 = trimmed
            .parse()
            .map_err(|_| ServiceError::InvalidParameter("Invalid parameter".to_string()))?;
        if value.is_nan() {
            return Err(ServiceError::InvalidParameter("Invalid parameter".to_string()));
        }

        // `as` saturates, so +-inf land on the i64 bounds.
        Ok(Timestamp(value.floor() as i64))
    }
}

/// Unsigned digits after a radix prefix. Values past `i64::MAX` saturate.
fn parse_radix_literal(digits: &str, radix: u32) -> Result<Timestamp> {
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(ServiceError::InvalidParameter("Invalid parameter".to_string()));
    }
    let value = digits
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold(0i64, |acc, d| {
            acc.saturating_mul(i64::from(radix))
                .saturating_add(i64::from(d))
        });
    Ok(Timestamp(value))
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of logical time for change stamps and `serverTime`.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A clock that only moves when told to. Handy in tests where two
/// mutations must not share a millisecond.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: AtomicI64::new(start.0),
        }
    }

    /// Move the clock forward and return the new time.
    pub fn advance(&self, millis: i64) -> Timestamp {
        Timestamp(self.millis.fetch_add(millis, Ordering::SeqCst) + millis)
    }

    pub fn set(&self, at: Timestamp) {
        self.millis.store(at.0, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.millis.load(Ordering::SeqCst))
    }
}

/// A comment attached to a record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub message: String,
}

impl Comment {
    pub fn new(author: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            message: message.into(),
        }
    }

    /// Parse and validate a comment request body.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)?;
        let Value::Object(mut fields) = value else {
            return Err(bad_comment());
        };

        let author = take_string(&mut fields, "author").ok_or_else(bad_comment)?;
        let message = take_string(&mut fields, "message").ok_or_else(bad_comment)?;

        Ok(Self { author, message })
    }
}

fn bad_comment() -> ServiceError {
    ServiceError::ValidationFailure("Bad comment data".to_string())
}

fn bad_talk() -> ServiceError {
    ServiceError::ValidationFailure("Bad talk data".to_string())
}

fn take_string(fields: &mut Map<String, Value>, name: &str) -> Option<String> {
    match fields.remove(name) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

/// A single record (talk) in the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Identifier taken from the request path.
    pub key: String,

    pub presenter: String,

    pub summary: String,

    /// Comments in posting order.
    #[serde(default)]
    pub comments: Vec<Comment>,

    /// Any other fields the client sent with the record.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Input for creating or replacing a record (before the key is attached).
#[derive(Clone, Debug, PartialEq)]
pub struct RecordInput {
    pub presenter: String,
    pub summary: String,
    pub extra: Map<String, Value>,
}

impl RecordInput {
    pub fn new(presenter: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            presenter: presenter.into(),
            summary: summary.into(),
            extra: Map::new(),
        }
    }

    /// Parse and validate a PUT body.
    ///
    /// `presenter` and `summary` must be strings. Other fields are kept
    /// as-is, except `key`, `comments` and `deleted` which the server owns.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)?;
        let Value::Object(mut fields) = value else {
            return Err(bad_talk());
        };

        let presenter = take_string(&mut fields, "presenter").ok_or_else(bad_talk)?;
        let summary = take_string(&mut fields, "summary").ok_or_else(bad_talk)?;
        for reserved in ["key", "comments", "deleted"] {
            fields.remove(reserved);
        }

        Ok(Self {
            presenter,
            summary,
            extra: fields,
        })
    }

    /// Add an extra payload field.
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra.insert(name.into(), value);
        self
    }

    /// Attach a key. The resulting record starts with no comments.
    pub fn into_record(self, key: impl Into<String>) -> Record {
        Record {
            key: key.into(),
            presenter: self.presenter,
            summary: self.summary,
            comments: Vec::new(),
            extra: self.extra,
        }
    }
}

/// One entry in the change log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub key: String,
    pub timestamp: Timestamp,
}

impl ChangeEvent {
    pub fn new(key: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            key: key.into(),
            timestamp,
        }
    }
}

/// Stand-in for a record that was deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    pub key: String,
    pub deleted: bool,
}

impl Tombstone {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            deleted: true,
        }
    }
}

/// An entry in a change query result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChangedRecord {
    Live(Record),
    Deleted(Tombstone),
}

impl ChangedRecord {
    pub fn key(&self) -> &str {
        match self {
            ChangedRecord::Live(record) => &record.key,
            ChangedRecord::Deleted(tombstone) => &tombstone.key,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, ChangedRecord::Deleted(_))
    }
}

/// Response envelope for list and change queries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Changes {
    pub server_time: Timestamp,
    pub changes: Vec<ChangedRecord>,
}

impl Changes {
    /// Nothing changed; the client should poll again.
    pub fn empty(server_time: Timestamp) -> Self {
        Self {
            server_time,
            changes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

//! # Skill Share
//!
//! A long-polling change feed for a shared board of talks.
//!
//! ## Core Concepts
//!
//! - **Records**: Talks keyed by title, each with a list of comments
//! - **Change Log**: Append-only record of which key changed when
//! - **Waiters**: Parked requests waiting for changes after a watermark
//! - **Dispatch**: Every mutation wakes every parked request
//!
//! ## Example
//!
//! ```ignore
//! use skillshare::{RecordInput, Service, ServiceConfig, Timestamp};
//!
//! let service = Service::new(ServiceConfig::default());
//! let since = service.server_time();
//!
//! service.put("rust", RecordInput::new("Alice", "Ownership in practice"));
//!
//! // Changes are stamped after any server time already handed out, so
//! // this answers at once even within the same millisecond. With nothing
//! // newer it would park until a change or the poll timeout.
//! let changes = service.changes_since(since).await;
//! assert_eq!(changes.changes.len(), 1);
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod records;
pub mod service;
pub mod types;
pub mod waiters;

// Re-exports
pub use config::ServerConfig;
pub use error::{Result, ServiceError};
pub use records::{ChangeLog, RecordStore};
pub use service::{Poll, Service, ServiceConfig, DEFAULT_POLL_TIMEOUT};
pub use types::*;
pub use waiters::{Waiter, WaiterHandle, WaiterId, WaiterRegistry};

//! Record storage and change tracking.
//!
//! Records live in an in-memory map keyed by their identifier. Every
//! mutation is also noted in an append-only change log so that readers
//! can ask for "everything since time T".

mod log;
mod store;

pub use log::{ChangeLog, EntriesSince};
pub use store::RecordStore;

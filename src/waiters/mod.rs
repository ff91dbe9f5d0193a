//! Parked long-poll requests.
//!
//! A read that finds nothing newer than its watermark registers a
//! [`Waiter`] here and awaits the matching [`WaiterHandle`]. The waiter is
//! later taken out of the registry by exactly one of:
//! - a dispatch after a mutation ([`WaiterRegistry::drain_all`])
//! - its timeout timer ([`WaiterRegistry::cancel`])
//!
//! Taking a waiter out is the single point of truth for "who resolves
//! it"; [`Waiter::resolve`] consumes the waiter, so it cannot fire twice.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = WaiterRegistry::new();
//! let handle = registry.register(Timestamp(1_000));
//!
//! for waiter in registry.drain_all() {
//!     waiter.resolve(Changes::empty(Timestamp(1_001)));
//! }
//!
//! let changes = handle.recv().await?;
//! ```

mod registry;
mod types;

pub use registry::WaiterRegistry;
pub use types::{Waiter, WaiterHandle, WaiterId};

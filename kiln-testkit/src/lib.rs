//! Test doubles for the kiln scheduler.
//!
//! Provides [`InMemoryJobStore`], a complete in-memory implementation of
//! the `JobStore` contract, and [`FlakyJobStore`], a wrapper that injects
//! store failures to exercise the scheduler's rollback paths.

mod mock;
mod store;

pub use mock::FlakyJobStore;
pub use store::{make_record, InMemoryJobStore};

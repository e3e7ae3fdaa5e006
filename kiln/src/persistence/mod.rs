/// PostgreSQL persistence implementation of the job store.
///
/// This module provides `PostgresJobStore`, a PostgreSQL-backed
/// implementation of the [`JobStore`](crate::store::JobStore) trait for
/// durable job records.
pub mod postgres;

pub use postgres::PostgresJobStore;

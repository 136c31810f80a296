//! `db` crate: pure persistence layer.
//!
//! Provides row structs, the [`WorkflowStore`] / [`ExecutionStore`] seams,
//! an in-memory backend and a Postgres backend (connection pool plus
//! repository functions).  No business logic lives here.

pub mod error;
pub mod memory;
pub mod models;
pub mod pg;
pub mod pool;
pub mod repository;
pub mod store;

pub use error::DbError;
pub use memory::MemoryStore;
pub use pg::PgStore;
pub use pool::DbPool;
pub use store::{ExecutionStore, WorkflowStore};

//! `db` crate: pure persistence layer.
//!
//! Provides a connection pool, typed row structs, repository functions for
//! every table in the schema, and the [`Store`] trait the engine talks to.
//! [`PgStore`] backs it with Postgres; [`MemoryStore`] keeps everything in
//! process for tests and database-less runs. No business logic lives here.

pub mod error;
pub mod memory;
pub mod models;
pub mod pool;
pub mod repository;
pub mod store;

pub use error::DbError;
pub use memory::MemoryStore;
pub use pool::DbPool;
pub use store::{PgStore, Store};

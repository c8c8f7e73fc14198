//! Repository functions: one function per database operation.
//!
//! Every function takes a `&DbPool` and returns a `Result<T, DbError>`.
//! No business logic, no domain types: pure SQL. Multi-row writes run in a
//! single transaction.

pub mod workflows;
pub mod steps;
pub mod runs;

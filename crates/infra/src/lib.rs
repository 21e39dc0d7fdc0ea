//! Storage adapters for `huachuca-auth`'s collaborator traits.
//!
//! - [`memory`]: lock-guarded maps for tests and single-node development
//! - [`postgres`]: sqlx/Postgres adapters, schema in `sql/schema.sql`

pub mod memory;
pub mod postgres;


pub use memory::{InMemorySessionStore, InMemoryUserDirectory};
pub use postgres::{PostgresSessionStore, PostgresUserDirectory};

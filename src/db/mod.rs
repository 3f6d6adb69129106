//! Database module: connection credentials, statement text and executors.
//!
//! Layout:
//! - `credential.rs`: master secret and per-database connection options
//! - `statements.rs`: SQL text for provisioning statements (quoting rules)
//! - `executor.rs`: `SqlExecutor` trait and the PostgreSQL implementation
//! - `memory.rs`: in-process cluster emulation, a test double for callers
//!   that exercise provisioning without a PostgreSQL server

pub mod credential;
pub mod executor;
pub mod memory;
pub mod statements;

pub use credential::{MasterCredential, Secret};
pub use executor::{PgExecutor, SqlExecutor};
pub use memory::{ExecutedScript, InMemoryCluster};

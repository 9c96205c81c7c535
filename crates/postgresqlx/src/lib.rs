//! PostgreSQL plumbing shared by the rolegate crates.
//!
//! Provides the connection pool wrapper, database configuration loading and
//! the transactional statement-batch executor. Role semantics live in the
//! `rolegate-sync` and `rolegate-session` crates; this crate only knows how
//! to reach the database and how to run raw SQL safely.

mod batch;
mod config;
mod error;
mod ident;
mod pool;

pub use batch::{execute_batch, execute_statement};
pub use config::{load_config_from_path, load_config_from_str, DatabaseConfig};
pub use error::{PgxError, Result};
pub use ident::quote_ident;
pub use pool::{discard, PgxPool};

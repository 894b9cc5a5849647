//! # sqlx-sqlite-provider
//!
//! A pooled SQLite connection provider built on SQLx. It hands out physical
//! connections through a deliberately narrow interface so that transaction
//! coordination code never depends on pool internals.
//!
//! ## Core Types
//!
//! - **[`ConnectionProvider`]**: The `acquire()` / `release()` contract consumed by callers
//! - **[`SqlitePoolProvider`]**: SQLx-backed implementation over a single read-write pool
//! - **[`ProviderConfig`]**: Pool sizing and timeout configuration
//! - **[`ConnectionHandle`]**: The physical connection type handed out by providers
//! - **[`Error`]**: Error type for opening, closing and removing databases
//!
//! ## Architecture
//!
//! - **One pool**: A single read-write pool; every checkout is a full session
//!   that can run a transaction
//! - **WAL mode**: Enabled on every connection so readers never block the writer
//! - **Bounded waits**: Checkout blocks at most `acquire_timeout_secs`, then
//!   fails with `sqlx::Error::PoolTimedOut`; retry policy belongs to the caller
//! - **Busy timeout**: Writers contending for the SQLite lock wait `busy_timeout_ms`
//!
//! ## Usage
//!
//! ```no_run
//! use sqlx_sqlite_provider::{ConnectionProvider, SqlitePoolProvider};
//!
//! #[tokio::main]
//! async fn main() -> sqlx_sqlite_provider::Result<()> {
//!     let provider = SqlitePoolProvider::connect("example.db", None).await?;
//!
//!     // Check out a connection, use it, hand it back
//!     let mut conn = provider.acquire().await?;
//!     sqlx::query("CREATE TABLE IF NOT EXISTS users (name TEXT)")
//!         .execute(&mut *conn)
//!         .await?;
//!     provider.release(conn);
//!
//!     provider.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Design Principles
//!
//! - Uses sqlx's `SqlitePoolOptions` for all pool configuration
//! - Uses sqlx's `SqliteConnectOptions` for connection flags and configuration
//! - `acquire()` surfaces raw `sqlx::Error` values so callers can classify them
//!
mod config;
mod error;
mod pool;
mod provider;

// Re-export public types
pub use config::ProviderConfig;
pub use error::Error;
pub use pool::SqlitePoolProvider;
pub use provider::{ConnectionHandle, ConnectionProvider};

/// A type alias for Results with our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

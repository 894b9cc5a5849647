//! Context-bound transactions and data access for SQLite on SQLx.
//!
//! This crate sits between the connection provider (`sqlx-sqlite-provider`)
//! and application code. It binds one physical connection to each logical
//! unit of work so that every statement issued for that unit of work runs in
//! the same transaction, without passing the connection around. It provides:
//!
//! - [`TransactionManager`] — begins, commits and rolls back, with `Required`,
//!   `RequiresNew` and `Mandatory` propagation
//! - [`TransactionRegistry`] — the context to connection map the manager maintains
//! - [`SqlTemplate`] — statements that run on the bound connection, or on a
//!   one-off connection when nothing is bound
//! - [`TransactionTemplate`] — wraps a closure in begin / commit / rollback
//! - [`ErrorTranslator`] — maps driver error codes to portable [`ErrorCategory`] values
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use sqlx_sqlite_txsync::{
//!    ErrorCategory, SqlTemplate, SqlitePoolProvider, TransactionManager, TransactionTemplate,
//!    TxContext,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = SqlitePoolProvider::connect("bank.db", None).await?;
//! let manager = Arc::new(TransactionManager::new(provider));
//! let sql = SqlTemplate::new(Arc::clone(&manager));
//! let tx = TransactionTemplate::new(Arc::clone(&manager));
//!
//! let result = tx
//!    .execute(TxContext::new(), |ctx| async move {
//!       sql.execute(ctx, "INSERT INTO accounts (id) VALUES (?)", vec![json!("a")]).await?;
//!       sql.execute(ctx, "INSERT INTO accounts (id) VALUES (?)", vec![json!("a")]).await
//!    })
//!    .await;
//!
//! // Both inserts were rolled back
//! if let Err(e) = result {
//!    assert!(e.is(ErrorCategory::DuplicateKey));
//! }
//! # Ok(())
//! # }
//! ```

mod codes;
mod context;
mod decode;
mod definition;
mod error;
mod manager;
mod registry;
mod template;
mod transactional;
mod translator;

pub use codes::{Backend, ErrorCodeTable, ErrorCodes};
pub use context::TxContext;
pub use decode::{Row, decode_row, decode_rows, from_row, to_json};
pub use definition::{Isolation, Propagation, TransactionDefinition};
pub use error::{DataAccessError, Error, ErrorCategory, Result};
pub use manager::{TransactionManager, TransactionStatus};
pub use registry::{ConnectionHolder, TransactionRegistry};
pub use template::{SqlTemplate, WriteQueryResult, bind_value};
pub use transactional::TransactionTemplate;
pub use translator::{ErrorSignal, ErrorTranslator};

// Re-export commonly used types from dependencies
pub use sqlx_sqlite_provider::{
   ConnectionHandle, ConnectionProvider, ProviderConfig, SqlitePoolProvider,
};

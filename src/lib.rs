//! Member ledger over context-bound SQLite transactions.
//!
//! A small account domain that exercises `sqlx-sqlite-txsync` end to end:
//!
//! - [`MemberRepository`] — member CRUD through [`SqlTemplate`](sqlx_sqlite_txsync::SqlTemplate)
//! - [`MemberService`] — money transfer as one transaction, and member
//!   creation that recovers from a duplicate id
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use sqlx_sqlite_txsync::{
//!    SqlTemplate, SqlitePoolProvider, TransactionManager, TransactionTemplate, TxContext,
//! };
//! use txsync_ledger::{Member, MemberRepository, MemberService};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = SqlitePoolProvider::connect("ledger.db", None).await?;
//! let manager = Arc::new(TransactionManager::new(provider));
//! let repository = MemberRepository::new(SqlTemplate::new(Arc::clone(&manager)));
//! let service = MemberService::new(repository.clone(), TransactionTemplate::new(manager));
//!
//! let ctx = TxContext::new();
//! repository.create_schema(ctx).await?;
//! repository.save(ctx, &Member::new("memberA", 10000)).await?;
//! repository.save(ctx, &Member::new("memberB", 10000)).await?;
//!
//! service.account_transfer(TxContext::new(), "memberA", "memberB", 2000).await?;
//! # Ok(())
//! # }
//! ```

mod domain;
mod error;
mod repository;
mod service;

pub use domain::Member;
pub use error::{Error, Result};
pub use repository::MemberRepository;
pub use service::{MemberService, REJECTED_MEMBER_ID};

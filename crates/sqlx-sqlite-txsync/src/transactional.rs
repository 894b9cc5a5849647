//! Run a closure inside a transaction

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::FutureExt;
use sqlx_sqlite_provider::ConnectionProvider;
use tracing::error;

use crate::context::TxContext;
use crate::definition::TransactionDefinition;
use crate::error::Error;
use crate::manager::{TransactionManager, TransactionStatus};

/// Wraps a unit of work in begin / commit / rollback.
///
/// The closure's own error type flows through untouched; it only has to be
/// constructible from [`Error`] so that begin and commit failures can be
/// returned the same way. Nested `execute` calls on the same context join
/// the outer transaction unless the template's definition says otherwise.
///
/// # Example
///
/// ```no_run
/// use serde_json::json;
/// use sqlx_sqlite_txsync::{
///    SqlTemplate, SqlitePoolProvider, TransactionManager, TransactionTemplate, TxContext,
/// };
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), sqlx_sqlite_txsync::Error> {
/// # let provider = SqlitePoolProvider::connect("example.db", None).await.unwrap();
/// let manager = Arc::new(TransactionManager::new(provider));
/// let sql = SqlTemplate::new(Arc::clone(&manager));
/// let tx = TransactionTemplate::new(manager);
///
/// tx.execute(TxContext::new(), |ctx| async move {
///    let debit = "UPDATE accounts SET balance = balance - 10 WHERE id = ?";
///    let credit = "UPDATE accounts SET balance = balance + 10 WHERE id = ?";
///    sql.execute(ctx, debit, vec![json!("a")]).await?;
///    sql.execute(ctx, credit, vec![json!("b")]).await?;
///    Ok::<_, sqlx_sqlite_txsync::Error>(())
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TransactionTemplate<P> {
   manager: Arc<TransactionManager<P>>,
   definition: TransactionDefinition,
}

impl<P> Clone for TransactionTemplate<P> {
   fn clone(&self) -> Self {
      Self {
         manager: Arc::clone(&self.manager),
         definition: self.definition.clone(),
      }
   }
}

impl<P: ConnectionProvider> TransactionTemplate<P> {
   pub fn new(manager: Arc<TransactionManager<P>>) -> Self {
      Self::with_definition(manager, TransactionDefinition::default())
   }

   pub fn with_definition(
      manager: Arc<TransactionManager<P>>,
      definition: TransactionDefinition,
   ) -> Self {
      Self {
         manager,
         definition,
      }
   }

   pub fn definition(&self) -> &TransactionDefinition {
      &self.definition
   }

   pub fn manager(&self) -> &Arc<TransactionManager<P>> {
      &self.manager
   }

   /// Run `work` in a transaction on `ctx`.
   ///
   /// Commits if `work` returns `Ok`. Rolls back if it returns `Err` or
   /// panics, then returns the error or resumes the panic. A failed rollback
   /// at that point is logged and the original failure wins.
   pub async fn execute<T, E, F, Fut>(&self, ctx: TxContext, work: F) -> Result<T, E>
   where
      F: FnOnce(TxContext) -> Fut,
      Fut: Future<Output = Result<T, E>>,
      E: From<Error>,
   {
      let status = self.manager.begin(ctx, &self.definition).await?;

      match AssertUnwindSafe(work(ctx)).catch_unwind().await {
         Ok(Ok(value)) => {
            self.manager.commit(status).await?;
            Ok(value)
         }
         Ok(Err(err)) => {
            self.rollback_quietly(status).await;
            Err(err)
         }
         Err(payload) => {
            self.rollback_quietly(status).await;
            panic::resume_unwind(payload)
         }
      }
   }

   async fn rollback_quietly(&self, status: TransactionStatus) {
      if let Err(e) = self.manager.rollback(status).await {
         error!("Rollback after failed unit of work failed: {}", e);
      }
   }
}

//! Transaction coordination: begin, commit and rollback against the registry

use std::sync::Arc;

use sqlx::sqlite::SqliteConnection;
use sqlx_sqlite_provider::{ConnectionHandle, ConnectionProvider};
use tracing::{debug, error, warn};

use crate::Result;
use crate::context::TxContext;
use crate::definition::{Isolation, Propagation, TransactionDefinition};
use crate::error::Error;
use crate::registry::{ConnectionHolder, TransactionRegistry};
use crate::translator::ErrorTranslator;

/// Begins, commits and rolls back transactions, binding each physical
/// transaction's connection to the caller's [`TxContext`].
///
/// Only the call that started a physical transaction (a *new* status) ends
/// it. Calls that joined an existing transaction complete without touching
/// the connection.
///
/// # Example
///
/// ```no_run
/// use sqlx_sqlite_txsync::{
///    SqlitePoolProvider, TransactionDefinition, TransactionManager, TxContext,
/// };
///
/// # async fn example() -> Result<(), sqlx_sqlite_txsync::Error> {
/// # let provider = SqlitePoolProvider::connect("example.db", None).await.unwrap();
/// let manager = TransactionManager::new(provider);
/// let ctx = TxContext::new();
///
/// let status = manager.begin(ctx, &TransactionDefinition::default()).await?;
/// // ... data access with `ctx` runs inside the transaction ...
/// manager.commit(status).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TransactionManager<P> {
   provider: Arc<P>,
   registry: Arc<TransactionRegistry>,
   translator: ErrorTranslator,
}

impl<P: ConnectionProvider> TransactionManager<P> {
   /// Manager using the built-in SQLite error codes.
   pub fn new(provider: Arc<P>) -> Self {
      Self::with_translator(provider, ErrorTranslator::sqlite())
   }

   pub fn with_translator(provider: Arc<P>, translator: ErrorTranslator) -> Self {
      Self {
         provider,
         registry: Arc::new(TransactionRegistry::new()),
         translator,
      }
   }

   pub fn provider(&self) -> &Arc<P> {
      &self.provider
   }

   pub fn registry(&self) -> &TransactionRegistry {
      &self.registry
   }

   pub fn translator(&self) -> &ErrorTranslator {
      &self.translator
   }

   /// Start or join a transaction for `ctx` according to `definition`.
   ///
   /// Connection acquisition is not retried: pool exhaustion comes back as a
   /// `ResourceUnavailable` data-access error.
   pub async fn begin(
      &self,
      ctx: TxContext,
      definition: &TransactionDefinition,
   ) -> Result<TransactionStatus> {
      let existing = self.registry.lookup(ctx);

      match (definition.propagation, existing) {
         (Propagation::Required | Propagation::Mandatory, Some(holder)) => {
            debug!(
               "Joining transaction #{} on context {} ({})",
               holder.id(),
               ctx,
               definition.label()
            );
            Ok(TransactionStatus::participating(
               ctx,
               holder,
               Arc::clone(&self.registry),
            ))
         }
         (Propagation::Mandatory, None) => Err(Error::NoActiveTransaction(ctx)),
         (Propagation::Required, None) => self.begin_new(ctx, definition, None).await,
         (Propagation::RequiresNew, existing) => {
            // SQLite has a single writer: a second BEGIN IMMEDIATE would only
            // wait out the busy timeout behind the suspended transaction.
            if let Some(outer) = &existing
               && outer.holds_write_lock()
               && !definition.read_only
            {
               return Err(Error::SuspendedWriterConflict(ctx));
            }

            let suspended = match existing {
               Some(_) => self.registry.unbind(ctx).map(|holder| {
                  debug!("Suspending transaction #{} on context {}", holder.id(), ctx);
                  SuspendedBinding {
                     registry: Arc::clone(&self.registry),
                     ctx,
                     holder: Some(holder),
                  }
               }),
               None => None,
            };
            self.begin_new(ctx, definition, suspended).await
         }
      }
   }

   async fn begin_new(
      &self,
      ctx: TxContext,
      definition: &TransactionDefinition,
      suspended: Option<SuspendedBinding>,
   ) -> Result<TransactionStatus> {
      let conn = self
         .provider
         .acquire()
         .await
         .map_err(|e| self.translator.translate("acquire connection", None, e))?;

      // From here on an abandoned future leaves the connection in the holder,
      // which closes it before handing it back.
      let provider = Arc::clone(&self.provider);
      let writer_suspended = suspended
         .as_ref()
         .and_then(|s| s.holder.as_ref())
         .is_some_and(|outer| outer.holds_write_lock());
      let holder = Arc::new(
         ConnectionHolder::new(
            conn,
            definition.clone(),
            Box::new(move |conn: ConnectionHandle| provider.release(conn)),
         )
         .with_writer_suspended(writer_suspended),
      );
      let mut guard = holder.lock().await;
      let conn = guard.connection()?;

      let state = match ConnectionState::prepare(conn, definition).await {
         Ok(state) => state,
         Err(e) => {
            let err = self.translator.translate("prepare connection", None, e);
            self.discard(guard.take(), false);
            return Err(err.into());
         }
      };

      let begin = definition.begin_statement();
      if let Err(e) = sqlx::query(begin).execute(&mut **conn).await {
         let err = self.translator.translate("begin", Some(begin), e);
         let reusable = state.restore(conn).await.is_ok();
         self.discard(guard.take(), reusable);
         return Err(err.into());
      }

      if let Err(e) = self.registry.bind(ctx, Arc::clone(&holder)) {
         let reusable = rollback(conn).await.is_ok() && state.restore(conn).await.is_ok();
         self.discard(guard.take(), reusable);
         return Err(e);
      }

      debug!(
         "Began transaction #{} on context {} ({}, {:?}, read_only={})",
         holder.id(),
         ctx,
         definition.label(),
         definition.isolation,
         definition.read_only
      );

      drop(guard);
      Ok(TransactionStatus {
         ctx,
         holder,
         registry: Arc::clone(&self.registry),
         new_transaction: true,
         state,
         suspended,
         rollback_only: false,
         completed: false,
      })
   }

   /// Commit the transaction `status` refers to.
   ///
   /// For a joined status this only records completion. For a new status the
   /// connection is committed (or rolled back, if anyone marked the
   /// transaction rollback-only), its state restored, unbound and released,
   /// whatever the outcome of the commit itself.
   pub async fn commit(&self, mut status: TransactionStatus) -> Result<()> {
      if !status.new_transaction {
         debug!(
            "Commit of joined transaction #{} deferred to its owner",
            status.holder.id()
         );
         status.completed = true;
         return Ok(());
      }

      if status.holder.is_rollback_only() {
         debug!(
            "Transaction #{} is rollback-only, rolling back instead of committing",
            status.holder.id()
         );
         self.finish(&mut status, Completion::Rollback).await?;
         return Err(Error::UnexpectedRollback);
      }

      if status.rollback_only {
         return self.finish(&mut status, Completion::Rollback).await;
      }

      self.finish(&mut status, Completion::Commit).await
   }

   /// Roll back the transaction `status` refers to.
   ///
   /// A joined status cannot end the physical transaction; it marks it
   /// rollback-only so the owner's commit rolls back instead.
   pub async fn rollback(&self, mut status: TransactionStatus) -> Result<()> {
      if !status.new_transaction {
         status.holder.mark_rollback_only();
         status.completed = true;
         return Ok(());
      }

      self.finish(&mut status, Completion::Rollback).await
   }

   async fn finish(&self, status: &mut TransactionStatus, completion: Completion) -> Result<()> {
      let holder = Arc::clone(&status.holder);
      let mut guard = holder.lock().await;

      let (result, reusable) = match guard.connection() {
         Ok(conn) => {
            let result = self.end_transaction(conn, completion).await;
            let mut reusable = !matches!(
               result,
               Err(Error::RollbackFailed(_) | Error::CommitRollbackFailed { .. })
            );
            if reusable && let Err(e) = status.state.restore(conn).await {
               warn!(
                  "Failed to restore connection state of transaction #{}: {}",
                  holder.id(),
                  e
               );
               reusable = false;
            }
            (result, reusable)
         }
         Err(e) => (Err(e), false),
      };

      holder.deactivate();
      let conn = guard.take();
      drop(guard);

      if !self.registry.unbind_if(status.ctx, &holder) {
         warn!(
            "Transaction #{} was no longer bound to context {}",
            holder.id(),
            status.ctx
         );
      }
      self.discard(conn, reusable);
      status.completed = true;

      // Resume any suspended outer transaction
      status.suspended.take();

      match &result {
         Ok(()) => debug!("{} transaction #{}", completion.past_tense(), holder.id()),
         Err(e) => debug!("Transaction #{} ended with error: {}", holder.id(), e),
      }
      result
   }

   async fn end_transaction(
      &self,
      conn: &mut ConnectionHandle,
      completion: Completion,
   ) -> Result<()> {
      match completion {
         Completion::Rollback => rollback(conn).await.map_err(|e| {
            Error::RollbackFailed(self.translator.translate("rollback", Some("ROLLBACK"), e))
         }),
         Completion::Commit => {
            let Err(e) = sqlx::query("COMMIT").execute(&mut **conn).await else {
               return Ok(());
            };
            let commit_error = self.translator.translate("commit", Some("COMMIT"), e);

            match rollback(conn).await {
               Ok(()) => Err(Error::CommitFailed(commit_error)),
               Err(e) => {
                  let rollback_error = self.translator.translate("rollback", Some("ROLLBACK"), e);
                  error!(
                     "Rollback after failed commit also failed: {} (commit error: {})",
                     rollback_error, commit_error
                  );
                  Err(Error::CommitRollbackFailed {
                     commit_error,
                     rollback_error,
                  })
               }
            }
         }
      }
   }

   /// Hand a connection back to the provider, closing it if it may still
   /// carry transaction or pragma state.
   fn discard(&self, conn: Option<ConnectionHandle>, reusable: bool) {
      if let Some(mut conn) = conn {
         if !reusable {
            conn.close_on_drop();
         }
         self.provider.release(conn);
      }
   }
}

async fn rollback(conn: &mut SqliteConnection) -> std::result::Result<(), sqlx::Error> {
   sqlx::query("ROLLBACK").execute(conn).await.map(|_| ())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
   Commit,
   Rollback,
}

impl Completion {
   fn past_tense(self) -> &'static str {
      match self {
         Completion::Commit => "Committed",
         Completion::Rollback => "Rolled back",
      }
   }
}

/// Pragma values changed for a transaction, with what they were before.
#[derive(Debug, Default)]
struct ConnectionState {
   previous_query_only: Option<i64>,
   previous_read_uncommitted: Option<i64>,
}

impl ConnectionState {
   async fn prepare(
      conn: &mut SqliteConnection,
      definition: &TransactionDefinition,
   ) -> std::result::Result<Self, sqlx::Error> {
      let mut state = Self::default();

      if definition.read_only {
         state.previous_query_only = Some(pragma(conn, "query_only").await?);
         sqlx::query("PRAGMA query_only = 1").execute(&mut *conn).await?;
      }

      if definition.isolation == Isolation::ReadUncommitted {
         state.previous_read_uncommitted = Some(pragma(conn, "read_uncommitted").await?);
         sqlx::query("PRAGMA read_uncommitted = 1")
            .execute(&mut *conn)
            .await?;
      }

      Ok(state)
   }

   async fn restore(&self, conn: &mut SqliteConnection) -> std::result::Result<(), sqlx::Error> {
      if let Some(previous) = self.previous_query_only {
         sqlx::query(&format!("PRAGMA query_only = {previous}"))
            .execute(&mut *conn)
            .await?;
      }
      if let Some(previous) = self.previous_read_uncommitted {
         sqlx::query(&format!("PRAGMA read_uncommitted = {previous}"))
            .execute(&mut *conn)
            .await?;
      }
      Ok(())
   }
}

async fn pragma(conn: &mut SqliteConnection, name: &str) -> std::result::Result<i64, sqlx::Error> {
   sqlx::query_scalar(&format!("PRAGMA {name}"))
      .fetch_one(conn)
      .await
}

/// An outer binding taken off its context while a `RequiresNew` transaction
/// runs. Dropping it binds the outer transaction again.
#[derive(Debug)]
struct SuspendedBinding {
   registry: Arc<TransactionRegistry>,
   ctx: TxContext,
   holder: Option<Arc<ConnectionHolder>>,
}

impl Drop for SuspendedBinding {
   fn drop(&mut self) {
      let Some(holder) = self.holder.take() else {
         return;
      };
      let id = holder.id();
      match self.registry.bind(self.ctx, holder) {
         Ok(()) => debug!("Resumed transaction #{} on context {}", id, self.ctx),
         Err(e) => warn!("Could not resume transaction #{}: {}", id, e),
      }
   }
}

/// Handle for a begun or joined transaction.
///
/// Pass it back to [`TransactionManager::commit`] or
/// [`TransactionManager::rollback`] exactly once. Dropping a *new* status
/// without doing either unbinds the transaction, closes its connection and
/// hands it back to the provider.
#[must_use = "a transaction must be committed or rolled back"]
#[derive(Debug)]
pub struct TransactionStatus {
   ctx: TxContext,
   holder: Arc<ConnectionHolder>,
   registry: Arc<TransactionRegistry>,
   new_transaction: bool,
   state: ConnectionState,
   suspended: Option<SuspendedBinding>,
   rollback_only: bool,
   completed: bool,
}

impl TransactionStatus {
   fn participating(
      ctx: TxContext,
      holder: Arc<ConnectionHolder>,
      registry: Arc<TransactionRegistry>,
   ) -> Self {
      Self {
         ctx,
         holder,
         registry,
         new_transaction: false,
         state: ConnectionState::default(),
         suspended: None,
         rollback_only: false,
         completed: false,
      }
   }

   pub fn context(&self) -> TxContext {
      self.ctx
   }

   /// True if this call started the physical transaction and is the one
   /// allowed to end it.
   pub fn is_new_transaction(&self) -> bool {
      self.new_transaction
   }

   /// Settings of the physical transaction, which for a joined status are
   /// the owner's.
   pub fn definition(&self) -> &TransactionDefinition {
      self.holder.definition()
   }

   /// Whether an outer transaction was suspended for this one.
   pub fn has_suspended(&self) -> bool {
      self.suspended.is_some()
   }

   /// Make the eventual commit roll back instead.
   ///
   /// On a joined status this marks the whole physical transaction, and the
   /// owner's commit reports [`Error::UnexpectedRollback`].
   pub fn set_rollback_only(&mut self) {
      self.rollback_only = true;
      if !self.new_transaction {
         self.holder.mark_rollback_only();
      }
   }

   pub fn is_rollback_only(&self) -> bool {
      self.rollback_only || self.holder.is_rollback_only()
   }
}

impl Drop for TransactionStatus {
   fn drop(&mut self) {
      if self.completed || !self.new_transaction {
         return;
      }

      warn!(
         "Transaction #{} on context {} dropped without commit or rollback",
         self.holder.id(),
         self.ctx
      );
      self.holder.deactivate();
      self.registry.unbind_if(self.ctx, &self.holder);
      // The holder closes and releases the connection once the last reference
      // is gone; `suspended` rebinds the outer transaction when it drops after.
   }
}

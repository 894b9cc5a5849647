//! Context-keyed registry of bound connections

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use sqlx_sqlite_provider::ConnectionHandle;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::Result;
use crate::context::TxContext;
use crate::definition::TransactionDefinition;
use crate::error::Error;

static NEXT_HOLDER_ID: AtomicU64 = AtomicU64::new(1);

/// Hands a connection back to the provider it came from.
pub(crate) type ReleaseFn = Box<dyn FnOnce(ConnectionHandle) + Send>;

/// Slot the bound connection lives in while a transaction is open.
///
/// A connection still in the slot when the last holder reference goes away
/// belongs to a transaction nobody finished, so it is closed rather than
/// reused, and still handed back to its provider.
pub(crate) struct BoundSlot {
   conn: Option<ConnectionHandle>,
   release: Option<ReleaseFn>,
}

impl fmt::Debug for BoundSlot {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("BoundSlot")
         .field("conn", &self.conn)
         .finish_non_exhaustive()
   }
}

impl Drop for BoundSlot {
   fn drop(&mut self) {
      if let Some(mut conn) = self.conn.take() {
         warn!("Closing connection of a transaction that was never completed");
         conn.close_on_drop();
         if let Some(release) = self.release.take() {
            release(conn);
         }
      }
   }
}

/// The per-context entry: one physical connection plus the settings its
/// transaction was opened with.
pub struct ConnectionHolder {
   id: u64,
   definition: TransactionDefinition,
   writer_suspended: bool,
   active: AtomicBool,
   rollback_only: AtomicBool,
   slot: Arc<AsyncMutex<BoundSlot>>,
}

impl ConnectionHolder {
   /// `release` runs only if the connection is still inside when the holder
   /// is dropped.
   pub(crate) fn new(
      conn: ConnectionHandle,
      definition: TransactionDefinition,
      release: ReleaseFn,
   ) -> Self {
      Self {
         id: NEXT_HOLDER_ID.fetch_add(1, Ordering::Relaxed),
         definition,
         writer_suspended: false,
         active: AtomicBool::new(true),
         rollback_only: AtomicBool::new(false),
         slot: Arc::new(AsyncMutex::new(BoundSlot {
            conn: Some(conn),
            release: Some(release),
         })),
      }
   }

   /// Process-unique id, used in log output.
   pub fn id(&self) -> u64 {
      self.id
   }

   /// Settings of the transaction that owns this connection.
   pub fn definition(&self) -> &TransactionDefinition {
      &self.definition
   }

   /// Record that a writer transaction was suspended underneath this one.
   pub(crate) fn with_writer_suspended(mut self, writer_suspended: bool) -> Self {
      self.writer_suspended = writer_suspended;
      self
   }

   /// True if this transaction, or any transaction suspended beneath it,
   /// holds the database write lock.
   pub fn holds_write_lock(&self) -> bool {
      !self.definition.read_only || self.writer_suspended
   }

   /// False once the owning transaction has started to commit or roll back.
   pub fn is_active(&self) -> bool {
      self.active.load(Ordering::SeqCst)
   }

   pub fn is_rollback_only(&self) -> bool {
      self.rollback_only.load(Ordering::SeqCst)
   }

   pub(crate) fn deactivate(&self) {
      self.active.store(false, Ordering::SeqCst);
   }

   pub(crate) fn mark_rollback_only(&self) {
      if !self.rollback_only.swap(true, Ordering::SeqCst) {
         debug!("Transaction #{} marked rollback-only", self.id);
      }
   }

   /// Exclusive access to the bound connection.
   ///
   /// Statements issued through the same context queue up here, one at a time.
   pub(crate) async fn lock(&self) -> BoundGuard {
      BoundGuard(Arc::clone(&self.slot).lock_owned().await)
   }
}

impl fmt::Debug for ConnectionHolder {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("ConnectionHolder")
         .field("id", &self.id)
         .field("definition", &self.definition)
         .field("active", &self.is_active())
         .field("rollback_only", &self.is_rollback_only())
         .finish_non_exhaustive()
   }
}

/// Locked access to a holder's connection.
#[derive(Debug)]
pub(crate) struct BoundGuard(OwnedMutexGuard<BoundSlot>);

impl BoundGuard {
   /// The bound connection, or `TransactionAlreadyFinalized` once commit or
   /// rollback has handed it back.
   pub(crate) fn connection(&mut self) -> Result<&mut ConnectionHandle> {
      self.0.conn.as_mut().ok_or(Error::TransactionAlreadyFinalized)
   }

   pub(crate) fn take(&mut self) -> Option<ConnectionHandle> {
      self.0.conn.take()
   }
}

/// Map from execution context to the connection bound to it.
///
/// Only the transaction manager binds and unbinds; data-access code looks up.
/// The map lock is held for single map operations and never across an await.
#[derive(Debug, Default)]
pub struct TransactionRegistry {
   bindings: Mutex<HashMap<TxContext, Arc<ConnectionHolder>>>,
}

impl TransactionRegistry {
   pub fn new() -> Self {
      Self::default()
   }

   /// Bind `holder` to `ctx`.
   ///
   /// Fails with [`Error::AlreadyBound`] if the context has a binding already;
   /// the existing binding is left untouched.
   pub(crate) fn bind(&self, ctx: TxContext, holder: Arc<ConnectionHolder>) -> Result<()> {
      let mut bindings = self.bindings.lock();
      match bindings.entry(ctx) {
         Entry::Occupied(_) => Err(Error::AlreadyBound(ctx)),
         Entry::Vacant(entry) => {
            debug!("Bound transaction #{} to context {}", holder.id, ctx);
            entry.insert(holder);
            Ok(())
         }
      }
   }

   /// Remove and return the binding for `ctx`. Logs if there was none.
   pub(crate) fn unbind(&self, ctx: TxContext) -> Option<Arc<ConnectionHolder>> {
      let removed = self.bindings.lock().remove(&ctx);
      match &removed {
         Some(holder) => debug!("Unbound transaction #{} from context {}", holder.id, ctx),
         None => warn!("Unbind requested for context {} but nothing was bound", ctx),
      }
      removed
   }

   /// Remove the binding for `ctx` only if it is still `holder`.
   ///
   /// Returns whether anything was removed.
   pub(crate) fn unbind_if(&self, ctx: TxContext, holder: &Arc<ConnectionHolder>) -> bool {
      let mut bindings = self.bindings.lock();
      match bindings.entry(ctx) {
         Entry::Occupied(entry) if Arc::ptr_eq(entry.get(), holder) => {
            entry.remove();
            debug!("Unbound transaction #{} from context {}", holder.id, ctx);
            true
         }
         _ => false,
      }
   }

   /// The holder bound to `ctx`, if any.
   pub fn lookup(&self, ctx: TxContext) -> Option<Arc<ConnectionHolder>> {
      self.bindings.lock().get(&ctx).cloned()
   }

   pub fn is_bound(&self, ctx: TxContext) -> bool {
      self.bindings.lock().contains_key(&ctx)
   }

   /// Number of contexts with a bound transaction.
   pub fn len(&self) -> usize {
      self.bindings.lock().len()
   }

   pub fn is_empty(&self) -> bool {
      self.bindings.lock().is_empty()
   }

   /// Drop every binding.
   ///
   /// Intended for shutdown. Connections of dropped holders are closed, not
   /// pooled, once no transaction status refers to them any more.
   pub fn abort_all(&self) -> usize {
      let drained: Vec<_> = self.bindings.lock().drain().collect();
      for (ctx, holder) in &drained {
         holder.deactivate();
         warn!("Aborting transaction #{} bound to context {}", holder.id, ctx);
      }
      drained.len()
   }
}

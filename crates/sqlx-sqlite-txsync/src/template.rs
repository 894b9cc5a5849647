//! Statement execution against the context-bound connection

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::Sqlite;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx_sqlite_provider::{ConnectionHandle, ConnectionProvider};

use crate::Result;
use crate::context::TxContext;
use crate::decode::{Row, decode_row, decode_rows};
use crate::error::Error;
use crate::manager::TransactionManager;
use crate::registry::BoundGuard;

/// Result of an INSERT, UPDATE or DELETE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteQueryResult {
   pub rows_affected: u64,
   pub last_insert_id: i64,
}

/// Runs statements for a [`TxContext`].
///
/// When the context has a transaction bound, statements run on its
/// connection. Otherwise each call checks out a connection for itself and
/// hands it back before returning. Driver errors are always translated.
///
/// # Example
///
/// ```no_run
/// use serde_json::json;
/// use sqlx_sqlite_txsync::{SqlTemplate, SqlitePoolProvider, TransactionManager, TxContext};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), sqlx_sqlite_txsync::Error> {
/// # let provider = SqlitePoolProvider::connect("example.db", None).await.unwrap();
/// let manager = Arc::new(TransactionManager::new(provider));
/// let sql = SqlTemplate::new(Arc::clone(&manager));
/// let ctx = TxContext::new();
///
/// sql.execute(ctx, "INSERT INTO users (name) VALUES (?)", vec![json!("Alice")]).await?;
/// let rows = sql.query(ctx, "SELECT name FROM users", vec![]).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SqlTemplate<P> {
   manager: Arc<TransactionManager<P>>,
}

impl<P> Clone for SqlTemplate<P> {
   fn clone(&self) -> Self {
      Self {
         manager: Arc::clone(&self.manager),
      }
   }
}

impl<P: ConnectionProvider> SqlTemplate<P> {
   pub fn new(manager: Arc<TransactionManager<P>>) -> Self {
      Self { manager }
   }

   pub fn manager(&self) -> &Arc<TransactionManager<P>> {
      &self.manager
   }

   /// Execute a write statement.
   pub async fn execute(
      &self,
      ctx: TxContext,
      sql: &str,
      params: Vec<JsonValue>,
   ) -> Result<WriteQueryResult> {
      let mut lease = self.lease(ctx).await?;
      let conn = lease.connection()?;

      let result = bind_all(sqlx::query(sql), params)
         .execute(&mut **conn)
         .await
         .map_err(|e| self.manager.translator().translate("execute", Some(sql), e))?;

      Ok(WriteQueryResult {
         rows_affected: result.rows_affected(),
         last_insert_id: result.last_insert_rowid(),
      })
   }

   /// Run a query and decode every row.
   pub async fn query(
      &self,
      ctx: TxContext,
      sql: &str,
      params: Vec<JsonValue>,
   ) -> Result<Vec<Row>> {
      let mut lease = self.lease(ctx).await?;
      let conn = lease.connection()?;

      let rows = bind_all(sqlx::query(sql), params)
         .fetch_all(&mut **conn)
         .await
         .map_err(|e| self.manager.translator().translate("query", Some(sql), e))?;

      decode_rows(&rows)
   }

   /// Run a query expected to return at most one row.
   ///
   /// Returns [`Error::MultipleRowsReturned`] if more than one row comes back.
   pub async fn query_optional(
      &self,
      ctx: TxContext,
      sql: &str,
      params: Vec<JsonValue>,
   ) -> Result<Option<Row>> {
      let mut lease = self.lease(ctx).await?;
      let conn = lease.connection()?;

      let rows = bind_all(sqlx::query(sql), params)
         .fetch_all(&mut **conn)
         .await
         .map_err(|e| self.manager.translator().translate("query", Some(sql), e))?;

      match rows.as_slice() {
         [] => Ok(None),
         [row] => decode_row(row).map(Some),
         _ => Err(Error::MultipleRowsReturned(rows.len())),
      }
   }

   /// Run a query expected to return exactly one row and map it.
   ///
   /// No row is [`Error::EmptyResult`]; several are
   /// [`Error::MultipleRowsReturned`].
   pub async fn query_for_object<T, F>(
      &self,
      ctx: TxContext,
      sql: &str,
      params: Vec<JsonValue>,
      mapper: F,
   ) -> Result<T>
   where
      F: FnOnce(Row) -> Result<T>,
   {
      self
         .query_optional(ctx, sql, params)
         .await?
         .ok_or(Error::EmptyResult)
         .and_then(mapper)
   }

   async fn lease(&self, ctx: TxContext) -> Result<Lease<'_, P>> {
      if let Some(holder) = self.manager.registry().lookup(ctx) {
         return Ok(Lease::Bound(holder.lock().await));
      }

      let provider = &**self.manager.provider();
      let conn = provider.acquire().await.map_err(|e| {
         self
            .manager
            .translator()
            .translate("acquire connection", None, e)
      })?;

      Ok(Lease::Standalone {
         conn: Some(conn),
         provider,
      })
   }
}

/// Connection borrowed for a single statement.
enum Lease<'a, P: ConnectionProvider> {
   /// The context's transaction connection, locked for this statement.
   Bound(BoundGuard),
   /// A one-off checkout, handed back to the provider on drop.
   Standalone {
      conn: Option<ConnectionHandle>,
      provider: &'a P,
   },
}

impl<P: ConnectionProvider> Lease<'_, P> {
   fn connection(&mut self) -> Result<&mut ConnectionHandle> {
      match self {
         Lease::Bound(guard) => guard.connection(),
         Lease::Standalone { conn, .. } => conn.as_mut().ok_or(Error::TransactionAlreadyFinalized),
      }
   }
}

impl<P: ConnectionProvider> Drop for Lease<'_, P> {
   fn drop(&mut self) {
      if let Lease::Standalone { conn, provider } = self
         && let Some(conn) = conn.take()
      {
         provider.release(conn);
      }
   }
}

fn bind_all<'a>(
   mut query: Query<'a, Sqlite, SqliteArguments<'a>>,
   params: Vec<JsonValue>,
) -> Query<'a, Sqlite, SqliteArguments<'a>> {
   for value in params {
      query = bind_value(query, value);
   }
   query
}

/// Bind a JSON value to a query parameter.
///
/// Integers keep their i64 precision; arrays and objects are bound as JSON
/// text.
pub fn bind_value<'a>(
   query: Query<'a, Sqlite, SqliteArguments<'a>>,
   value: JsonValue,
) -> Query<'a, Sqlite, SqliteArguments<'a>> {
   match value {
      JsonValue::Null => query.bind(None::<String>),
      JsonValue::Bool(b) => query.bind(b),
      JsonValue::String(s) => query.bind(s),
      JsonValue::Number(number) => {
         if let Some(int_val) = number.as_i64() {
            query.bind(int_val)
         } else {
            // u64 beyond i64::MAX or a true float
            query.bind(number.as_f64().unwrap_or_default())
         }
      }
      other => query.bind(other),
   }
}

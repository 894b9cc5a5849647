//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::json;
use sqlx_sqlite_txsync::{
   ConnectionHandle, ConnectionProvider, ProviderConfig, SqlTemplate, SqlitePoolProvider,
   TransactionManager, TxContext,
};
use tempfile::TempDir;

/// Provider wrapper that counts checkouts and returns.
#[derive(Debug)]
pub struct CountingProvider {
   inner: Arc<SqlitePoolProvider>,
   acquired: AtomicUsize,
   released: AtomicUsize,
}

impl CountingProvider {
   pub fn acquired(&self) -> usize {
      self.acquired.load(Ordering::SeqCst)
   }

   pub fn released(&self) -> usize {
      self.released.load(Ordering::SeqCst)
   }

   pub fn inner(&self) -> &Arc<SqlitePoolProvider> {
      &self.inner
   }
}

impl ConnectionProvider for CountingProvider {
   async fn acquire(&self) -> Result<ConnectionHandle, sqlx::Error> {
      let conn = self.inner.acquire().await?;
      self.acquired.fetch_add(1, Ordering::SeqCst);
      Ok(conn)
   }

   fn release(&self, conn: ConnectionHandle) {
      self.released.fetch_add(1, Ordering::SeqCst);
      self.inner.release(conn);
   }
}

pub struct TestDb {
   pub provider: Arc<CountingProvider>,
   pub manager: Arc<TransactionManager<CountingProvider>>,
   pub sql: SqlTemplate<CountingProvider>,
   _temp: TempDir,
}

impl TestDb {
   /// Count rows of `items` using a connection that is not bound anywhere.
   pub async fn count_items(&self) -> i64 {
      let mut conn = self.provider.inner().acquire().await.unwrap();
      let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM items")
         .fetch_one(&mut *conn)
         .await
         .unwrap();
      self.provider.inner().release(conn);
      count
   }

   /// Insert an item through the template on `ctx`.
   pub async fn insert_item(&self, ctx: TxContext, id: &str) -> sqlx_sqlite_txsync::Result<()> {
      self
         .sql
         .execute(ctx, "INSERT INTO items (id, label) VALUES (?, ?)", vec![json!(id), json!("x")])
         .await
         .map(|_| ())
   }
}

pub async fn create_test_db(name: &str, config: Option<ProviderConfig>) -> TestDb {
   let _ = tracing_subscriber::fmt().with_test_writer().try_init();

   let temp_dir = TempDir::new().expect("Failed to create temp directory");
   let inner = SqlitePoolProvider::connect(temp_dir.path().join(name), config)
      .await
      .expect("Failed to open provider");

   let mut conn = inner.acquire().await.unwrap();
   sqlx::query("CREATE TABLE items (id TEXT PRIMARY KEY, label TEXT NOT NULL)")
      .execute(&mut *conn)
      .await
      .unwrap();
   inner.release(conn);

   let provider = Arc::new(CountingProvider {
      inner,
      acquired: AtomicUsize::new(0),
      released: AtomicUsize::new(0),
   });
   let manager = Arc::new(TransactionManager::new(Arc::clone(&provider)));
   let sql = SqlTemplate::new(Arc::clone(&manager));

   TestDb {
      provider,
      manager,
      sql,
      _temp: temp_dir,
   }
}

//! SQLx-backed connection provider

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use tracing::{debug, trace, warn};

use crate::Result;
use crate::config::ProviderConfig;
use crate::error::Error;
use crate::provider::{ConnectionHandle, ConnectionProvider};

/// Connection provider backed by a single SQLx read-write pool.
///
/// Every connection runs in WAL mode so that a unit of work holding the write
/// lock does not stop other sessions from reading committed data.
///
/// # Example
///
/// ```no_run
/// use sqlx_sqlite_provider::{ConnectionProvider, ProviderConfig, SqlitePoolProvider};
///
/// # async fn example() -> Result<(), sqlx_sqlite_provider::Error> {
/// let config = ProviderConfig {
///    max_connections: 2,
///    ..Default::default()
/// };
/// let provider = SqlitePoolProvider::connect("test.db", Some(config)).await?;
///
/// let mut conn = provider.acquire().await?;
/// sqlx::query("INSERT INTO users (name) VALUES (?)")
///     .bind("Alice")
///     .execute(&mut *conn)
///     .await?;
/// provider.release(conn);
///
/// provider.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SqlitePoolProvider {
   /// Read-write pool every checkout comes from
   pool: Pool<Sqlite>,

   /// Marks the provider as closed to prevent further checkouts
   closed: AtomicBool,

   /// Path to database file (used for cleanup)
   path: PathBuf,
}

impl SqlitePoolProvider {
   /// Open (creating if missing) the SQLite database at `path`.
   ///
   /// No connection is opened eagerly unless `min_connections` asks for it.
   ///
   /// # Arguments
   ///
   /// * `path` - Path to the SQLite database file (will be created if missing)
   /// * `custom_config` - Optional pool configuration. Pass `None` to use the
   ///   defaults (6 connections, 30 second acquire and idle timeouts).
   pub async fn connect(
      path: impl AsRef<Path>,
      custom_config: Option<ProviderConfig>,
   ) -> Result<Arc<Self>> {
      let config = custom_config.unwrap_or_default();
      config.validate()?;

      let path = path.as_ref();
      if path.as_os_str().is_empty() {
         return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Database path cannot be empty",
         )));
      }

      if is_memory_database(path) && config.max_connections > 1 {
         warn!(
            "In-memory database with {} connections: each connection sees its own empty database",
            config.max_connections
         );
      }

      let options = SqliteConnectOptions::new()
         .filename(path)
         .create_if_missing(true)
         .journal_mode(SqliteJournalMode::Wal)
         // https://www.sqlite.org/wal.html#performance_considerations
         .synchronous(SqliteSynchronous::Normal)
         .busy_timeout(config.busy_timeout());

      let pool = SqlitePoolOptions::new()
         .max_connections(config.max_connections)
         .min_connections(config.min_connections)
         .acquire_timeout(config.acquire_timeout())
         .idle_timeout(Some(config.idle_timeout()))
         .connect_with(options)
         .await?;

      debug!(
         "Opened connection provider for {} (max {} connections)",
         path.display(),
         config.max_connections
      );

      Ok(Arc::new(Self {
         pool,
         closed: AtomicBool::new(false),
         path: path.to_path_buf(),
      }))
   }

   /// Path of the database file this provider serves
   pub fn path(&self) -> &Path {
      &self.path
   }

   /// Number of connections currently open (checked out plus idle)
   pub fn size(&self) -> u32 {
      self.pool.size()
   }

   /// Number of open connections sitting idle in the pool
   pub fn num_idle(&self) -> usize {
      self.pool.num_idle()
   }

   /// Returns true once `close()` has been called
   pub fn is_closed(&self) -> bool {
      self.closed.load(Ordering::SeqCst)
   }

   /// Close the provider and all pooled connections
   ///
   /// Waits for checked-out connections to be released. The WAL is
   /// checkpointed first so the main database file is complete on disk.
   ///
   /// Note: Takes `Arc<Self>` to consume ownership, preventing use-after-close at compile time.
   pub async fn close(self: Arc<Self>) -> Result<()> {
      if self.closed.swap(true, Ordering::SeqCst) {
         return Err(Error::ProviderClosed);
      }

      if let Ok(mut conn) = self.pool.acquire().await
         && let Err(e) = sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&mut *conn)
            .await
      {
         warn!("WAL checkpoint failed while closing {}: {}", self.path.display(), e);
      }

      self.pool.close().await;
      debug!("Closed connection provider for {}", self.path.display());

      Ok(())
   }

   /// Close the provider and delete the database, WAL and SHM files
   ///
   /// Use with caution!
   pub async fn remove(self: Arc<Self>) -> Result<()> {
      let path = self.path.clone();

      self.close().await?;

      // Main database file must exist
      std::fs::remove_file(&path)?;

      // WAL and SHM files may not exist
      for suffix in ["-wal", "-shm"] {
         if let Err(e) = std::fs::remove_file(sidecar_path(&path, suffix))
            && e.kind() != std::io::ErrorKind::NotFound
         {
            return Err(Error::Io(e));
         }
      }

      Ok(())
   }
}

impl ConnectionProvider for SqlitePoolProvider {
   async fn acquire(&self) -> std::result::Result<ConnectionHandle, sqlx::Error> {
      if self.is_closed() {
         return Err(sqlx::Error::PoolClosed);
      }

      let conn = self.pool.acquire().await?;
      trace!(
         "Checked out connection ({} open, {} idle)",
         self.pool.size(),
         self.pool.num_idle()
      );
      Ok(conn)
   }

   fn release(&self, conn: ConnectionHandle) {
      // PoolConnection returns itself to the pool on drop
      drop(conn);
      trace!("Released connection");
   }
}

fn is_memory_database(path: &Path) -> bool {
   path.to_str()
      .is_some_and(|p| p == ":memory:" || p.starts_with("file::memory:"))
}

/// `foo.db` -> `foo.db-wal` (SQLite appends to the full file name)
fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
   let mut name = OsString::from(path.as_os_str());
   name.push(suffix);
   PathBuf::from(name)
}

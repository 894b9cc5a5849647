//! The acquire/release contract between connection pools and their consumers

use std::future::Future;

use sqlx::Sqlite;
use sqlx::pool::PoolConnection;

/// A live, checked-out database session.
///
/// Derefs to `SqliteConnection`, so `&mut *handle` can be passed to any sqlx
/// query. Dropping a handle returns it to its pool; call
/// [`PoolConnection::close_on_drop`] first when the session must not be reused.
pub type ConnectionHandle = PoolConnection<Sqlite>;

/// Issues physical connections on demand and takes them back.
///
/// Implementations own pooling, health checks and timeout policy. They must be
/// safe to use from many tasks at once; consumers rely on that rather than
/// adding their own locking.
///
/// # Example
///
/// ```no_run
/// use sqlx_sqlite_provider::{ConnectionHandle, ConnectionProvider};
///
/// async fn row_count<P: ConnectionProvider>(provider: &P) -> Result<i64, sqlx::Error> {
///     let mut conn: ConnectionHandle = provider.acquire().await?;
///     let count = sqlx::query_scalar("SELECT COUNT(*) FROM users")
///         .fetch_one(&mut *conn)
///         .await;
///     provider.release(conn);
///     count
/// }
/// ```
pub trait ConnectionProvider: Send + Sync + 'static {
   /// Check out a connection.
   ///
   /// Exhaustion and timeouts are reported as the driver's own error
   /// (typically `sqlx::Error::PoolTimedOut`); this call never retries.
   fn acquire(&self) -> impl Future<Output = Result<ConnectionHandle, sqlx::Error>> + Send;

   /// Return a connection previously handed out by [`acquire`](Self::acquire).
   fn release(&self, conn: ConnectionHandle);
}

use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx_sqlite_provider::{ConnectionProvider, Error, ProviderConfig, SqlitePoolProvider};
use tempfile::TempDir;

async fn create_provider(config: Option<ProviderConfig>) -> (Arc<SqlitePoolProvider>, TempDir) {
   let temp_dir = TempDir::new().expect("Failed to create temp directory");
   let provider = SqlitePoolProvider::connect(temp_dir.path().join("provider.db"), config)
      .await
      .expect("Failed to open provider");

   (provider, temp_dir)
}

#[tokio::test]
async fn test_acquire_release_round_trip() {
   let (provider, _temp) = create_provider(None).await;

   let mut conn = provider.acquire().await.unwrap();
   sqlx::query("CREATE TABLE t (id INTEGER PRIMARY KEY, val TEXT)")
      .execute(&mut *conn)
      .await
      .unwrap();
   sqlx::query("INSERT INTO t (val) VALUES ('a')")
      .execute(&mut *conn)
      .await
      .unwrap();
   provider.release(conn);

   let mut conn = provider.acquire().await.unwrap();
   let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM t")
      .fetch_one(&mut *conn)
      .await
      .unwrap();
   provider.release(conn);

   assert_eq!(count, 1);
   provider.remove().await.unwrap();
}

#[tokio::test]
async fn test_exhausted_pool_times_out() {
   let config = ProviderConfig {
      max_connections: 1,
      acquire_timeout_secs: 1,
      ..Default::default()
   };
   let (provider, _temp) = create_provider(Some(config)).await;

   let held = provider.acquire().await.unwrap();

   let start = Instant::now();
   let result = provider.acquire().await;
   assert!(matches!(result, Err(sqlx::Error::PoolTimedOut)));
   assert!(start.elapsed() >= Duration::from_millis(900));

   provider.release(held);

   // Capacity is back once the held connection is released
   let conn = provider.acquire().await.unwrap();
   provider.release(conn);

   provider.remove().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_checkouts_are_distinct_sessions() {
   let (provider, _temp) = create_provider(None).await;

   let mut handles = vec![];
   for _ in 0..3 {
      let provider = Arc::clone(&provider);
      handles.push(tokio::spawn(async move {
         let mut conn = provider.acquire().await.unwrap();
         // Temp tables are private to a session
         sqlx::query("CREATE TEMP TABLE scratch (id INTEGER)")
            .execute(&mut *conn)
            .await
            .unwrap();
         tokio::time::sleep(Duration::from_millis(20)).await;
         conn.close_on_drop();
         provider.release(conn);
      }));
   }

   for handle in handles {
      handle.await.unwrap();
   }

   provider.remove().await.unwrap();
}

#[tokio::test]
async fn test_close_twice_is_an_error() {
   let (provider, _temp) = create_provider(None).await;
   let again = Arc::clone(&provider);

   provider.close().await.unwrap();
   let err = again.close().await.unwrap_err();
   assert!(matches!(err, Error::ProviderClosed));
}

#[tokio::test]
async fn test_remove_deletes_sidecar_files() {
   let (provider, temp) = create_provider(None).await;
   let db_path = temp.path().join("provider.db");

   let mut conn = provider.acquire().await.unwrap();
   sqlx::query("CREATE TABLE t (id INTEGER)")
      .execute(&mut *conn)
      .await
      .unwrap();
   provider.release(conn);

   assert!(db_path.exists());
   provider.remove().await.unwrap();

   assert!(!db_path.exists());
   assert!(!temp.path().join("provider.db-wal").exists());
   assert!(!temp.path().join("provider.db-shm").exists());
}

#[tokio::test]
async fn test_invalid_config_rejected() {
   let temp_dir = TempDir::new().unwrap();
   let config = ProviderConfig {
      max_connections: 0,
      ..Default::default()
   };

   let result = SqlitePoolProvider::connect(temp_dir.path().join("bad.db"), Some(config)).await;
   assert!(matches!(result, Err(Error::InvalidConfig(_))));
}

//! Configuration for the SQLite connection pool

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Configuration for SqlitePoolProvider
///
/// # Examples
///
/// ```
/// use sqlx_sqlite_provider::ProviderConfig;
///
/// // Use defaults
/// let config = ProviderConfig::default();
///
/// // Override just one field
/// let config = ProviderConfig {
///     max_connections: 2,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
   /// Maximum number of connections the pool will open
   ///
   /// Every unit of work holds one connection for its whole duration, so this
   /// bounds the number of concurrent transactions.
   ///
   /// Default: 6
   pub max_connections: u32,

   /// Connections kept open even when idle
   ///
   /// Default: 0
   pub min_connections: u32,

   /// How long `acquire()` waits for a free connection before failing (in seconds)
   ///
   /// Default: 30
   pub acquire_timeout_secs: u64,

   /// Idle timeout for pooled connections (in seconds)
   ///
   /// Connections that remain idle for this duration will be closed automatically.
   ///
   /// Default: 30
   pub idle_timeout_secs: u64,

   /// How long a statement waits on a locked database before failing with
   /// SQLITE_BUSY (in milliseconds)
   ///
   /// Default: 5000
   pub busy_timeout_ms: u64,
}

impl ProviderConfig {
   pub(crate) fn validate(&self) -> Result<(), Error> {
      if self.max_connections == 0 {
         return Err(Error::InvalidConfig(
            "max_connections must be at least 1".into(),
         ));
      }
      if self.min_connections > self.max_connections {
         return Err(Error::InvalidConfig(format!(
            "min_connections ({}) exceeds max_connections ({})",
            self.min_connections, self.max_connections
         )));
      }
      Ok(())
   }

   pub(crate) fn acquire_timeout(&self) -> Duration {
      Duration::from_secs(self.acquire_timeout_secs)
   }

   pub(crate) fn idle_timeout(&self) -> Duration {
      Duration::from_secs(self.idle_timeout_secs)
   }

   pub(crate) fn busy_timeout(&self) -> Duration {
      Duration::from_millis(self.busy_timeout_ms)
   }
}

impl Default for ProviderConfig {
   fn default() -> Self {
      Self {
         max_connections: 6,
         min_connections: 0,
         acquire_timeout_secs: 30,
         idle_timeout_secs: 30,
         busy_timeout_ms: 5000,
      }
   }
}

//! Error types for sqlx-sqlite-provider

use thiserror::Error;

/// Errors that may occur when opening or shutting down a provider
///
/// Checkout failures are not reported through this type: `acquire()` returns
/// the driver's own `sqlx::Error` so that callers can translate it.
#[derive(Error, Debug)]
pub enum Error {
   /// IO error when accessing database files. Standard library IO errors
   /// are converted to this variant.
   #[error("IO error: {0}")]
   Io(#[from] std::io::Error),

   /// Error from the sqlx library. Standard sqlx errors are converted to this variant
   #[error("Sqlx error: {0}")]
   Sqlx(#[from] sqlx::Error),

   /// Provider has been closed and cannot be used
   #[error("Connection provider has been closed")]
   ProviderClosed,

   /// Pool limits that can never be satisfied
   #[error("Invalid provider configuration: {0}")]
   InvalidConfig(String),
}

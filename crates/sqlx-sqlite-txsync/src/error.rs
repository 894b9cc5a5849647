use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::TxContext;

/// Result type alias for transaction and data-access operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Portable classification of a backend failure.
///
/// Categories are stable across database products, so callers can decide how
/// to recover (retry, regenerate a key, give up) without inspecting driver
/// specific codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
   /// A uniqueness constraint was violated.
   DuplicateKey,
   /// Any other constraint failure (foreign key, not null, check, ...).
   DataIntegrityViolation,
   /// The connection was lost or could not be used. Safe to retry.
   TransientConnection,
   /// No connection could be obtained (pool exhausted, timed out, closed).
   ResourceUnavailable,
   /// Malformed statement or reference to a missing object. Not safe to retry as-is.
   BadStatement,
   /// Lock contention or deadlock. Retrying the whole unit of work may succeed.
   ConcurrencyFailure,
   /// Fallback for failures no table entry matched.
   DataAccessError,
}

impl ErrorCategory {
   /// Machine-readable code for this category.
   pub fn code(self) -> &'static str {
      match self {
         ErrorCategory::DuplicateKey => "DUPLICATE_KEY",
         ErrorCategory::DataIntegrityViolation => "DATA_INTEGRITY_VIOLATION",
         ErrorCategory::TransientConnection => "TRANSIENT_CONNECTION",
         ErrorCategory::ResourceUnavailable => "RESOURCE_UNAVAILABLE",
         ErrorCategory::BadStatement => "BAD_STATEMENT",
         ErrorCategory::ConcurrencyFailure => "CONCURRENCY_FAILURE",
         ErrorCategory::DataAccessError => "DATA_ACCESS_ERROR",
      }
   }

   /// Whether repeating the failed work could succeed without changing it.
   pub fn is_transient(self) -> bool {
      matches!(
         self,
         ErrorCategory::TransientConnection
            | ErrorCategory::ResourceUnavailable
            | ErrorCategory::ConcurrencyFailure
      )
   }
}

impl fmt::Display for ErrorCategory {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let name = match self {
         ErrorCategory::DuplicateKey => "duplicate key",
         ErrorCategory::DataIntegrityViolation => "data integrity violation",
         ErrorCategory::TransientConnection => "transient connection failure",
         ErrorCategory::ResourceUnavailable => "resource unavailable",
         ErrorCategory::BadStatement => "bad statement",
         ErrorCategory::ConcurrencyFailure => "concurrency failure",
         ErrorCategory::DataAccessError => "data access error",
      };
      f.write_str(name)
   }
}

/// A backend failure translated into a portable category.
///
/// The driver error is kept as the `source()` so the full cause chain is
/// available for diagnostics.
#[derive(Debug, thiserror::Error)]
#[error("{task} failed ({category}): {source}")]
pub struct DataAccessError {
   category: ErrorCategory,
   task: String,
   sql: Option<String>,
   source: sqlx::Error,
}

impl DataAccessError {
   pub fn new(
      category: ErrorCategory,
      task: impl Into<String>,
      sql: Option<&str>,
      source: sqlx::Error,
   ) -> Self {
      Self {
         category,
         task: task.into(),
         sql: sql.map(str::to_owned),
         source,
      }
   }

   pub fn category(&self) -> ErrorCategory {
      self.category
   }

   /// The operation that failed, e.g. `"execute"` or `"commit"`.
   pub fn task(&self) -> &str {
      &self.task
   }

   /// Statement text, when the failure came from a statement.
   pub fn sql(&self) -> Option<&str> {
      self.sql.as_deref()
   }

   /// The backend's own error code, if the driver reported one.
   pub fn backend_code(&self) -> Option<String> {
      self
         .source
         .as_database_error()
         .and_then(|db_err| db_err.code())
         .map(|code| code.into_owned())
   }

   /// The untranslated driver error.
   pub fn cause(&self) -> &sqlx::Error {
      &self.source
   }

   pub fn into_cause(self) -> sqlx::Error {
      self.source
   }
}

/// Error types for transaction coordination and data access.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Backend failure, already translated.
   #[error(transparent)]
   DataAccess(#[from] DataAccessError),

   /// A connection is already bound to this context.
   #[error("a transaction is already bound to context {0}")]
   AlreadyBound(TxContext),

   /// `RequiresNew` writer asked for while the context's current transaction
   /// holds the database write lock. SQLite allows one writer at a time, so
   /// the new transaction could never begin.
   #[error("new write transaction blocked: context {0} already holds the write lock")]
   SuspendedWriterConflict(TxContext),

   /// Mandatory propagation found nothing to join.
   #[error("no active transaction for context {0}")]
   NoActiveTransaction(TxContext),

   /// The bound connection was already handed back by commit or rollback.
   #[error("transaction has already been finalized (committed or rolled back)")]
   TransactionAlreadyFinalized,

   /// Commit failed; the transaction was rolled back instead.
   #[error("commit failed, transaction rolled back: {0}")]
   CommitFailed(#[source] DataAccessError),

   /// Commit failed and the rollback attempted afterwards failed too.
   #[error("commit failed: {commit_error}; rollback also failed: {rollback_error}")]
   CommitRollbackFailed {
      #[source]
      commit_error: DataAccessError,
      rollback_error: DataAccessError,
   },

   /// Rollback failed.
   #[error("rollback failed: {0}")]
   RollbackFailed(#[source] DataAccessError),

   /// A participating caller marked the transaction rollback-only, so the
   /// owner's commit rolled back instead.
   #[error("transaction rolled back because it has been marked as rollback-only")]
   UnexpectedRollback,

   /// A single-row query returned nothing.
   #[error("query returned no rows, expected exactly one")]
   EmptyResult,

   /// A single-row query returned several rows.
   #[error("query returned {0} rows, expected at most one")]
   MultipleRowsReturned(usize),

   /// A decoded row did not fit the shape the caller mapped it to.
   #[error("row mapping failed: {0}")]
   RowMapping(#[source] serde_json::Error),

   /// SQLite type that cannot be mapped to JSON.
   #[error("unsupported datatype: {0}")]
   UnsupportedDatatype(String),

   /// Configuration could not be parsed.
   #[error("invalid configuration: {0}")]
   Config(#[from] serde_json::Error),
}

impl Error {
   /// Portable category of the underlying backend failure, if there is one.
   ///
   /// For a failed commit this is the category of the commit failure, not of
   /// the rollback that followed it.
   pub fn category(&self) -> Option<ErrorCategory> {
      match self {
         Error::DataAccess(e) | Error::CommitFailed(e) | Error::RollbackFailed(e) => {
            Some(e.category())
         }
         Error::CommitRollbackFailed { commit_error, .. } => Some(commit_error.category()),
         _ => None,
      }
   }

   /// Shorthand for `self.category() == Some(category)`.
   pub fn is(&self, category: ErrorCategory) -> bool {
      self.category() == Some(category)
   }

   /// Extract a structured error code from the error type.
   ///
   /// This provides machine-readable error codes for error handling.
   pub fn error_code(&self) -> String {
      match self {
         Error::DataAccess(e) => e.category().code().to_string(),
         Error::AlreadyBound(_) => "ALREADY_BOUND".to_string(),
         Error::SuspendedWriterConflict(_) => "SUSPENDED_WRITER_CONFLICT".to_string(),
         Error::NoActiveTransaction(_) => "NO_ACTIVE_TRANSACTION".to_string(),
         Error::TransactionAlreadyFinalized => "TRANSACTION_ALREADY_FINALIZED".to_string(),
         Error::CommitFailed(_) => "COMMIT_FAILED".to_string(),
         Error::CommitRollbackFailed { .. } => "COMMIT_ROLLBACK_FAILED".to_string(),
         Error::RollbackFailed(_) => "ROLLBACK_FAILED".to_string(),
         Error::UnexpectedRollback => "UNEXPECTED_ROLLBACK".to_string(),
         Error::EmptyResult => "EMPTY_RESULT".to_string(),
         Error::MultipleRowsReturned(_) => "MULTIPLE_ROWS_RETURNED".to_string(),
         Error::RowMapping(_) => "ROW_MAPPING_FAILED".to_string(),
         Error::UnsupportedDatatype(_) => "UNSUPPORTED_DATATYPE".to_string(),
         Error::Config(_) => "CONFIG_ERROR".to_string(),
      }
   }
}

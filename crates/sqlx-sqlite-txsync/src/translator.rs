//! Translation of driver failures into portable error categories

use std::sync::Arc;

use tracing::debug;

use crate::codes::{Backend, ErrorCodeTable};
use crate::error::{DataAccessError, ErrorCategory};

/// A backend failure as the translator sees it: an optional vendor code plus
/// the driver's message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorSignal {
   pub code: Option<String>,
   pub message: String,
}

impl ErrorSignal {
   pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
      Self {
         code: Some(code.into()),
         message: message.into(),
      }
   }

   /// Extract the signal from a sqlx error. Only database errors carry a code.
   pub fn from_sqlx(err: &sqlx::Error) -> Self {
      match err.as_database_error() {
         Some(db_err) => Self {
            code: db_err.code().map(|c| c.into_owned()),
            message: db_err.message().to_string(),
         },
         None => Self {
            code: None,
            message: err.to_string(),
         },
      }
   }
}

/// Maps backend failures to [`ErrorCategory`] using an [`ErrorCodeTable`].
///
/// Cloning is cheap; the table is shared.
#[derive(Debug, Clone)]
pub struct ErrorTranslator {
   backend: Backend,
   table: Arc<ErrorCodeTable>,
}

impl ErrorTranslator {
   pub fn new(backend: Backend, table: ErrorCodeTable) -> Self {
      Self {
         backend,
         table: Arc::new(table),
      }
   }

   /// Translator for SQLite with the built-in tables.
   pub fn sqlite() -> Self {
      Self::new(Backend::Sqlite, ErrorCodeTable::default())
   }

   pub fn backend(&self) -> Backend {
      self.backend
   }

   pub fn table(&self) -> &ErrorCodeTable {
      &self.table
   }

   /// Classify a signal from this translator's backend.
   pub fn classify(&self, signal: &ErrorSignal) -> ErrorCategory {
      self.classify_for(self.backend, signal)
   }

   /// Classify a signal from any backend in the table.
   ///
   /// Signals without a code, or with a code no list mentions, fall back to
   /// [`ErrorCategory::DataAccessError`]. For SQLite an unknown extended
   /// result code is retried as its primary code (the low byte).
   pub fn classify_for(&self, backend: Backend, signal: &ErrorSignal) -> ErrorCategory {
      let Some(code) = signal.code.as_deref() else {
         return ErrorCategory::DataAccessError;
      };

      self
         .table
         .classify(backend, code)
         .or_else(|| {
            if backend != Backend::Sqlite {
               return None;
            }
            let extended: i32 = code.parse().ok()?;
            let primary = extended & 0xff;
            (primary != extended)
               .then(|| self.table.classify(backend, &primary.to_string()))
               .flatten()
         })
         .unwrap_or(ErrorCategory::DataAccessError)
   }

   /// Category of a sqlx error.
   ///
   /// Database errors go through the code table. Pool and transport failures
   /// are classified by kind since they carry no code.
   pub fn category_of(&self, err: &sqlx::Error) -> ErrorCategory {
      match err {
         sqlx::Error::Database(_) => self.classify(&ErrorSignal::from_sqlx(err)),
         sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => ErrorCategory::ResourceUnavailable,
         sqlx::Error::Io(_)
         | sqlx::Error::Tls(_)
         | sqlx::Error::Protocol(_)
         | sqlx::Error::WorkerCrashed => ErrorCategory::TransientConnection,
         _ => ErrorCategory::DataAccessError,
      }
   }

   /// Wrap `err` in a [`DataAccessError`] for the failed `task`.
   pub fn translate(&self, task: &str, sql: Option<&str>, err: sqlx::Error) -> DataAccessError {
      let category = self.category_of(&err);
      let translated = DataAccessError::new(category, task, sql, err);
      debug!(
         "Translated {} failure to {} (code {:?})",
         task,
         category.code(),
         translated.backend_code()
      );
      translated
   }
}

impl Default for ErrorTranslator {
   fn default() -> Self {
      Self::sqlite()
   }
}

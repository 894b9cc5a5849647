use serde::{Serialize, Serializer};
use sqlx_sqlite_txsync::ErrorCategory;

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Structured error response for callers.
#[derive(Serialize)]
struct ErrorResponse {
   code: String,
   message: String,
}

/// Error types for the member ledger.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Transaction or data-access failure.
   #[error(transparent)]
   Data(#[from] sqlx_sqlite_txsync::Error),

   /// No member with this id.
   #[error("member {0} not found")]
   MemberNotFound(String),

   /// A business rule rejected the operation.
   #[error("validation failed: {0}")]
   Validation(String),
}

impl Error {
   /// Portable category of the underlying backend failure, if there is one.
   pub fn category(&self) -> Option<ErrorCategory> {
      match self {
         Error::Data(e) => e.category(),
         _ => None,
      }
   }

   /// Extract a structured error code from the error type.
   pub fn error_code(&self) -> String {
      match self {
         Error::Data(e) => e.error_code(),
         Error::MemberNotFound(_) => "MEMBER_NOT_FOUND".to_string(),
         Error::Validation(_) => "VALIDATION_FAILED".to_string(),
      }
   }
}

impl Serialize for Error {
   fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
   where
      S: Serializer,
   {
      let response = ErrorResponse {
         code: self.error_code(),
         message: self.to_string(),
      };
      response.serialize(serializer)
   }
}

use std::fmt;

use uuid::Uuid;

/// Identity of one logical unit of work.
///
/// Create one per task or request and pass it to every transaction and
/// data-access call belonging to that unit of work. Calls made with the same
/// context share the bound connection; calls made with different contexts
/// never see each other's binding.
///
/// ```
/// use sqlx_sqlite_txsync::TxContext;
///
/// let a = TxContext::new();
/// let b = TxContext::new();
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxContext(Uuid);

impl TxContext {
   pub fn new() -> Self {
      Self(Uuid::new_v4())
   }

   pub fn id(&self) -> Uuid {
      self.0
   }
}

impl Default for TxContext {
   fn default() -> Self {
      Self::new()
   }
}

impl fmt::Display for TxContext {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "{}", self.0.simple())
   }
}

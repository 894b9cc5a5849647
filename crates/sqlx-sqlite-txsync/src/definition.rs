//! Transaction definitions: propagation, isolation and read-only settings

use serde::{Deserialize, Serialize};

/// How `begin` behaves when the context already has a transaction bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Propagation {
   /// Join the bound transaction, or start a new one if there is none.
   #[default]
   Required,
   /// Always start a new physical transaction. A bound one is suspended until
   /// the new one completes.
   RequiresNew,
   /// Join the bound transaction; fail if there is none.
   Mandatory,
}

/// Requested isolation level.
///
/// SQLite transactions are serializable. `ReadUncommitted` switches on
/// `PRAGMA read_uncommitted` for the duration of the transaction; the other
/// levels are already satisfied and leave the connection untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
   #[default]
   Default,
   ReadUncommitted,
   ReadCommitted,
   RepeatableRead,
   Serializable,
}

/// Settings a transaction is opened with.
///
/// # Examples
///
/// ```
/// use sqlx_sqlite_txsync::{Isolation, Propagation, TransactionDefinition};
///
/// let definition = TransactionDefinition::requires_new()
///    .with_isolation(Isolation::ReadUncommitted)
///    .with_name("audit");
///
/// assert_eq!(definition.propagation, Propagation::RequiresNew);
///
/// // Definitions can also come from configuration
/// let definition: TransactionDefinition =
///    serde_json::from_str(r#"{ "propagation": "mandatory", "read_only": true }"#).unwrap();
/// assert!(definition.read_only);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionDefinition {
   pub propagation: Propagation,
   pub isolation: Isolation,
   /// Runs the transaction with `PRAGMA query_only` and a deferred lock.
   pub read_only: bool,
   /// Label used in log output.
   pub name: Option<String>,
}

impl TransactionDefinition {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn requires_new() -> Self {
      Self {
         propagation: Propagation::RequiresNew,
         ..Self::default()
      }
   }

   pub fn mandatory() -> Self {
      Self {
         propagation: Propagation::Mandatory,
         ..Self::default()
      }
   }

   pub fn with_isolation(mut self, isolation: Isolation) -> Self {
      self.isolation = isolation;
      self
   }

   pub fn with_read_only(mut self, read_only: bool) -> Self {
      self.read_only = read_only;
      self
   }

   pub fn with_name(mut self, name: impl Into<String>) -> Self {
      self.name = Some(name.into());
      self
   }

   /// Writers take the write lock up front so that two units of work never
   /// deadlock upgrading from a shared lock.
   pub(crate) fn begin_statement(&self) -> &'static str {
      if self.read_only {
         "BEGIN DEFERRED"
      } else {
         "BEGIN IMMEDIATE"
      }
   }

   pub(crate) fn label(&self) -> &str {
      self.name.as_deref().unwrap_or("unnamed")
   }
}

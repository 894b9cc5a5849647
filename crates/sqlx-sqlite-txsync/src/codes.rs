//! Backend error-code tables
//!
//! Each database product reports failures with its own code space: a
//! duplicate key is `2067` in SQLite, `23505` in PostgreSQL and H2, `1062` in
//! MySQL. An [`ErrorCodeTable`] maps those codes to [`ErrorCategory`] values
//! per [`Backend`], and is static configuration: either the built-in defaults
//! or a table loaded from JSON.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::error::ErrorCategory;

/// Database product whose code space a table describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
   Sqlite,
   Postgres,
   #[serde(rename = "mysql")]
   MySql,
   H2,
}

impl Backend {
   pub const ALL: [Backend; 4] = [Backend::Sqlite, Backend::Postgres, Backend::MySql, Backend::H2];
}

impl fmt::Display for Backend {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let name = match self {
         Backend::Sqlite => "SQLite",
         Backend::Postgres => "PostgreSQL",
         Backend::MySql => "MySQL",
         Backend::H2 => "H2",
      };
      f.write_str(name)
   }
}

/// Codes belonging to each category for one backend.
///
/// When a code appears in several lists the first match wins, in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorCodes {
   pub duplicate_key: Vec<String>,
   pub data_integrity_violation: Vec<String>,
   pub bad_statement: Vec<String>,
   pub transient_connection: Vec<String>,
   pub resource_unavailable: Vec<String>,
   pub concurrency_failure: Vec<String>,
}

impl ErrorCodes {
   /// Category for `code`, or `None` when no list contains it.
   pub fn classify(&self, code: &str) -> Option<ErrorCategory> {
      let lists = [
         (&self.duplicate_key, ErrorCategory::DuplicateKey),
         (
            &self.data_integrity_violation,
            ErrorCategory::DataIntegrityViolation,
         ),
         (&self.bad_statement, ErrorCategory::BadStatement),
         (&self.transient_connection, ErrorCategory::TransientConnection),
         (&self.resource_unavailable, ErrorCategory::ResourceUnavailable),
         (&self.concurrency_failure, ErrorCategory::ConcurrencyFailure),
      ];

      lists
         .into_iter()
         .find(|(codes, _)| codes.iter().any(|c| c == code))
         .map(|(_, category)| category)
   }

   /// SQLite extended result codes.
   pub fn sqlite() -> Self {
      Self {
         // SQLITE_CONSTRAINT_PRIMARYKEY, SQLITE_CONSTRAINT_UNIQUE
         duplicate_key: codes(&["1555", "2067"]),
         // SQLITE_CONSTRAINT and its CHECK, COMMITHOOK, FOREIGNKEY, FUNCTION,
         // NOTNULL, TRIGGER, ROWID, DATATYPE variants; SQLITE_TOOBIG, SQLITE_MISMATCH
         data_integrity_violation: codes(&[
            "19", "275", "531", "787", "1043", "1299", "1811", "2579", "3091", "18", "20",
         ]),
         // SQLITE_ERROR (syntax, missing table/column), SQLITE_RANGE
         bad_statement: codes(&["1", "25"]),
         // SQLITE_IOERR (+READ, SHORT_READ, WRITE, FSYNC), SQLITE_CANTOPEN, SQLITE_PROTOCOL
         transient_connection: codes(&["10", "266", "522", "778", "1034", "14", "15"]),
         // SQLITE_NOMEM, SQLITE_FULL
         resource_unavailable: codes(&["7", "13"]),
         // SQLITE_BUSY (+RECOVERY, SNAPSHOT, TIMEOUT), SQLITE_LOCKED (+SHAREDCACHE)
         concurrency_failure: codes(&["5", "261", "517", "773", "6", "262"]),
      }
   }

   /// PostgreSQL SQLSTATE codes.
   pub fn postgres() -> Self {
      Self {
         duplicate_key: codes(&["23505"]),
         data_integrity_violation: codes(&["23000", "23502", "23503", "23514", "22001", "22003"]),
         bad_statement: codes(&["03000", "42000", "42601", "42602", "42622", "42804", "42P01"]),
         transient_connection: codes(&["08000", "08001", "08003", "08004", "08006", "57P01"]),
         resource_unavailable: codes(&["53000", "53100", "53200", "53300"]),
         concurrency_failure: codes(&["40001", "40P01", "55P03"]),
      }
   }

   /// MySQL vendor error numbers.
   pub fn mysql() -> Self {
      Self {
         duplicate_key: codes(&["1062"]),
         data_integrity_violation: codes(&[
            "630", "839", "840", "893", "1169", "1215", "1216", "1217", "1364", "1451", "1452",
            "1557",
         ]),
         bad_statement: codes(&["1054", "1064", "1146"]),
         transient_connection: codes(&["2002", "2003", "2006", "2013"]),
         resource_unavailable: codes(&["1040"]),
         concurrency_failure: codes(&["1205", "1213"]),
      }
   }

   /// H2 vendor error codes.
   pub fn h2() -> Self {
      Self {
         duplicate_key: codes(&["23001", "23505"]),
         data_integrity_violation: codes(&[
            "22001", "22003", "22012", "22018", "22025", "23000", "23002", "23003", "23502",
            "23503", "23506", "23507", "23513",
         ]),
         bad_statement: codes(&[
            "42000", "42001", "42101", "42102", "42111", "42112", "42121", "42122", "42132",
         ]),
         transient_connection: codes(&["90046", "90100", "90117", "90121", "90126"]),
         resource_unavailable: Vec::new(),
         concurrency_failure: codes(&["50200", "40001"]),
      }
   }
}

fn codes(list: &[&str]) -> Vec<String> {
   list.iter().map(|c| (*c).to_string()).collect()
}

/// Code tables keyed by backend.
///
/// # Examples
///
/// ```
/// use sqlx_sqlite_txsync::{Backend, ErrorCategory, ErrorCodeTable, ErrorCodes};
///
/// // Built-in tables for every supported backend
/// let table = ErrorCodeTable::default();
/// assert_eq!(table.classify(Backend::MySql, "1062"), Some(ErrorCategory::DuplicateKey));
///
/// // Tables are plain configuration
/// let json = r#"{ "sqlite": { "duplicate_key": ["2067"] } }"#;
/// let table = ErrorCodeTable::from_json(json).unwrap();
/// assert_eq!(table.classify(Backend::Sqlite, "2067"), Some(ErrorCategory::DuplicateKey));
/// assert_eq!(table.classify(Backend::Postgres, "23505"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCodeTable(HashMap<Backend, ErrorCodes>);

impl ErrorCodeTable {
   /// A table with no backends at all; every code falls back.
   pub fn empty() -> Self {
      Self(HashMap::new())
   }

   /// Load a table from JSON, keyed by backend name (`"sqlite"`, `"postgres"`, ...).
   pub fn from_json(json: &str) -> Result<Self> {
      Ok(serde_json::from_str(json)?)
   }

   /// Replace the codes for one backend.
   pub fn with_codes(mut self, backend: Backend, codes: ErrorCodes) -> Self {
      self.0.insert(backend, codes);
      self
   }

   pub fn codes_for(&self, backend: Backend) -> Option<&ErrorCodes> {
      self.0.get(&backend)
   }

   /// Backends this table has entries for.
   pub fn backends(&self) -> impl Iterator<Item = Backend> + '_ {
      self.0.keys().copied()
   }

   pub fn classify(&self, backend: Backend, code: &str) -> Option<ErrorCategory> {
      self.codes_for(backend).and_then(|codes| codes.classify(code))
   }
}

impl Default for ErrorCodeTable {
   fn default() -> Self {
      Self::empty()
         .with_codes(Backend::Sqlite, ErrorCodes::sqlite())
         .with_codes(Backend::Postgres, ErrorCodes::postgres())
         .with_codes(Backend::MySql, ErrorCodes::mysql())
         .with_codes(Backend::H2, ErrorCodes::h2())
   }
}

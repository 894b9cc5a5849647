use base64::Engine;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteRow, SqliteValueRef};
use sqlx::{Column, Row as _, TypeInfo, Value, ValueRef};

use crate::Result;
use crate::error::Error;

/// A decoded result row: column name to JSON value, in select-list order.
pub type Row = IndexMap<String, JsonValue>;

/// Convert a SQLite value to a JSON value.
///
/// BLOB values become base64 strings since JSON has no binary type. Dates
/// and times are stored as TEXT by SQLite and come back as strings.
pub fn to_json(value: SqliteValueRef) -> Result<JsonValue> {
   if value.is_null() {
      return Ok(JsonValue::Null);
   }

   let column_type = value.type_info();
   let owned = value.to_owned();

   let result = match column_type.name() {
      "TEXT" | "DATE" | "TIME" | "DATETIME" => owned
         .try_decode::<String>()
         .map(JsonValue::String)
         .unwrap_or(JsonValue::Null),

      "REAL" => owned
         .try_decode::<f64>()
         .map(JsonValue::from)
         .unwrap_or(JsonValue::Null),

      "INTEGER" | "NUMERIC" => owned
         .try_decode::<i64>()
         .map(JsonValue::from)
         .unwrap_or(JsonValue::Null),

      "BOOLEAN" => owned
         .try_decode::<bool>()
         .map(JsonValue::Bool)
         .unwrap_or(JsonValue::Null),

      "BLOB" => owned
         .try_decode::<Vec<u8>>()
         .map(|blob| JsonValue::String(base64_encode(&blob)))
         .unwrap_or(JsonValue::Null),

      "NULL" => JsonValue::Null,

      other => match owned.try_decode::<String>() {
         Ok(text) => JsonValue::String(text),
         Err(_) => {
            return Err(Error::UnsupportedDatatype(format!(
               "Unknown SQLite type: {other}"
            )));
         }
      },
   };

   Ok(result)
}

/// Decode every column of `row`.
pub fn decode_row(row: &SqliteRow) -> Result<Row> {
   let mut decoded = IndexMap::with_capacity(row.len());
   for (index, column) in row.columns().iter().enumerate() {
      let raw = row
         .try_get_raw(index)
         .map_err(|e| Error::UnsupportedDatatype(e.to_string()))?;
      decoded.insert(column.name().to_string(), to_json(raw)?);
   }
   Ok(decoded)
}

pub fn decode_rows(rows: &[SqliteRow]) -> Result<Vec<Row>> {
   rows.iter().map(decode_row).collect()
}

/// Map a decoded row onto a deserializable type, matching columns to fields
/// by name.
///
/// ```
/// use serde::Deserialize;
/// use serde_json::json;
/// use sqlx_sqlite_txsync::{Row, from_row};
///
/// #[derive(Deserialize)]
/// struct Account {
///    id: String,
///    balance: i64,
/// }
///
/// let mut row = Row::new();
/// row.insert("id".into(), json!("a-1"));
/// row.insert("balance".into(), json!(500));
///
/// let account: Account = from_row(row).unwrap();
/// assert_eq!(account.balance, 500);
/// ```
pub fn from_row<T: DeserializeOwned>(row: Row) -> Result<T> {
   let object = row.into_iter().collect::<serde_json::Map<_, _>>();
   serde_json::from_value(JsonValue::Object(object)).map_err(Error::RowMapping)
}

fn base64_encode(data: &[u8]) -> String {
   base64::engine::general_purpose::STANDARD.encode(data)
}

//! Tests for statement execution, row decoding and error translation.

mod common;

use common::create_test_db;
use serde::Deserialize;
use serde_json::json;
use sqlx_sqlite_txsync::{Error, ErrorCategory, TransactionDefinition, TxContext, from_row};

#[derive(Debug, Deserialize, PartialEq)]
struct Item {
   id: String,
   label: String,
}

// ============================================================================
// Standalone execution
// ============================================================================

#[tokio::test]
async fn test_standalone_calls_acquire_and_release_each_time() {
   let db = create_test_db("standalone.db", None).await;
   let ctx = TxContext::new();

   db.insert_item(ctx, "a").await.unwrap();
   db.insert_item(ctx, "b").await.unwrap();

   assert_eq!(db.provider.acquired(), 2);
   assert_eq!(db.provider.released(), 2);
   assert_eq!(db.count_items().await, 2);
}

#[tokio::test]
async fn test_failed_standalone_statement_still_releases() {
   let db = create_test_db("standalone_fail.db", None).await;

   let err = db
      .sql
      .execute(TxContext::new(), "INSERT INTO missing_table VALUES (1)", vec![])
      .await
      .unwrap_err();

   assert!(err.is(ErrorCategory::BadStatement));
   assert_eq!(db.provider.acquired(), 1);
   assert_eq!(db.provider.released(), 1);
}

#[tokio::test]
async fn test_execute_reports_rows_and_rowid() {
   let db = create_test_db("write_result.db", None).await;
   let ctx = TxContext::new();

   db.sql
      .execute(ctx, "CREATE TABLE log (n INTEGER PRIMARY KEY, msg TEXT)", vec![])
      .await
      .unwrap();
   let first = db
      .sql
      .execute(ctx, "INSERT INTO log (msg) VALUES (?)", vec![json!("one")])
      .await
      .unwrap();
   let second = db
      .sql
      .execute(ctx, "INSERT INTO log (msg) VALUES (?)", vec![json!("two")])
      .await
      .unwrap();
   assert_eq!(first.rows_affected, 1);
   assert_eq!(second.last_insert_id, first.last_insert_id + 1);

   let updated = db
      .sql
      .execute(ctx, "UPDATE log SET msg = 'x'", vec![])
      .await
      .unwrap();
   assert_eq!(updated.rows_affected, 2);
}

// ============================================================================
// Bound execution
// ============================================================================

#[tokio::test]
async fn test_bound_statements_see_uncommitted_work() {
   let db = create_test_db("visibility.db", None).await;
   let ctx = TxContext::new();

   let status = db.manager.begin(ctx, &TransactionDefinition::default()).await.unwrap();
   db.insert_item(ctx, "pending").await.unwrap();

   let inside = db.sql.query(ctx, "SELECT id FROM items", vec![]).await.unwrap();
   assert_eq!(inside.len(), 1);

   // Another context reads committed data only
   let outside = db
      .sql
      .query(TxContext::new(), "SELECT id FROM items", vec![])
      .await
      .unwrap();
   assert!(outside.is_empty());

   db.manager.commit(status).await.unwrap();
}

// ============================================================================
// Single-row queries
// ============================================================================

#[tokio::test]
async fn test_query_optional_cardinality() {
   let db = create_test_db("optional.db", None).await;
   let ctx = TxContext::new();

   let none = db
      .sql
      .query_optional(ctx, "SELECT * FROM items WHERE id = ?", vec![json!("a")])
      .await
      .unwrap();
   assert!(none.is_none());

   db.insert_item(ctx, "a").await.unwrap();
   db.insert_item(ctx, "b").await.unwrap();

   let one = db
      .sql
      .query_optional(ctx, "SELECT * FROM items WHERE id = ?", vec![json!("a")])
      .await
      .unwrap()
      .unwrap();
   assert_eq!(one["id"], "a");

   let err = db
      .sql
      .query_optional(ctx, "SELECT * FROM items", vec![])
      .await
      .unwrap_err();
   assert!(matches!(err, Error::MultipleRowsReturned(2)));
}

#[tokio::test]
async fn test_query_for_object_maps_row() {
   let db = create_test_db("object.db", None).await;
   let ctx = TxContext::new();
   db.insert_item(ctx, "a").await.unwrap();

   let item: Item = db
      .sql
      .query_for_object(
         ctx,
         "SELECT id, label FROM items WHERE id = ?",
         vec![json!("a")],
         from_row,
      )
      .await
      .unwrap();
   assert_eq!(
      item,
      Item {
         id: "a".into(),
         label: "x".into()
      }
   );

   let err = db
      .sql
      .query_for_object(
         ctx,
         "SELECT id, label FROM items WHERE id = ?",
         vec![json!("zzz")],
         from_row::<Item>,
      )
      .await
      .unwrap_err();
   assert!(matches!(err, Error::EmptyResult));
}

// ============================================================================
// Value binding and decoding
// ============================================================================

#[tokio::test]
async fn test_values_decode_to_json() {
   let db = create_test_db("decode.db", None).await;
   let ctx = TxContext::new();

   let row = db
      .sql
      .query_optional(
         ctx,
         "SELECT 42 AS i, 1.5 AS r, 'hi' AS t, NULL AS n, X'68656C6C6F' AS b",
         vec![],
      )
      .await
      .unwrap()
      .unwrap();

   let columns: Vec<_> = row.keys().map(String::as_str).collect();
   assert_eq!(columns, ["i", "r", "t", "n", "b"]);
   assert_eq!(row["i"], 42);
   assert_eq!(row["r"], 1.5);
   assert_eq!(row["t"], "hi");
   assert!(row["n"].is_null());
   assert_eq!(row["b"], "aGVsbG8=");
}

#[tokio::test]
async fn test_parameters_keep_their_types() {
   let db = create_test_db("bind.db", None).await;
   let ctx = TxContext::new();

   let row = db
      .sql
      .query_optional(
         ctx,
         "SELECT ? AS big, ? AS flag, ? AS nothing, ? AS doc, typeof(?) AS kind",
         vec![
            json!(i64::MAX),
            json!(true),
            json!(null),
            json!({ "k": [1, 2] }),
            json!(2.25),
         ],
      )
      .await
      .unwrap()
      .unwrap();

   assert_eq!(row["big"], i64::MAX);
   assert_eq!(row["flag"], 1);
   assert!(row["nothing"].is_null());
   assert_eq!(row["doc"], r#"{"k":[1,2]}"#);
   assert_eq!(row["kind"], "real");
}

// ============================================================================
// Error translation
// ============================================================================

#[tokio::test]
async fn test_duplicate_key_is_translated() {
   let db = create_test_db("duplicate.db", None).await;
   let ctx = TxContext::new();

   db.insert_item(ctx, "a").await.unwrap();
   let err = db.insert_item(ctx, "a").await.unwrap_err();

   assert!(err.is(ErrorCategory::DuplicateKey));
   assert_eq!(err.error_code(), "DUPLICATE_KEY");
   match err {
      Error::DataAccess(cause) => {
         assert_eq!(cause.backend_code().as_deref(), Some("1555"));
         assert_eq!(cause.task(), "execute");
         assert!(cause.sql().unwrap().starts_with("INSERT INTO items"));
         assert!(matches!(cause.cause(), sqlx::Error::Database(_)));
      }
      other => panic!("expected DataAccess, got {other:?}"),
   }
}

#[tokio::test]
async fn test_unique_index_violation_is_duplicate_key() {
   let db = create_test_db("unique.db", None).await;
   let ctx = TxContext::new();

   db.sql
      .execute(ctx, "CREATE UNIQUE INDEX items_label ON items (label)", vec![])
      .await
      .unwrap();
   db.insert_item(ctx, "a").await.unwrap();

   let err = db.insert_item(ctx, "b").await.unwrap_err();
   assert!(err.is(ErrorCategory::DuplicateKey));
}

#[tokio::test]
async fn test_not_null_violation_is_integrity_violation() {
   let db = create_test_db("not_null.db", None).await;

   let err = db
      .sql
      .execute(
         TxContext::new(),
         "INSERT INTO items (id, label) VALUES (?, ?)",
         vec![json!("a"), json!(null)],
      )
      .await
      .unwrap_err();
   assert!(err.is(ErrorCategory::DataIntegrityViolation));
}

#[tokio::test]
async fn test_syntax_error_is_bad_statement() {
   let db = create_test_db("syntax.db", None).await;

   let err = db
      .sql
      .query(TxContext::new(), "SELEC id FROM items", vec![])
      .await
      .unwrap_err();
   assert!(err.is(ErrorCategory::BadStatement));
   assert!(!err.category().unwrap().is_transient());
}

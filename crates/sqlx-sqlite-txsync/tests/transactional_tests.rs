//! Tests for running closures inside transactions.

mod common;

use std::sync::Arc;

use common::create_test_db;
use sqlx_sqlite_txsync::{
   Error, ErrorCategory, TransactionDefinition, TransactionTemplate, TxContext,
};

#[derive(Debug, thiserror::Error)]
enum AppError {
   #[error(transparent)]
   Data(#[from] Error),

   #[error("rejected: {0}")]
   Rejected(String),
}

#[tokio::test]
async fn test_success_commits() {
   let db = create_test_db("wrap_commit.db", None).await;
   let tx = TransactionTemplate::new(Arc::clone(&db.manager));
   let (db, tx) = (&db, &tx);

   let value = tx
      .execute(TxContext::new(), |ctx| async move {
         db.insert_item(ctx, "a").await?;
         db.insert_item(ctx, "b").await?;
         Ok::<_, AppError>(7)
      })
      .await
      .unwrap();

   assert_eq!(value, 7);
   assert_eq!(db.count_items().await, 2);
   assert_eq!(db.provider.acquired(), 1);
   assert_eq!(db.provider.released(), 1);
}

#[tokio::test]
async fn test_application_error_rolls_back() {
   let db = create_test_db("wrap_app_error.db", None).await;
   let tx = TransactionTemplate::new(Arc::clone(&db.manager));
   let (db, tx) = (&db, &tx);

   let err = tx
      .execute(TxContext::new(), |ctx| async move {
         db.insert_item(ctx, "a").await?;
         Err::<(), _>(AppError::Rejected("nope".into()))
      })
      .await
      .unwrap_err();

   assert!(matches!(err, AppError::Rejected(ref msg) if msg == "nope"));
   assert_eq!(db.count_items().await, 0);
   assert_eq!(db.provider.released(), 1);
   assert!(db.manager.registry().is_empty());
}

#[tokio::test]
async fn test_data_error_rolls_back_earlier_work() {
   let db = create_test_db("wrap_data_error.db", None).await;
   let tx = TransactionTemplate::new(Arc::clone(&db.manager));
   let (db, tx) = (&db, &tx);

   let err = tx
      .execute(TxContext::new(), |ctx| async move {
         db.insert_item(ctx, "a").await?;
         db.insert_item(ctx, "a").await?;
         Ok::<_, Error>(())
      })
      .await
      .unwrap_err();

   assert!(err.is(ErrorCategory::DuplicateKey));
   assert_eq!(db.count_items().await, 0);
}

#[tokio::test]
async fn test_panic_rolls_back_and_resumes() {
   let db = Arc::new(create_test_db("wrap_panic.db", None).await);
   let tx = TransactionTemplate::new(Arc::clone(&db.manager));
   let ctx = TxContext::new();

   let task_db = Arc::clone(&db);
   let handle = tokio::spawn(async move {
      tx.execute(ctx, |ctx| async move {
         task_db.insert_item(ctx, "a").await?;
         if task_db.count_items().await == 0 {
            panic!("boom");
         }
         Ok::<_, Error>(())
      })
      .await
   });

   let join_err = handle.await.unwrap_err();
   assert!(join_err.is_panic());

   assert_eq!(db.count_items().await, 0);
   assert_eq!(db.provider.acquired(), 1);
   assert_eq!(db.provider.released(), 1);
   assert!(!db.manager.registry().is_bound(ctx));
}

#[tokio::test]
async fn test_nested_execute_joins_outer() {
   let db = create_test_db("wrap_nested.db", None).await;
   let tx = TransactionTemplate::new(Arc::clone(&db.manager));
   let (db, tx) = (&db, &tx);

   tx.execute(TxContext::new(), |ctx| async move {
      db.insert_item(ctx, "outer").await?;
      tx.execute(ctx, |ctx| async move {
         db.insert_item(ctx, "inner").await?;
         Ok::<_, Error>(())
      })
      .await?;

      // The inner call did not commit on its own
      assert_eq!(db.count_items().await, 0);
      Ok::<_, Error>(())
   })
   .await
   .unwrap();

   assert_eq!(db.count_items().await, 2);
   assert_eq!(db.provider.acquired(), 1);
}

#[tokio::test]
async fn test_swallowed_inner_failure_aborts_outer() {
   let db = create_test_db("wrap_swallowed.db", None).await;
   let tx = TransactionTemplate::new(Arc::clone(&db.manager));
   let (db, tx) = (&db, &tx);

   let err = tx
      .execute(TxContext::new(), |ctx| async move {
         db.insert_item(ctx, "outer").await?;
         let inner = tx
            .execute(ctx, |_| async { Err::<(), _>(AppError::Rejected("inner".into())) })
            .await;
         assert!(inner.is_err());
         Ok::<_, AppError>(())
      })
      .await
      .unwrap_err();

   assert!(matches!(err, AppError::Data(Error::UnexpectedRollback)));
   assert_eq!(db.count_items().await, 0);
}

#[tokio::test]
async fn test_requires_new_commits_independently() {
   let db = create_test_db("wrap_requires_new.db", None).await;
   let outer_tx = TransactionTemplate::with_definition(
      Arc::clone(&db.manager),
      TransactionDefinition::new().with_read_only(true),
   );
   let audit_tx = TransactionTemplate::with_definition(
      Arc::clone(&db.manager),
      TransactionDefinition::requires_new(),
   );
   let (db, audit_tx) = (&db, &audit_tx);

   let err = outer_tx
      .execute(TxContext::new(), |ctx| async move {
         audit_tx
            .execute(ctx, |ctx| async move {
               db.insert_item(ctx, "audit").await?;
               Ok::<_, AppError>(())
            })
            .await?;
         Err::<(), _>(AppError::Rejected("outer".into()))
      })
      .await
      .unwrap_err();

   assert!(matches!(err, AppError::Rejected(_)));
   assert_eq!(db.count_items().await, 1);
   assert_eq!(db.provider.acquired(), 2);
   assert_eq!(db.provider.released(), 2);
}

#[tokio::test]
async fn test_requires_new_writer_inside_writer_fails_fast() {
   let db = create_test_db("wrap_writer_conflict.db", None).await;
   let outer_tx = TransactionTemplate::new(Arc::clone(&db.manager));
   let audit_tx = TransactionTemplate::with_definition(
      Arc::clone(&db.manager),
      TransactionDefinition::requires_new(),
   );
   let (db, audit_tx) = (&db, &audit_tx);

   outer_tx
      .execute(TxContext::new(), |ctx| async move {
         db.insert_item(ctx, "outer").await?;

         let err = audit_tx
            .execute(ctx, |ctx| async move {
               db.insert_item(ctx, "audit").await?;
               Ok::<_, AppError>(())
            })
            .await
            .unwrap_err();
         assert!(matches!(err, AppError::Data(Error::SuspendedWriterConflict(c)) if c == ctx));

         // The outer transaction is still bound and usable
         db.insert_item(ctx, "after").await?;
         Ok::<_, AppError>(())
      })
      .await
      .unwrap();

   assert_eq!(db.count_items().await, 2);
   assert_eq!(db.provider.acquired(), 1);
   assert_eq!(db.provider.released(), 1);
}

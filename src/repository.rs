//! Member persistence

use serde_json::json;
use sqlx_sqlite_txsync::{ConnectionProvider, Error as DataError, SqlTemplate, TxContext, from_row};

use crate::Result;
use crate::domain::Member;
use crate::error::Error;

/// Stores members in the `member` table.
///
/// Every method takes the caller's context, so calls made inside a
/// transaction run on its connection and calls made outside one autocommit.
#[derive(Debug)]
pub struct MemberRepository<P> {
   sql: SqlTemplate<P>,
}

impl<P> Clone for MemberRepository<P> {
   fn clone(&self) -> Self {
      Self {
         sql: self.sql.clone(),
      }
   }
}

impl<P: ConnectionProvider> MemberRepository<P> {
   pub fn new(sql: SqlTemplate<P>) -> Self {
      Self { sql }
   }

   pub async fn create_schema(&self, ctx: TxContext) -> Result<()> {
      self
         .sql
         .execute(
            ctx,
            "CREATE TABLE IF NOT EXISTS member (
               member_id TEXT PRIMARY KEY,
               money INTEGER NOT NULL DEFAULT 0
            )",
            vec![],
         )
         .await?;
      Ok(())
   }

   pub async fn save(&self, ctx: TxContext, member: &Member) -> Result<()> {
      self
         .sql
         .execute(
            ctx,
            "INSERT INTO member (member_id, money) VALUES (?, ?)",
            vec![json!(member.member_id), json!(member.money)],
         )
         .await?;
      Ok(())
   }

   pub async fn find_by_id(&self, ctx: TxContext, member_id: &str) -> Result<Member> {
      self
         .sql
         .query_for_object(
            ctx,
            "SELECT member_id, money FROM member WHERE member_id = ?",
            vec![json!(member_id)],
            from_row,
         )
         .await
         .map_err(|e| match e {
            DataError::EmptyResult => Error::MemberNotFound(member_id.to_string()),
            other => Error::Data(other),
         })
   }

   pub async fn update(&self, ctx: TxContext, member_id: &str, money: i64) -> Result<()> {
      let result = self
         .sql
         .execute(
            ctx,
            "UPDATE member SET money = ? WHERE member_id = ?",
            vec![json!(money), json!(member_id)],
         )
         .await?;

      if result.rows_affected == 0 {
         return Err(Error::MemberNotFound(member_id.to_string()));
      }
      Ok(())
   }

   pub async fn delete(&self, ctx: TxContext, member_id: &str) -> Result<()> {
      self
         .sql
         .execute(
            ctx,
            "DELETE FROM member WHERE member_id = ?",
            vec![json!(member_id)],
         )
         .await?;
      Ok(())
   }
}

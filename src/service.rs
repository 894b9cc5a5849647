//! Member operations that span several statements

use sqlx_sqlite_txsync::{ConnectionProvider, ErrorCategory, TransactionTemplate, TxContext};
use tracing::{debug, info};
use uuid::Uuid;

use crate::Result;
use crate::domain::Member;
use crate::error::Error;
use crate::repository::MemberRepository;

/// Id no transfer may be sent to.
pub const REJECTED_MEMBER_ID: &str = "ex";

/// Business operations over [`MemberRepository`], each run as one
/// transaction.
#[derive(Debug)]
pub struct MemberService<P> {
   repository: MemberRepository<P>,
   tx: TransactionTemplate<P>,
}

impl<P: ConnectionProvider> MemberService<P> {
   pub fn new(repository: MemberRepository<P>, tx: TransactionTemplate<P>) -> Self {
      Self { repository, tx }
   }

   pub fn repository(&self) -> &MemberRepository<P> {
      &self.repository
   }

   /// Move `money` from one member to another.
   ///
   /// Both balances change or neither does: a failed lookup, a rejected
   /// recipient or a database error rolls the whole transfer back.
   pub async fn account_transfer(
      &self,
      ctx: TxContext,
      from_id: &str,
      to_id: &str,
      money: i64,
   ) -> Result<()> {
      self
         .tx
         .execute(ctx, |ctx| async move {
            let from = self.repository.find_by_id(ctx, from_id).await?;
            let to = self.repository.find_by_id(ctx, to_id).await?;

            self.repository.update(ctx, from_id, from.money - money).await?;
            validate_recipient(&to)?;
            self.repository.update(ctx, to_id, to.money + money).await?;

            debug!("Transferred {} from {} to {}", money, from_id, to_id);
            Ok(())
         })
         .await
   }

   /// Create a member with a zero balance.
   ///
   /// If `member_id` is taken, a suffixed id is generated and saved instead,
   /// within the same transaction. Returns the id actually stored.
   pub async fn create_member(&self, ctx: TxContext, member_id: &str) -> Result<String> {
      self
         .tx
         .execute(ctx, |ctx| async move {
            match self.repository.save(ctx, &Member::new(member_id, 0)).await {
               Ok(()) => {
                  info!("Saved member {}", member_id);
                  Ok(member_id.to_string())
               }
               Err(e) if e.category() == Some(ErrorCategory::DuplicateKey) => {
                  let retry_id = generate_new_id(member_id);
                  info!("Member id {} taken, retrying as {}", member_id, retry_id);
                  self.repository.save(ctx, &Member::new(retry_id.as_str(), 0)).await?;
                  Ok(retry_id)
               }
               Err(e) => Err(e),
            }
         })
         .await
   }
}

fn validate_recipient(to: &Member) -> Result<()> {
   if to.member_id == REJECTED_MEMBER_ID {
      return Err(Error::Validation(format!(
         "transfers to member {} are not allowed",
         to.member_id
      )));
   }
   Ok(())
}

fn generate_new_id(member_id: &str) -> String {
   let suffix = Uuid::new_v4().simple().to_string();
   format!("{}-{}", member_id, &suffix[..8])
}

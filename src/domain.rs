use serde::{Deserialize, Serialize};

/// An account holder and their balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
   pub member_id: String,
   pub money: i64,
}

impl Member {
   pub fn new(member_id: impl Into<String>, money: i64) -> Self {
      Self {
         member_id: member_id.into(),
         money,
      }
   }
}

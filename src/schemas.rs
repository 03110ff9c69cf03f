use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type MemberId = String;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct GroupMember {
    pub id: MemberId,
    pub full_name: String,
    pub email: String,
}

/// One member's share of an expense.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Payer {
    pub member_id: MemberId,
    pub amount: Decimal,
    #[serde(default)]
    pub is_creator: bool,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Expense {
    pub id: String,
    pub name: String,
    /// The member who paid the merchant.
    pub creator: MemberId,
    pub cost: Decimal,
    pub category: String,
    pub location: String,
    pub created_at: DateTime<Utc>,
    pub payers: Vec<Payer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_url: Option<String>,
}

impl Expense {
    /// The share entry belonging to the creator, if they split the cost with themselves.
    pub fn main_payer(&self) -> Option<&Payer> {
        self.payers.iter().find(|p| p.member_id == self.creator)
    }
}

/// An expense as listed to clients, with the creator's name joined in.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExpenseSummary {
    #[serde(flatten)]
    pub expense: Expense,
    pub creator_name: Option<String>,
}

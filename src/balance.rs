use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::Result;
use crate::ledger::SettlementMatrix;
use crate::schemas::MemberId;

/// Positive when the member is owed money overall, negative when they owe.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MemberBalance {
    pub id: MemberId,
    pub balance: Decimal,
}

pub fn compute_balances(matrix: &SettlementMatrix) -> Result<Vec<MemberBalance>> {
    matrix
        .members()
        .iter()
        .map(|id| {
            Ok(MemberBalance {
                id: id.clone(),
                balance: matrix.owed_to(id)? - matrix.owed_by(id)?,
            })
        })
        .collect()
}

use crate::balance::{compute_balances, MemberBalance};
use crate::error::Result;
use crate::ledger::SettlementMatrix;
use crate::schemas::MemberId;
use rust_decimal::Decimal;
use serde::Serialize;

/// `payer` owes `receiver` `amount`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Exchange {
    pub payer: MemberId,
    pub receiver: MemberId,
    pub amount: Decimal,
}

/// One exchange per non-zero cell of the matrix.
pub fn get_pairwise_exchanges(matrix: &SettlementMatrix) -> Vec<Exchange> {
    matrix
        .entries()
        .filter(|(_, _, amount)| *amount > Decimal::ZERO)
        .map(|(creditor, debtor, amount)| Exchange {
            payer: debtor.clone(),
            receiver: creditor.clone(),
            amount,
        })
        .collect()
}

// Largest debtor pays largest creditor until everybody is even
fn get_simplified_exchanges(
    mut payers: Vec<MemberBalance>,
    mut receivers: Vec<MemberBalance>,
) -> Vec<Exchange> {
    payers.sort_by(|a, b| a.balance.cmp(&b.balance));
    receivers.sort_by(|a, b| a.balance.cmp(&b.balance));

    let mut exchanges = Vec::new();

    while let (Some(payer), Some(receiver)) = (payers.last_mut(), receivers.last_mut()) {
        let amount = payer.balance.min(receiver.balance);
        exchanges.push(Exchange {
            payer: payer.id.clone(),
            receiver: receiver.id.clone(),
            amount,
        });
        payer.balance -= amount;
        receiver.balance -= amount;
        if payer.balance.is_zero() {
            payers.pop();
        }
        if receiver.balance.is_zero() {
            receivers.pop();
        }
    }
    exchanges
}

/// The transfers that settle every debt in `matrix`.
///
/// Netting by overall balance is used when it needs fewer transfers than
/// paying each reconciled pair directly.
pub fn get_settlement_plan(matrix: &SettlementMatrix) -> Result<Vec<Exchange>> {
    let mut payers = Vec::new();
    let mut receivers = Vec::new();

    for MemberBalance { id, balance } in compute_balances(matrix)? {
        let person = MemberBalance {
            id,
            balance: balance.abs(),
        };
        if balance < Decimal::ZERO {
            payers.push(person);
        } else if balance > Decimal::ZERO {
            receivers.push(person);
        }
    }

    let pairwise_exchanges = get_pairwise_exchanges(&matrix.reconciled());
    let simplified_exchanges = get_simplified_exchanges(payers, receivers);

    if simplified_exchanges.len() < pairwise_exchanges.len() {
        Ok(simplified_exchanges)
    } else {
        Ok(pairwise_exchanges)
    }
}

//! Share calculation for new expenses.
//!
//! Amounts are converted to integer cents before being divided, so the shares
//! always add back up to the rounded total. Leftover cents go to the first
//! shares in input order.
use std::collections::HashMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{Result, SplitError};
use crate::schemas::MemberId;

/// Rounds a currency amount to whole cents.
pub fn round_to_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn too_large(amount: Decimal) -> SplitError {
    SplitError::InvalidSplit(format!("{amount} is too large to split"))
}

fn to_cents(amount: Decimal) -> Result<i64> {
    round_to_cents(amount)
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|cents| cents.to_i64())
        .ok_or_else(|| too_large(amount))
}

/// Splits `total` into `count` shares that differ by at most one cent and sum
/// exactly to `total` rounded to cents.
pub fn split_equally(total: Decimal, count: usize) -> Result<Vec<Decimal>> {
    if count == 0 {
        return Err(SplitError::InvalidSplit(
            "cannot split between zero people".to_string(),
        ));
    }
    if total.is_sign_negative() && !total.is_zero() {
        return Err(SplitError::InvalidSplit(format!(
            "cannot split a negative amount ({total})"
        )));
    }

    let cents = to_cents(total)?;
    let parts = i64::try_from(count)
        .map_err(|_| SplitError::InvalidSplit(format!("too many shares ({count})")))?;
    let base = cents / parts;
    let remainder = cents % parts;

    Ok((0..parts)
        .map(|i| {
            let share = if i < remainder { base + 1 } else { base };
            Decimal::new(share, 2)
        })
        .collect())
}

/// Assigns a share of `total` to each member.
///
/// Members with an entry in `overrides` keep that exact amount; whatever is
/// left is split equally between the others, in the order they appear in
/// `members`.
pub fn allocate_shares(
    total: Decimal,
    members: &[MemberId],
    overrides: &HashMap<MemberId, Decimal>,
) -> Result<Vec<(MemberId, Decimal)>> {
    if members.is_empty() {
        return Err(SplitError::InvalidSplit(
            "at least one payer is required".to_string(),
        ));
    }
    for (member, amount) in overrides {
        if !members.contains(member) {
            return Err(SplitError::InvalidSplit(format!(
                "{member} has a custom amount but is not charged"
            )));
        }
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(SplitError::InvalidSplit(format!(
                "{member} has a negative amount ({amount})"
            )));
        }
    }

    let fixed = overrides
        .values()
        .copied()
        .map(round_to_cents)
        .try_fold(Decimal::ZERO, Decimal::checked_add)
        .ok_or_else(|| too_large(total))?;
    let free = members
        .iter()
        .filter(|m| !overrides.contains_key(*m))
        .collect::<Vec<_>>();

    let mut equal_shares = Vec::new();
    if !free.is_empty() {
        let remaining = round_to_cents(total)
            .checked_sub(fixed)
            .ok_or_else(|| too_large(total))?;
        if remaining.is_sign_negative() && !remaining.is_zero() {
            return Err(SplitError::NonConservingSplit {
                cost: round_to_cents(total),
                shares: fixed,
            });
        }
        equal_shares = split_equally(remaining, free.len())?;
    }

    let mut equal_shares = equal_shares.into_iter();
    let shares = members
        .iter()
        .map(|member| {
            let amount = match overrides.get(member) {
                Some(amount) => round_to_cents(*amount),
                None => equal_shares.next().unwrap_or(Decimal::ZERO),
            };
            (member.clone(), amount)
        })
        .collect::<Vec<_>>();

    check_conservation(total, shares.iter().map(|(_, amount)| *amount))?;
    Ok(shares)
}

/// Fails when the shares drift from `total` by more than one cent per share.
pub fn check_conservation(
    total: Decimal,
    shares: impl IntoIterator<Item = Decimal>,
) -> Result<()> {
    let mut count = 0i64;
    let mut sum = Decimal::ZERO;
    for share in shares {
        count += 1;
        sum = sum.checked_add(share).ok_or_else(|| too_large(total))?;
    }
    let tolerance = Decimal::new(count, 2);
    let drift = sum.checked_sub(total).ok_or_else(|| too_large(total))?;
    if drift.abs() > tolerance {
        return Err(SplitError::NonConservingSplit {
            cost: total,
            shares: sum,
        });
    }
    Ok(())
}

//! Pairwise debt aggregation.
//!
//! [`DebtLedger::build`] turns the expense history into a [`SettlementMatrix`]
//! where `get(creditor, debtor)` is how much `debtor` owes `creditor`. The
//! matrix is directional: what A owes B and what B owes A are tracked
//! separately until [`SettlementMatrix::reconcile`] nets them.
use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::error::{Result, SplitError};
use crate::schemas::{Expense, GroupMember, MemberId};

/// Square debt table over a member roster, indexed by member id.
#[derive(Clone, Debug, PartialEq)]
pub struct SettlementMatrix {
    members: Vec<MemberId>,
    index: HashMap<MemberId, usize>,
    // Row-major: cells[creditor * n + debtor]
    cells: Vec<Decimal>,
}

impl SettlementMatrix {
    /// A zero matrix over `members`. Fails if an id appears twice.
    pub fn zeroed(members: &[GroupMember]) -> Result<Self> {
        let mut index = HashMap::with_capacity(members.len());
        for (i, member) in members.iter().enumerate() {
            if index.insert(member.id.clone(), i).is_some() {
                return Err(SplitError::DuplicateMember(member.id.clone()));
            }
        }
        Ok(Self {
            members: members.iter().map(|m| m.id.clone()).collect(),
            index,
            cells: vec![Decimal::ZERO; members.len() * members.len()],
        })
    }

    /// Member ids in roster order.
    pub fn members(&self) -> &[MemberId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, member: &str) -> bool {
        self.index.contains_key(member)
    }

    fn position(&self, member: &str) -> Result<usize> {
        self.index
            .get(member)
            .copied()
            .ok_or_else(|| SplitError::MemberNotFound(member.to_string()))
    }

    fn cell(&self, creditor: usize, debtor: usize) -> Decimal {
        self.cells[creditor * self.members.len() + debtor]
    }

    fn cell_mut(&mut self, creditor: usize, debtor: usize) -> &mut Decimal {
        let n = self.members.len();
        &mut self.cells[creditor * n + debtor]
    }

    /// How much `debtor` owes `creditor`.
    pub fn get(&self, creditor: &str, debtor: &str) -> Result<Decimal> {
        let creditor = self.position(creditor)?;
        let debtor = self.position(debtor)?;
        Ok(self.cell(creditor, debtor))
    }

    /// Records that `debtor` owes `creditor` a further `amount`.
    ///
    /// Self-debts and non-positive amounts are ignored. Fails without
    /// touching the matrix if the new total does not fit in a `Decimal`.
    pub fn add_debt(&mut self, creditor: &str, debtor: &str, amount: Decimal) -> Result<()> {
        let creditor_pos = self.position(creditor)?;
        let debtor_pos = self.position(debtor)?;
        if creditor_pos != debtor_pos && amount > Decimal::ZERO {
            let cell = self.cell_mut(creditor_pos, debtor_pos);
            *cell = cell.checked_add(amount).ok_or_else(|| {
                SplitError::AmountOverflow(format!("debt of {debtor} to {creditor}"))
            })?;
        }
        Ok(())
    }

    /// Iterates `(creditor, debtor, amount)` over every cell, zeros included.
    pub fn entries(&self) -> impl Iterator<Item = (&MemberId, &MemberId, Decimal)> + '_ {
        let n = self.members.len();
        self.cells.iter().enumerate().map(move |(i, amount)| {
            (&self.members[i / n], &self.members[i % n], *amount)
        })
    }

    fn checked_total(mut amounts: impl Iterator<Item = Decimal>, what: String) -> Result<Decimal> {
        amounts
            .try_fold(Decimal::ZERO, Decimal::checked_add)
            .ok_or(SplitError::AmountOverflow(what))
    }

    /// Total owed to `member` by everyone else.
    pub fn owed_to(&self, member: &str) -> Result<Decimal> {
        let creditor = self.position(member)?;
        Self::checked_total(
            (0..self.len()).map(|debtor| self.cell(creditor, debtor)),
            format!("total owed to {member}"),
        )
    }

    /// Total `member` owes everyone else.
    pub fn owed_by(&self, member: &str) -> Result<Decimal> {
        let debtor = self.position(member)?;
        Self::checked_total(
            (0..self.len()).map(|creditor| self.cell(creditor, debtor)),
            format!("total owed by {member}"),
        )
    }

    /// Cancels opposite debts so that for every pair at most one direction is
    /// non-zero. Running it again changes nothing.
    pub fn reconcile(&mut self) {
        let n = self.members.len();
        for a in 0..n {
            for b in (a + 1)..n {
                let b_owes_a = self.cell(a, b);
                let a_owes_b = self.cell(b, a);
                if b_owes_a > Decimal::ZERO && a_owes_b > Decimal::ZERO {
                    if b_owes_a >= a_owes_b {
                        *self.cell_mut(a, b) = b_owes_a - a_owes_b;
                        *self.cell_mut(b, a) = Decimal::ZERO;
                    } else {
                        *self.cell_mut(b, a) = a_owes_b - b_owes_a;
                        *self.cell_mut(a, b) = Decimal::ZERO;
                    }
                }
            }
        }
    }

    /// A netted copy of this matrix.
    pub fn reconciled(&self) -> Self {
        let mut matrix = self.clone();
        matrix.reconcile();
        matrix
    }
}

struct Row<'a> {
    matrix: &'a SettlementMatrix,
    creditor: usize,
}

impl Serialize for Row<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.matrix.len()))?;
        for (debtor, id) in self.matrix.members.iter().enumerate() {
            map.serialize_entry(id, &self.matrix.cell(self.creditor, debtor))?;
        }
        map.end()
    }
}

/// Serialized as `{creditor: {debtor: amount}}` in roster order.
impl Serialize for SettlementMatrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (creditor, id) in self.members.iter().enumerate() {
            map.serialize_entry(
                id,
                &Row {
                    matrix: self,
                    creditor,
                },
            )?;
        }
        map.end()
    }
}

/// An expense that could not be applied to the matrix.
#[derive(Debug, Serialize)]
pub struct LedgerIssue {
    pub expense_id: String,
    #[serde(serialize_with = "as_display")]
    pub error: SplitError,
}

fn as_display<S: Serializer>(
    error: &SplitError,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

#[derive(Debug, Serialize)]
pub struct LedgerOutcome {
    pub matrix: SettlementMatrix,
    /// Expenses without a share for their creator.
    pub skipped: Vec<String>,
    pub issues: Vec<LedgerIssue>,
}

impl LedgerOutcome {
    pub fn reconciled(mut self) -> Self {
        self.matrix.reconcile();
        self
    }
}

pub struct DebtLedger;

impl DebtLedger {
    /// Aggregates every expense into a raw (un-netted) debt matrix.
    ///
    /// An expense whose creator has no share is skipped. An expense that
    /// mentions someone outside the roster, or whose shares would push a
    /// total past what a `Decimal` holds, is left out entirely and reported
    /// in [`LedgerOutcome::issues`]; the remaining expenses still count.
    pub fn build(expenses: &[Expense], members: &[GroupMember]) -> Result<LedgerOutcome> {
        let mut matrix = SettlementMatrix::zeroed(members)?;
        let mut skipped = Vec::new();
        let mut issues = Vec::new();

        for expense in expenses {
            if expense.main_payer().is_none() {
                tracing::debug!(expense = %expense.id, "no share for creator, skipping");
                skipped.push(expense.id.clone());
                continue;
            }
            // Applied to a copy so a rejected expense leaves no partial debts
            let mut scratch = matrix.clone();
            let applied = expense
                .payers
                .iter()
                .try_for_each(|debtor| {
                    scratch.add_debt(&expense.creator, &debtor.member_id, debtor.amount)
                });
            match applied {
                Ok(()) => matrix = scratch,
                Err(error) => {
                    tracing::warn!(expense = %expense.id, "{error}");
                    issues.push(LedgerIssue {
                        expense_id: expense.id.clone(),
                        error,
                    });
                }
            }
        }

        tracing::debug!(
            members = matrix.len(),
            expenses = expenses.len(),
            skipped = skipped.len(),
            issues = issues.len(),
            "debt matrix built"
        );
        Ok(LedgerOutcome {
            matrix,
            skipped,
            issues,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::Payer;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn member(id: &str) -> GroupMember {
        GroupMember {
            id: id.to_string(),
            full_name: id.to_uppercase(),
            email: format!("{id}@example.com"),
        }
    }

    fn expense(id: &str, creator: &str, payers: &[(&str, Decimal)]) -> Expense {
        Expense {
            id: id.to_string(),
            name: id.to_string(),
            creator: creator.to_string(),
            cost: payers.iter().map(|(_, amount)| *amount).sum(),
            category: "Food".to_string(),
            location: "Lisbon".to_string(),
            created_at: Utc::now(),
            payers: payers
                .iter()
                .map(|(member, amount)| Payer {
                    member_id: member.to_string(),
                    amount: *amount,
                    is_creator: *member == creator,
                })
                .collect(),
            receipt_url: None,
        }
    }

    #[test]
    fn empty_history_gives_zero_matrix() {
        let members = vec![member("a"), member("b"), member("c")];
        let outcome = DebtLedger::build(&[], &members).unwrap();
        assert_eq!(outcome.matrix.entries().count(), 9);
        assert!(outcome.matrix.entries().all(|(_, _, amount)| amount.is_zero()));
    }

    #[test]
    fn creator_share_is_not_a_debt() {
        let members = vec![member("a"), member("b")];
        let expenses = vec![expense("e1", "a", &[("a", dec!(5)), ("b", dec!(5))])];
        let matrix = DebtLedger::build(&expenses, &members).unwrap().matrix;
        assert_eq!(matrix.get("a", "a").unwrap(), Decimal::ZERO);
        assert_eq!(matrix.get("a", "b").unwrap(), dec!(5));
        assert_eq!(matrix.get("b", "a").unwrap(), Decimal::ZERO);
    }

    #[test]
    fn expense_without_creator_share_is_skipped() {
        let members = vec![member("a"), member("b")];
        let expenses = vec![expense("e1", "a", &[("b", dec!(5))])];
        let outcome = DebtLedger::build(&expenses, &members).unwrap();
        assert_eq!(outcome.skipped, vec!["e1".to_string()]);
        assert_eq!(outcome.matrix.get("a", "b").unwrap(), Decimal::ZERO);
    }

    #[test]
    fn non_positive_shares_are_ignored() {
        let members = vec![member("a"), member("b"), member("c")];
        let expenses = vec![expense(
            "e1",
            "a",
            &[("a", dec!(5)), ("b", dec!(0)), ("c", dec!(-3))],
        )];
        let matrix = DebtLedger::build(&expenses, &members).unwrap().matrix;
        assert!(matrix.entries().all(|(_, _, amount)| amount.is_zero()));
    }

    #[test]
    fn unknown_member_rejects_the_whole_expense() {
        let members = vec![member("a"), member("b")];
        let expenses = vec![
            expense("bad", "a", &[("a", dec!(1)), ("b", dec!(4)), ("ghost", dec!(4))]),
            expense("good", "a", &[("a", dec!(1)), ("b", dec!(2))]),
        ];
        let outcome = DebtLedger::build(&expenses, &members).unwrap();
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.issues[0].expense_id, "bad");
        assert_eq!(
            outcome.issues[0].error,
            SplitError::MemberNotFound("ghost".to_string())
        );
        assert_eq!(outcome.matrix.get("a", "b").unwrap(), dec!(2));
    }

    #[test]
    fn overflowing_expense_is_reported_and_the_rest_still_count() {
        let members = vec![member("a"), member("b")];
        let expenses = vec![
            expense("e1", "a", &[("a", Decimal::ZERO), ("b", Decimal::MAX)]),
            expense("e2", "a", &[("a", Decimal::ZERO), ("b", Decimal::MAX)]),
        ];
        let outcome = DebtLedger::build(&expenses, &members).unwrap();
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.issues[0].expense_id, "e2");
        assert!(matches!(outcome.issues[0].error, SplitError::AmountOverflow(_)));
        assert_eq!(outcome.matrix.get("a", "b").unwrap(), Decimal::MAX);
    }

    #[test]
    fn totals_out_of_range_are_errors() {
        let members = vec![member("a"), member("b"), member("c")];
        let mut matrix = SettlementMatrix::zeroed(&members).unwrap();
        matrix.add_debt("a", "b", Decimal::MAX).unwrap();
        matrix.add_debt("a", "c", Decimal::MAX).unwrap();
        assert!(matches!(matrix.owed_to("a"), Err(SplitError::AmountOverflow(_))));
        assert_eq!(matrix.owed_by("b").unwrap(), Decimal::MAX);
    }

    #[test]
    fn duplicate_roster_entry_is_an_error() {
        let members = vec![member("a"), member("a")];
        assert!(matches!(
            DebtLedger::build(&[], &members),
            Err(SplitError::DuplicateMember(_))
        ));
    }

    #[test]
    fn lookup_outside_roster_fails() {
        let matrix = SettlementMatrix::zeroed(&[member("a")]).unwrap();
        assert_eq!(
            matrix.get("a", "z"),
            Err(SplitError::MemberNotFound("z".to_string()))
        );
    }

    #[test]
    fn reconcile_nets_opposite_debts() {
        let mut matrix = SettlementMatrix::zeroed(&[member("a"), member("b")]).unwrap();
        matrix.add_debt("a", "b", dec!(30)).unwrap();
        matrix.add_debt("b", "a", dec!(10)).unwrap();
        matrix.reconcile();
        assert_eq!(matrix.get("a", "b").unwrap(), dec!(20));
        assert_eq!(matrix.get("b", "a").unwrap(), Decimal::ZERO);
    }

    #[test]
    fn reconcile_clears_equal_debts() {
        let mut matrix = SettlementMatrix::zeroed(&[member("a"), member("b")]).unwrap();
        matrix.add_debt("a", "b", dec!(7.5)).unwrap();
        matrix.add_debt("b", "a", dec!(7.5)).unwrap();
        matrix.reconcile();
        assert!(matrix.entries().all(|(_, _, amount)| amount.is_zero()));
    }

    #[test]
    fn serializes_as_nested_map_in_roster_order() {
        let mut matrix = SettlementMatrix::zeroed(&[member("b"), member("a")]).unwrap();
        matrix.add_debt("b", "a", dec!(1.5)).unwrap();
        let json = serde_json::to_string(&matrix).unwrap();
        assert_eq!(
            json,
            r#"{"b":{"b":"0","a":"1.5"},"a":{"b":"0","a":"0"}}"#
        );
    }
}

//! Expense entry: validation of submitted drafts and the submission status
//! machine.
use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::currency::CurrencyConverter;
use crate::error::{Result, SplitError, ValidationErrors};
use crate::schemas::{Expense, GroupMember, MemberId, Payer};
use crate::split::allocate_shares;

pub const MAX_NAME_LENGTH: usize = 100;

/// Limits and choices an expense draft is checked against.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FormRules {
    pub locations: Vec<String>,
    pub categories: Vec<String>,
    pub max_cost: Decimal,
    pub max_attachment_bytes: u64,
}

impl Default for FormRules {
    fn default() -> Self {
        Self {
            locations: ["Madrid", "Lisbon", "Porto", "Other"]
                .map(String::from)
                .to_vec(),
            categories: [
                "Food",
                "Transportation",
                "Accommodation",
                "Entertainment",
                "Other",
            ]
            .map(String::from)
            .to_vec(),
            max_cost: Decimal::new(1_000_000, 0),
            max_attachment_bytes: 20 * 1024 * 1024,
        }
    }
}

/// Metadata of a receipt file picked in the form. The file itself is
/// uploaded elsewhere; only its resulting URL is stored.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AttachmentMeta {
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ExpenseDraft {
    pub name: String,
    pub cost: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    pub location: String,
    pub category: String,
    pub creator: MemberId,
    /// Members charged for the expense, in the order shares are handed out.
    pub payers: Vec<MemberId>,
    /// Amounts typed in by hand for some payers; the rest split what is left.
    #[serde(default)]
    pub overrides: HashMap<MemberId, Decimal>,
    #[serde(default)]
    pub receipt_url: Option<String>,
    #[serde(default)]
    pub attachment: Option<AttachmentMeta>,
}

impl ExpenseDraft {
    pub fn validate(&self, rules: &FormRules) -> Result<()> {
        let mut errors = ValidationErrors::new();

        let name = self.name.trim();
        if name.is_empty() {
            errors.add("name", "Item name is required");
        } else if name.chars().count() > MAX_NAME_LENGTH {
            errors.add(
                "name",
                format!("Item name must be {MAX_NAME_LENGTH} characters or less"),
            );
        }

        if self.cost <= Decimal::ZERO {
            errors.add("cost", "Cost must be a positive number");
        } else if self.cost > rules.max_cost {
            errors.add(
                "cost",
                format!("Cost must be less than or equal to {}", rules.max_cost),
            );
        }

        if self.location.trim().is_empty() {
            errors.add("location", "Location is required");
        } else if !rules.locations.contains(&self.location) {
            errors.add("location", format!("Unknown location {}", self.location));
        }

        if self.category.trim().is_empty() {
            errors.add("category", "Category is required");
        } else if !rules.categories.contains(&self.category) {
            errors.add("category", format!("Unknown category {}", self.category));
        }

        if self.payers.is_empty() {
            errors.add("payers", "At least one payer must be selected");
        } else if let Some(dup) = self
            .payers
            .iter()
            .enumerate()
            .find(|(i, p)| self.payers[..*i].contains(p))
            .map(|(_, p)| p)
        {
            errors.add("payers", format!("{dup} is selected twice"));
        }

        if let Some((member, amount)) = self
            .overrides
            .iter()
            .find(|(_, amount)| **amount < Decimal::ZERO || **amount > rules.max_cost)
        {
            errors.add(
                "overrides",
                format!(
                    "Amount for {member} must be between 0 and {} (got {amount})",
                    rules.max_cost
                ),
            );
        }

        if let Some(attachment) = &self.attachment {
            if attachment.size_bytes > rules.max_attachment_bytes {
                errors.add(
                    "attachment",
                    format!(
                        "File must be smaller than {} MB",
                        rules.max_attachment_bytes / (1024 * 1024)
                    ),
                );
            } else if !attachment.content_type.starts_with("image/")
                && attachment.content_type != "application/pdf"
            {
                errors.add("attachment", "Please upload an image or PDF file");
            }
        }

        errors.into_result()
    }

    /// Validates the draft against the roster and turns it into an expense
    /// whose shares add up to its cost in the base currency.
    pub fn into_expense(
        self,
        rules: &FormRules,
        converter: &CurrencyConverter,
        roster: &[GroupMember],
        id: String,
        created_at: DateTime<Utc>,
    ) -> Result<Expense> {
        self.validate(rules)?;

        let known = |id: &MemberId| roster.iter().any(|m| &m.id == id);
        if let Some(unknown) = std::iter::once(&self.creator)
            .chain(self.payers.iter())
            .find(|id| !known(*id))
        {
            return Err(SplitError::MemberNotFound(unknown.clone()));
        }

        let currency = self.currency.as_deref();
        let cost = converter.to_base(self.cost, currency)?;
        let overrides = self
            .overrides
            .iter()
            .map(|(member, amount)| Ok((member.clone(), converter.to_base(*amount, currency)?)))
            .collect::<Result<HashMap<_, _>>>()?;

        let payers = allocate_shares(cost, &self.payers, &overrides)?
            .into_iter()
            .map(|(member_id, amount)| Payer {
                is_creator: member_id == self.creator,
                member_id,
                amount,
            })
            .collect();

        Ok(Expense {
            id,
            name: self.name.trim().to_string(),
            creator: self.creator,
            cost,
            category: self.category,
            location: self.location,
            created_at,
            payers,
            receipt_url: self.receipt_url,
        })
    }
}

/// Progress of an expense submission.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum SubmissionStatus {
    #[default]
    Idle,
    Uploading,
    Saving,
    Success,
    Error(String),
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionStatus::Idle => write!(f, "idle"),
            SubmissionStatus::Uploading => write!(f, "uploading"),
            SubmissionStatus::Saving => write!(f, "saving"),
            SubmissionStatus::Success => write!(f, "success"),
            SubmissionStatus::Error(_) => write!(f, "error"),
        }
    }
}

impl SubmissionStatus {
    fn transition(self, next: SubmissionStatus) -> Result<Self> {
        use SubmissionStatus::*;
        match (&self, &next) {
            (Idle, Uploading)
            | (Idle, Saving)
            | (Uploading, Saving)
            | (Uploading, Error(_))
            | (Saving, Success)
            | (Saving, Error(_))
            | (Success, Idle)
            | (Error(_), Idle) => {
                tracing::debug!(from = %self, to = %next, "submission status changed");
                Ok(next)
            }
            _ => Err(SplitError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            }),
        }
    }

    pub fn start_upload(self) -> Result<Self> {
        self.transition(SubmissionStatus::Uploading)
    }

    pub fn start_saving(self) -> Result<Self> {
        self.transition(SubmissionStatus::Saving)
    }

    pub fn succeed(self) -> Result<Self> {
        self.transition(SubmissionStatus::Success)
    }

    pub fn fail(self, message: impl Into<String>) -> Result<Self> {
        self.transition(SubmissionStatus::Error(message.into()))
    }

    pub fn reset(self) -> Result<Self> {
        self.transition(SubmissionStatus::Idle)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, SubmissionStatus::Success | SubmissionStatus::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn roster() -> Vec<GroupMember> {
        ["ana", "ben", "cleo"]
            .iter()
            .map(|id| GroupMember {
                id: id.to_string(),
                full_name: id.to_string(),
                email: format!("{id}@example.com"),
            })
            .collect()
    }

    fn draft() -> ExpenseDraft {
        ExpenseDraft {
            name: "Dinner".to_string(),
            cost: dec!(100),
            currency: None,
            location: "Lisbon".to_string(),
            category: "Food".to_string(),
            creator: "ana".to_string(),
            payers: vec!["ana".to_string(), "ben".to_string(), "cleo".to_string()],
            overrides: HashMap::new(),
            receipt_url: None,
            attachment: None,
        }
    }

    fn converter() -> CurrencyConverter {
        CurrencyConverter::new("EUR", HashMap::from([("USD".to_string(), dec!(0.5))]))
    }

    #[test]
    fn empty_draft_reports_every_field() {
        let draft = ExpenseDraft {
            name: "  ".to_string(),
            cost: Decimal::ZERO,
            location: String::new(),
            category: String::new(),
            payers: vec![],
            ..draft()
        };
        let Err(SplitError::Validation(errors)) = draft.validate(&FormRules::default()) else {
            panic!("expected validation errors");
        };
        assert_eq!(errors.len(), 5);
        assert_eq!(errors.get("name"), Some("Item name is required"));
        assert_eq!(errors.get("payers"), Some("At least one payer must be selected"));
    }

    #[test]
    fn long_name_and_large_cost_are_rejected() {
        let draft = ExpenseDraft {
            name: "x".repeat(101),
            cost: dec!(1000000.01),
            ..draft()
        };
        let Err(SplitError::Validation(errors)) = draft.validate(&FormRules::default()) else {
            panic!("expected validation errors");
        };
        assert!(errors.get("name").is_some());
        assert!(errors.get("cost").is_some());
    }

    #[test]
    fn override_above_max_cost_is_rejected() {
        let mut draft = draft();
        draft.overrides = HashMap::from([("ben".to_string(), Decimal::MAX)]);
        let Err(SplitError::Validation(errors)) = draft.validate(&FormRules::default()) else {
            panic!("expected validation errors");
        };
        assert!(errors.get("overrides").is_some());

        let result = draft.into_expense(
            &FormRules::default(),
            &converter(),
            &roster(),
            "e1".to_string(),
            Utc::now(),
        );
        assert!(matches!(result, Err(SplitError::Validation(_))));
    }

    #[test]
    fn attachment_type_and_size_are_checked() {
        let rules = FormRules::default();
        let mut draft = draft();
        draft.attachment = Some(AttachmentMeta {
            file_name: "receipt.txt".to_string(),
            content_type: "text/plain".to_string(),
            size_bytes: 10,
        });
        assert!(draft.validate(&rules).is_err());

        draft.attachment = Some(AttachmentMeta {
            file_name: "receipt.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            size_bytes: rules.max_attachment_bytes + 1,
        });
        assert!(draft.validate(&rules).is_err());

        draft.attachment = Some(AttachmentMeta {
            file_name: "receipt.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            size_bytes: 1024,
        });
        assert!(draft.validate(&rules).is_ok());
    }

    #[test]
    fn draft_becomes_expense_with_exact_shares() {
        let expense = draft()
            .into_expense(
                &FormRules::default(),
                &converter(),
                &roster(),
                "e1".to_string(),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(expense.cost, dec!(100));
        let amounts = expense.payers.iter().map(|p| p.amount).collect::<Vec<_>>();
        assert_eq!(amounts, vec![dec!(33.34), dec!(33.33), dec!(33.33)]);
        assert!(expense.payers[0].is_creator);
        assert!(!expense.payers[1].is_creator);
        assert_eq!(expense.main_payer().map(|p| p.member_id.as_str()), Some("ana"));
    }

    #[test]
    fn foreign_currency_is_normalised_before_splitting() {
        let mut draft = draft();
        draft.currency = Some("USD".to_string());
        draft.cost = dec!(60);
        draft.overrides = HashMap::from([("ben".to_string(), dec!(20))]);
        let expense = draft
            .into_expense(
                &FormRules::default(),
                &converter(),
                &roster(),
                "e1".to_string(),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(expense.cost, dec!(30));
        let amounts = expense.payers.iter().map(|p| p.amount).collect::<Vec<_>>();
        assert_eq!(amounts, vec![dec!(10), dec!(10), dec!(10)]);
    }

    #[test]
    fn payer_outside_roster_is_rejected() {
        let mut draft = draft();
        draft.payers.push("ghost".to_string());
        let result = draft.into_expense(
            &FormRules::default(),
            &converter(),
            &roster(),
            "e1".to_string(),
            Utc::now(),
        );
        assert_eq!(result, Err(SplitError::MemberNotFound("ghost".to_string())));
    }

    #[test]
    fn submission_follows_the_happy_path() {
        let status = SubmissionStatus::default()
            .start_upload()
            .and_then(SubmissionStatus::start_saving)
            .and_then(SubmissionStatus::succeed)
            .unwrap();
        assert!(status.is_finished());
        assert_eq!(status.reset().unwrap(), SubmissionStatus::Idle);
    }

    #[test]
    fn saving_can_skip_the_upload() {
        let status = SubmissionStatus::Idle.start_saving().unwrap();
        assert_eq!(
            status.fail("insert failed").unwrap(),
            SubmissionStatus::Error("insert failed".to_string())
        );
    }

    #[test]
    fn cannot_succeed_without_saving() {
        assert_eq!(
            SubmissionStatus::Idle.succeed(),
            Err(SplitError::InvalidTransition {
                from: "idle".to_string(),
                to: "success".to_string(),
            })
        );
        assert!(SubmissionStatus::Success.start_saving().is_err());
    }
}

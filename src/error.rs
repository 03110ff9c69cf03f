use std::collections::BTreeMap;
use std::fmt;

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::schemas::MemberId;

pub type Result<T> = std::result::Result<T, SplitError>;

#[derive(Error, Debug)]
pub enum SplitError {
    #[error("Member not found: {0}")]
    MemberNotFound(MemberId),

    #[error("Member listed twice in the roster: {0}")]
    DuplicateMember(MemberId),

    #[error("Invalid split: {0}")]
    InvalidSplit(String),

    #[error("Shares sum to {shares} but the expense costs {cost}")]
    NonConservingSplit { cost: Decimal, shares: Decimal },

    #[error("Amount out of range: {0}")]
    AmountOverflow(String),

    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("Cannot go from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),
}

impl PartialEq for SplitError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::MemberNotFound(a), Self::MemberNotFound(b)) => a == b,
            (Self::DuplicateMember(a), Self::DuplicateMember(b)) => a == b,
            (Self::InvalidSplit(a), Self::InvalidSplit(b)) => a == b,
            (
                Self::NonConservingSplit { cost: a, shares: b },
                Self::NonConservingSplit { cost: c, shares: d },
            ) => a == c && b == d,
            (Self::AmountOverflow(a), Self::AmountOverflow(b)) => a == b,
            (Self::UnknownCurrency(a), Self::UnknownCurrency(b)) => a == b,
            (
                Self::InvalidTransition { from: a, to: b },
                Self::InvalidTransition { from: c, to: d },
            ) => a == c && b == d,
            (Self::Validation(a), Self::Validation(b)) => a == b,
            _ => false,
        }
    }
}

impl ResponseError for SplitError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        let mut body = json!({
            "error": {
                "code": status_code.as_u16(),
                "message": self.to_string(),
                "type": self.error_type()
            }
        });
        if let SplitError::Validation(errors) = self {
            body["error"]["fields"] = json!(errors);
        }
        HttpResponse::build(status_code).json(body)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            SplitError::MemberNotFound(_) => StatusCode::NOT_FOUND,
            SplitError::DuplicateMember(_) => StatusCode::CONFLICT,
            SplitError::InvalidSplit(_) => StatusCode::BAD_REQUEST,
            SplitError::NonConservingSplit { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            SplitError::AmountOverflow(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SplitError::UnknownCurrency(_) => StatusCode::BAD_REQUEST,
            SplitError::InvalidTransition { .. } => StatusCode::CONFLICT,
            SplitError::Validation(_) => StatusCode::BAD_REQUEST,
            SplitError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl SplitError {
    fn error_type(&self) -> &str {
        match self {
            SplitError::MemberNotFound(_) => "not_found",
            SplitError::DuplicateMember(_) => "duplicate_member",
            SplitError::InvalidSplit(_) => "invalid_split",
            SplitError::NonConservingSplit { .. } => "non_conserving_split",
            SplitError::AmountOverflow(_) => "amount_overflow",
            SplitError::UnknownCurrency(_) => "unknown_currency",
            SplitError::InvalidTransition { .. } => "invalid_transition",
            SplitError::Validation(_) => "validation_error",
            SplitError::Database(_) => "database_error",
        }
    }
}

/// Per-field messages collected while validating an expense form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<&'static str, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(SplitError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self
            .0
            .iter()
            .map(|(field, message)| format!("{field}: {message}"))
            .collect::<Vec<_>>();
        write!(f, "{}", fields.join("; "))
    }
}

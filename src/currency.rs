//! Fixed-rate conversion into the ledger's base currency.
use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::error::{Result, SplitError};
use crate::split::round_to_cents;

#[derive(Clone, Debug)]
pub struct CurrencyConverter {
    base: String,
    /// Units of base currency per unit of the keyed currency.
    rates: HashMap<String, Decimal>,
}

impl CurrencyConverter {
    pub fn new(base: impl Into<String>, rates: HashMap<String, Decimal>) -> Self {
        let rates = rates
            .into_iter()
            .map(|(code, rate)| (code.to_uppercase(), rate))
            .collect();
        Self {
            base: base.into().to_uppercase(),
            rates,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Converts `amount` in `currency` to the base currency, rounded to cents.
    /// `None` means the amount is already in the base currency.
    pub fn to_base(&self, amount: Decimal, currency: Option<&str>) -> Result<Decimal> {
        let code = match currency.map(str::trim) {
            None | Some("") => return Ok(round_to_cents(amount)),
            Some(code) => code.to_uppercase(),
        };
        if code == self.base {
            return Ok(round_to_cents(amount));
        }
        let rate = self
            .rates
            .get(&code)
            .ok_or_else(|| SplitError::UnknownCurrency(code.clone()))?;
        let converted = amount.checked_mul(*rate).ok_or_else(|| {
            SplitError::AmountOverflow(format!("{amount} {code} in {}", self.base))
        })?;
        Ok(round_to_cents(converted))
    }
}

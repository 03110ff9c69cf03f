pub mod balance;
pub mod currency;
pub mod error;
pub mod exchange;
pub mod form;
pub mod ledger;
pub mod routes;
pub mod schemas;
pub mod settings;
pub mod split;
pub mod store;

pub use error::{Result, SplitError};
pub use ledger::{DebtLedger, LedgerOutcome, SettlementMatrix};

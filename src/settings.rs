//! Service settings. Defaults are overridden by an optional `settings.toml`
//! and then by `TRAVELSPLIT__<SECTION>__<KEY>` environment variables.
//! `MONGODB_URI` is honoured as well.
use std::collections::HashMap;

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::currency::CurrencyConverter;
use crate::form::FormRules;

#[derive(Debug, Deserialize, Clone)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Database {
    pub uri: String,
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Ledger {
    pub base_currency: String,
    #[serde(default)]
    pub rates: HashMap<String, Decimal>,
    pub locations: Vec<String>,
    pub categories: Vec<String>,
    pub max_cost: Decimal,
    pub max_attachment_bytes: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub level: String,
    pub server: Server,
    pub database: Database,
    pub ledger: Ledger,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let defaults = FormRules::default();
        let mut builder = Config::builder()
            .set_default("level", "info")?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("database.uri", "mongodb://localhost:27017")?
            .set_default("database.name", "TravelSplit")?
            .set_default("ledger.base_currency", "EUR")?
            .set_default("ledger.locations", defaults.locations)?
            .set_default("ledger.categories", defaults.categories)?
            .set_default("ledger.max_cost", defaults.max_cost.to_string())?
            .set_default("ledger.max_attachment_bytes", defaults.max_attachment_bytes)?
            .add_source(File::with_name("settings").required(false))
            .add_source(
                Environment::with_prefix("TRAVELSPLIT")
                    .prefix_separator("__")
                    .separator("__"),
            );

        if let Ok(uri) = std::env::var("MONGODB_URI") {
            builder = builder.set_override("database.uri", uri)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn form_rules(&self) -> FormRules {
        FormRules {
            locations: self.ledger.locations.clone(),
            categories: self.ledger.categories.clone(),
            max_cost: self.ledger.max_cost,
            max_attachment_bytes: self.ledger.max_attachment_bytes,
        }
    }

    pub fn converter(&self) -> CurrencyConverter {
        CurrencyConverter::new(&self.ledger.base_currency, self.ledger.rates.clone())
    }
}

//! Startup configuration.
//!
//! Mirrors the teacher's `AppConfig`: a plain struct loaded once at startup
//! via the `config` crate layered over `.env`/environment variables, then
//! held immutably for the process lifetime and cloned into every service
//! that needs it.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use uuid::Uuid;

/// Base-asset quantities are always scaled at this precision.
pub const AMOUNT_PRECISION: u32 = 4;
/// Maximum number of actions fetched per `list_pending_actions` page.
pub const ACTION_BATCH_SIZE: i64 = 500;
/// Maximum number of transfers fetched per `list_pending_transfers` page.
pub const TRANSFER_BATCH_SIZE: i64 = 500;
/// Sleep between poll iterations when a page comes back short.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Maximum human-readable price.
pub const MAX_PRICE: i64 = 1_000_000_000;
/// Maximum human-readable base amount.
pub const MAX_AMOUNT: i64 = 5_000_000_000;
/// Maximum human-readable quote-denominated funds (spec §4.1: funds ≤ 5·10^18).
pub const MAX_FUNDS: i64 = 5_000_000_000_000_000_000;
/// Slots in the transfer serialization lock table.
pub const LOCK_TABLE_SLOTS: usize = 100;

/// Fraction of a deposit returned when the accompanying order is invalid.
/// Hard-coded rather than per-asset configurable (spec §9 open question,
/// resolved toward the original's literal `0.999`).
pub fn refund_ratio() -> Decimal {
    Decimal::new(999, 3)
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    pub broker_id: Uuid,
    pub label: String,
}

/// A permitted quote asset's pricing parameters.
#[derive(Debug, Clone, Copy)]
pub struct QuoteParams {
    pub price_precision: u32,
    pub min_notional: Decimal,
}

impl QuoteParams {
    pub fn funds_precision(&self) -> u32 {
        AMOUNT_PRECISION + self.price_precision
    }
}

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub environment: String,
    /// Per-quote-asset pricing parameters (PRICE_PRECISION, minimum notional).
    pub quotes: HashMap<Uuid, QuoteParams>,
    /// Excluded (quote, base) orientations, on top of the base ≠ quote rule.
    pub excluded_pairs: HashSet<(Uuid, Uuid)>,
    pub brokers: Vec<BrokerConfig>,
}

impl ExchangeConfig {
    /// Load configuration from `.env` plus process environment, matching
    /// the teacher's `dotenvy::dotenv().ok()` + `config::Config` layering.
    pub fn load() -> anyhow::Result<Self> {
        #[derive(Debug, Deserialize)]
        struct Raw {
            environment: Option<String>,
            quote_asset_ids: String,
            quote_price_precisions: String,
            quote_min_notionals: String,
            excluded_pairs: Option<String>,
            broker_ids: Option<String>,
            broker_labels: Option<String>,
        }

        let settings = config::Config::builder()
            .set_default("environment", "development")?
            .set_default("excluded_pairs", "")?
            .set_default("broker_ids", "")?
            .set_default("broker_labels", "")?
            .add_source(config::Environment::with_prefix("EXCHANGE").separator("__"))
            .build()?;

        let raw: Raw = settings.try_deserialize()?;

        let asset_ids = split_uuids(&raw.quote_asset_ids)?;
        let precisions = split_u32(&raw.quote_price_precisions)?;
        let min_notionals = split_decimal(&raw.quote_min_notionals)?;

        anyhow::ensure!(
            asset_ids.len() == precisions.len() && asset_ids.len() == min_notionals.len(),
            "EXCHANGE__QUOTE_ASSET_IDS, EXCHANGE__QUOTE_PRICE_PRECISIONS and \
             EXCHANGE__QUOTE_MIN_NOTIONALS must have the same number of entries"
        );

        let mut quotes = HashMap::new();
        for ((id, precision), min_notional) in asset_ids
            .into_iter()
            .zip(precisions.into_iter())
            .zip(min_notionals.into_iter())
        {
            quotes.insert(
                id,
                QuoteParams {
                    price_precision: precision,
                    min_notional,
                },
            );
        }

        let excluded_pairs = raw
            .excluded_pairs
            .unwrap_or_default()
            .split(';')
            .filter(|s| !s.is_empty())
            .map(|pair| {
                let mut parts = pair.split(',');
                let quote = parts
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("malformed excluded pair entry: {pair}"))?
                    .trim()
                    .parse::<Uuid>()?;
                let base = parts
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("malformed excluded pair entry: {pair}"))?
                    .trim()
                    .parse::<Uuid>()?;
                Ok::<_, anyhow::Error>((quote, base))
            })
            .collect::<anyhow::Result<HashSet<_>>>()?;

        let broker_ids = split_uuids(&raw.broker_ids.unwrap_or_default()).unwrap_or_default();
        let broker_labels: Vec<String> = raw
            .broker_labels
            .unwrap_or_default()
            .split(',')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();

        let brokers = broker_ids
            .into_iter()
            .enumerate()
            .map(|(i, broker_id)| BrokerConfig {
                broker_id,
                label: broker_labels.get(i).cloned().unwrap_or_else(|| format!("broker-{i}")),
            })
            .collect();

        Ok(Self {
            environment: raw.environment.unwrap_or_else(|| "development".to_string()),
            quotes,
            excluded_pairs,
            brokers,
        })
    }

    pub fn is_permitted_pair(&self, quote: Uuid, base: Uuid) -> bool {
        if quote == base {
            return false;
        }
        if !self.quotes.contains_key(&quote) {
            return false;
        }
        !self.excluded_pairs.contains(&(quote, base))
    }
}

fn split_uuids(s: &str) -> anyhow::Result<Vec<Uuid>> {
    s.split(',')
        .filter(|s| !s.is_empty())
        .map(|s| s.trim().parse::<Uuid>().map_err(anyhow::Error::from))
        .collect()
}

fn split_u32(s: &str) -> anyhow::Result<Vec<u32>> {
    s.split(',')
        .filter(|s| !s.is_empty())
        .map(|s| s.trim().parse::<u32>().map_err(anyhow::Error::from))
        .collect()
}

fn split_decimal(s: &str) -> anyhow::Result<Vec<Decimal>> {
    s.split(',')
        .filter(|s| !s.is_empty())
        .map(|s| s.trim().parse::<Decimal>().map_err(anyhow::Error::from))
        .collect()
}

//! Process entry point: wires configuration, the persistence collaborator,
//! the matching engine dispatcher, and the deposit/transfer pollers.
//!
//! Keeps the teacher's startup idiom (`dotenvy` + `tracing_subscriber` +
//! per-subsystem `tokio::spawn` narrated with `tracing::info!`) but drops its
//! axum HTTP router entirely: the read API is an explicit Non-goal here, so
//! this binary is a pure background-worker process.

mod broker;
mod config;
mod deposit;
mod engine;
mod error;
mod metrics;
mod model;
mod numeric;
mod pipeline;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::broker::LoggingTransferSender;
use crate::config::ExchangeConfig;
use crate::deposit::{run_deposit_poller, NullSnapshotSource};
use crate::engine::{run_dispatcher, MarketParams, MarketResolver};
use crate::model::Broker;
use crate::pipeline::persistence::{MemoryStore, PersistingCallbacks};
use crate::pipeline::transfer::run_transfer_poller;

/// Resolves a market's pricing parameters from the loaded `ExchangeConfig`.
/// The book itself doesn't need to know the quote/base pair's asset ids
/// beyond what it was constructed with, so this is only consulted once, the
/// first time the dispatcher sees an action for a given market.
struct ConfigMarketResolver {
    config: Arc<ExchangeConfig>,
}

impl MarketResolver for ConfigMarketResolver {
    fn resolve(&self, quote_asset: Uuid, base_asset: Uuid) -> Option<MarketParams> {
        let params = self.config.quotes.get(&quote_asset)?;
        Some(MarketParams {
            quote_asset,
            base_asset,
            price_precision: params.price_precision,
            min_notional: crate::numeric::FixedPoint::from_decimal(params.min_notional, params.funds_precision()),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "exchange_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Arc::new(ExchangeConfig::load()?);

    tracing::info!("Starting exchange-core v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(environment = %config.environment, "Configuration loaded");

    let _metrics_handle = crate::metrics::init_metrics();
    tracing::info!("Prometheus recorder installed");

    // The concrete persistence backend is an external collaborator (spec §1
    // Non-goal); this binary runs against the in-memory double so the
    // dispatcher/poller loops are exercisable without a live database.
    let store = Arc::new(MemoryStore::new());

    let brokers: Vec<Broker> = config
        .brokers
        .iter()
        .map(|b| Broker { id: b.broker_id, label: b.label.clone() })
        .collect();
    store.seed_brokers(brokers.clone());
    tracing::info!(broker_count = brokers.len(), "Broker table loaded");

    let resolver: Arc<dyn MarketResolver> = Arc::new(ConfigMarketResolver { config: config.clone() });

    // One PersistingCallbacks instance per broker would be wrong if a market
    // could route to more than one broker; in practice a market's callbacks
    // are built lazily per (quote, base) and all settle through whichever
    // broker owns the resting order's `broker_id`. For the demo wiring we
    // settle every market through the first configured broker.
    let default_broker = brokers.first().cloned();
    let store_for_dispatcher = store.clone();
    let dispatcher_store = store.clone();
    let _dispatcher = run_dispatcher(dispatcher_store, resolver, move |_quote, _base| {
        let broker_id = default_broker.as_ref().map(|b| b.id).unwrap_or_else(Uuid::nil);
        Arc::new(PersistingCallbacks::new(store_for_dispatcher.clone(), broker_id))
    })
    .await;
    tracing::info!("Engine dispatcher started");

    let deposit_store = store.clone();
    let deposit_config = config.clone();
    tokio::spawn(async move {
        run_deposit_poller(deposit_store, Arc::new(NullSnapshotSource), deposit_config).await;
    });
    tracing::info!("Deposit poller started");

    let sender = Arc::new(LoggingTransferSender);
    let mut poller_handles = Vec::with_capacity(brokers.len());
    for broker in brokers {
        let transfer_store = store.clone();
        let transfer_sender = sender.clone();
        let handle = tokio::spawn(async move {
            run_transfer_poller(transfer_store, transfer_sender, broker).await;
        });
        poller_handles.push(handle);
    }
    tracing::info!(pollers = poller_handles.len(), "Transfer pollers started");

    // Keep the process alive: the dispatcher, deposit poller, and transfer
    // pollers above run forever. This binary hosts no HTTP surface (that's
    // an explicit Non-goal here); external collaborators observe progress
    // through the Prometheus endpoint the metrics recorder above installs.
    loop {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
    }
}

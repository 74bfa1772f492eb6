//! Single consumer of the durable action log: lazily spins up one task per
//! market, forwards each action to its book, and only advances the
//! checkpoint once every action in the page has been durably applied.
//!
//! Grounded on the original's `PollOrderActions`/`ensureProcessOrderAction`/
//! `buildBook` loop shape (one goroutine per market, built lazily on first
//! sight of that market's actions) and on the teacher's `tokio::spawn` +
//! `mpsc` idiom for moving exclusive state onto its own task.

use crate::config::{ACTION_BATCH_SIZE, AMOUNT_PRECISION, POLL_INTERVAL};
use crate::engine::book::Book;
use crate::engine::types::MarketParams;
use crate::model::action::{Action, ActionRecord};
use crate::model::Property;
use crate::pipeline::PersistenceStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Resolves a market's pricing parameters the first time the dispatcher
/// sees an action for it. In production this reads `ExchangeConfig`; tests
/// can supply a fixed table.
pub trait MarketResolver: Send + Sync {
    fn resolve(&self, quote_asset: Uuid, base_asset: Uuid) -> Option<MarketParams>;
}

enum DispatchMsg {
    Create { order: crate::model::Order, ack: oneshot::Sender<()> },
    Cancel { order_id: Uuid, ack: oneshot::Sender<()> },
}

/// A live handle to the dispatcher's background task, kept so the caller can
/// observe or cancel it.
pub struct DispatcherHandle {
    pub task: tokio::task::JoinHandle<()>,
}

const CHECKPOINT_KEY: &str = "engine-dispatch-checkpoint";

/// Runs forever: polls `store` for pending actions after the last persisted
/// checkpoint, routes each to its market's book (spawning the book's task on
/// first use), and advances the checkpoint only after every action in the
/// page has been applied.
pub async fn run_dispatcher<S, F, B>(store: Arc<S>, resolver: Arc<dyn MarketResolver>, build_callbacks: F) -> DispatcherHandle
where
    S: PersistenceStore + 'static,
    F: Fn(Uuid, Uuid) -> Arc<B> + Send + Sync + 'static,
    B: crate::engine::MatchCallbacks + 'static,
{
    let task = tokio::spawn(async move {
        let mut checkpoint = load_checkpoint(store.as_ref()).await;
        let mut senders: HashMap<(Uuid, Uuid), mpsc::UnboundedSender<DispatchMsg>> = HashMap::new();

        loop {
            let page = match store.list_pending_actions(checkpoint, ACTION_BATCH_SIZE).await {
                Ok(page) => page,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to list pending actions");
                    tokio::time::sleep(POLL_INTERVAL).await;
                    continue;
                }
            };

            if page.is_empty() {
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }

            let mut acks = Vec::with_capacity(page.len());
            let mut last_created_at = checkpoint;

            for record in &page {
                let market = record.market();
                let sender = senders.entry(market).or_insert_with(|| {
                    spawn_market_task(market, resolver.clone(), &build_callbacks)
                });

                let (ack_tx, ack_rx) = oneshot::channel();
                let msg = match &record.action {
                    Action::Create { order } => DispatchMsg::Create { order: order.clone(), ack: ack_tx },
                    Action::Cancel { order_id, .. } => DispatchMsg::Cancel { order_id: *order_id, ack: ack_tx },
                };

                if sender.send(msg).is_err() {
                    tracing::error!(?market, "market task no longer receiving, dropping page");
                    break;
                }
                acks.push(ack_rx);
                last_created_at = record.created_at;
            }

            for ack in acks {
                let _ = ack.await;
            }

            checkpoint = last_created_at;
            if let Err(err) = store.write_property(CHECKPOINT_KEY, &checkpoint.to_rfc3339()).await {
                tracing::warn!(error = %err, "failed to persist dispatcher checkpoint");
            }

            if page.len() < ACTION_BATCH_SIZE as usize {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    });

    DispatcherHandle { task }
}

async fn load_checkpoint<S: PersistenceStore>(store: &S) -> DateTime<Utc> {
    match store.read_property(CHECKPOINT_KEY).await {
        Ok(Some(Property { value, .. })) => DateTime::parse_from_rfc3339(&value)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC),
        _ => DateTime::<Utc>::MIN_UTC,
    }
}

fn spawn_market_task<F, B>(
    market: (Uuid, Uuid),
    resolver: Arc<dyn MarketResolver>,
    build_callbacks: &F,
) -> mpsc::UnboundedSender<DispatchMsg>
where
    F: Fn(Uuid, Uuid) -> Arc<B> + Send + Sync + 'static,
    B: crate::engine::MatchCallbacks + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<DispatchMsg>();
    let (quote, base) = market;

    let params = resolver.resolve(quote, base).unwrap_or(MarketParams {
        quote_asset: quote,
        base_asset: base,
        price_precision: AMOUNT_PRECISION,
        min_notional: crate::numeric::FixedPoint::zero(AMOUNT_PRECISION * 2),
    });
    let callbacks = build_callbacks(quote, base);
    let book = Book::new(params, callbacks);

    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match msg {
                DispatchMsg::Create { order, ack } => {
                    book.attach_create(order).await;
                    let _ = ack.send(());
                }
                DispatchMsg::Cancel { order_id, ack } => {
                    if let Err(err) = book.attach_cancel(order_id).await {
                        tracing::error!(%err, "invariant violation in order book, stopping market task");
                        let _ = ack.send(());
                        panic!("{err}");
                    }
                    let _ = ack.send(());
                }
            }
        }
    });

    tx
}

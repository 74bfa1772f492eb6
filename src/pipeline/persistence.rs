//! Durable storage contract for the action log, trades, transfers, and the
//! deposit poller's watermark.
//!
//! Mirrors the original's `Persist` interface method-for-method. The
//! concrete backend is a Non-goal; this module only defines the contract
//! plus an in-memory double used by tests and by the runnable demo binary.

use crate::engine::MatchCallbacks;
use crate::error::TransientError;
use crate::model::action::ActionRecord;
use crate::model::order::Order;
use crate::model::trade::Trade;
use crate::model::transfer::Transfer;
use crate::model::{Broker, Property};
use crate::numeric::FixedPoint;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Everything the engine, dispatcher, and transfer pollers need from durable
/// storage. Every method is retried by its caller with `POLL_INTERVAL`
/// backoff on `TransientError` — implementations never need their own retry
/// loop.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn read_property(&self, key: &str) -> Result<Option<Property>, TransientError>;
    async fn write_property(&self, key: &str, value: &str) -> Result<(), TransientError>;

    /// Actions strictly ordered by `(created_at, id)`, starting after
    /// `checkpoint`. The dispatcher treats a page shorter than `limit` as
    /// "caught up" and backs off for `POLL_INTERVAL`.
    async fn list_pending_actions(&self, checkpoint: DateTime<Utc>, limit: i64) -> Result<Vec<ActionRecord>, TransientError>;

    async fn append_create_action(&self, order: Order, created_at: DateTime<Utc>) -> Result<(), TransientError>;

    /// Enqueue a cancel. Unlike `append_create_action`, this carries no
    /// market fields (spec §6: `cancel_order_action(order-id, created-at,
    /// user-id)`) — a concrete backend resolves the market by looking up
    /// `order_id`'s own CREATE record when it builds the `ActionRecord`
    /// returned from `list_pending_actions`.
    async fn append_cancel_action(&self, order_id: Uuid, user_id: Uuid, created_at: DateTime<Utc>) -> Result<(), TransientError>;

    /// Persist one match step and enqueue its settlement transfers
    /// atomically: the trade, both orders' updated remaining/filled fields,
    /// and (for whichever side became exhausted) its fill transfer.
    async fn record_trade(&self, trade: Trade, taker: Order, maker: Order, transfers: Vec<Transfer>) -> Result<(), TransientError>;

    /// Persist a cancellation and its refund transfer (if the residual is
    /// non-zero) atomically.
    async fn record_cancel(&self, order_id: Uuid, residual_amount: FixedPoint, residual_funds: FixedPoint, transfer: Option<Transfer>) -> Result<(), TransientError>;

    async fn list_pending_transfers(&self, broker_id: Uuid, limit: i64) -> Result<Vec<Transfer>, TransientError>;
    async fn mark_transfers_submitted(&self, transfer_ids: &[Uuid]) -> Result<(), TransientError>;
    async fn create_refund_transfer(&self, transfer: Transfer) -> Result<(), TransientError>;

    async fn all_brokers(&self) -> Result<Vec<Broker>, TransientError>;

    /// Registers a user's settlement public key from a deposit memo. The key
    /// material itself is opaque here — signing/verification is out of scope.
    async fn update_user_public_key(&self, user_id: Uuid, public_key: &str) -> Result<(), TransientError>;
}

/// Wraps a `PersistenceStore` into the `MatchCallbacks` the book awaits on,
/// assigning each trade a per-market sequence number and building the two
/// settlement transfers a completed trade or cancellation releases.
pub struct PersistingCallbacks<S: PersistenceStore> {
    store: Arc<S>,
    broker_id: Uuid,
    sequence: AtomicU64,
}

impl<S: PersistenceStore> PersistingCallbacks<S> {
    pub fn new(store: Arc<S>, broker_id: Uuid) -> Self {
        Self { store, broker_id, sequence: AtomicU64::new(0) }
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }
}

#[async_trait]
impl<S: PersistenceStore> MatchCallbacks for PersistingCallbacks<S> {
    async fn transact(
        &self,
        taker: &Order,
        maker: &Order,
        trade_amount: FixedPoint,
        trade_price: FixedPoint,
        trade_funds: FixedPoint,
    ) {
        use crate::model::order::OrderSide;
        use crate::model::transfer::{derive_trade_transfer_id, Transfer, TransferDetail, TransferSource};

        let (ask, bid) = match taker.side {
            OrderSide::Ask => (taker, maker),
            OrderSide::Bid => (maker, taker),
        };

        let trade = Trade {
            id: Uuid::new_v4(),
            ask_order_id: ask.id,
            bid_order_id: bid.id,
            base_amount: trade_amount,
            price: trade_price,
            funds: trade_funds,
            taker_side: taker.side,
            sequence: self.next_sequence(),
            created_at: Utc::now(),
        };

        let match_detail = TransferDetail::Trade { ask_order_id: ask.id, bid_order_id: bid.id };

        // One transfer per settled leg (spec §4.4): base goes to the bid
        // side, quote goes to the ask side, every trade step regardless of
        // whether either counterparty is exhausted yet.
        let transfers = vec![
            Transfer {
                id: derive_trade_transfer_id(trade.id, bid.base_asset),
                broker_id: self.broker_id,
                user_id: bid.user_id,
                asset_id: bid.base_asset,
                amount: trade_amount.to_decimal(),
                source: TransferSource::TradeConfirmed,
                detail: match_detail,
                created_at: Utc::now(),
            },
            Transfer {
                id: derive_trade_transfer_id(trade.id, ask.quote_asset),
                broker_id: self.broker_id,
                user_id: ask.user_id,
                asset_id: ask.quote_asset,
                amount: trade_funds.to_decimal(),
                source: TransferSource::TradeConfirmed,
                detail: match_detail,
                created_at: Utc::now(),
            },
        ];

        let mut attempt = || self.store.record_trade(trade.clone(), taker.clone(), maker.clone(), transfers.clone());
        loop {
            if attempt().await.is_ok() {
                return;
            }
            tokio::time::sleep(crate::config::POLL_INTERVAL).await;
        }
    }

    async fn cancel(&self, order: &Order, residual_amount: FixedPoint, residual_funds: FixedPoint) {
        use crate::model::order::OrderSide;
        use crate::model::transfer::{derive_transfer_id, Transfer, TransferDetail, TransferSource};

        let is_dust = match order.side {
            OrderSide::Ask => residual_amount.is_zero(),
            OrderSide::Bid => residual_funds.is_zero(),
        };

        let transfer = if is_dust {
            None
        } else {
            // ASK reserves base (spec §4.5 step 8: ASK base = snapshot
            // asset), so its residual is refunded in base_asset; BID
            // reserves quote-denominated funds, refunded in quote_asset.
            let (asset_id, amount) = match order.side {
                OrderSide::Ask => (order.base_asset, residual_amount),
                OrderSide::Bid => (order.quote_asset, residual_funds),
            };
            let detail = TransferDetail::Order(order.id);
            let id = derive_transfer_id(TransferSource::OrderCancelled, detail, asset_id);
            Some(Transfer {
                id,
                broker_id: self.broker_id,
                user_id: order.user_id,
                asset_id,
                amount: amount.to_decimal(),
                source: TransferSource::OrderCancelled,
                detail,
                created_at: Utc::now(),
            })
        };

        loop {
            if self
                .store
                .record_cancel(order.id, residual_amount, residual_funds, transfer.clone())
                .await
                .is_ok()
            {
                return;
            }
            tokio::time::sleep(crate::config::POLL_INTERVAL).await;
        }
    }

    async fn absorb_cancel(&self, _order_id: Uuid) {
        // Already recorded by the `transact` call that exhausted it; nothing
        // further to persist.
    }
}

/// In-memory `PersistenceStore`, used by the demo binary and by tests that
/// exercise the dispatcher/transfer pollers without a live database.
#[derive(Default)]
pub struct MemoryStore {
    inner: parking_lot::Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    properties: HashMap<String, String>,
    actions: Vec<ActionRecord>,
    transfers: HashMap<Uuid, Transfer>,
    submitted: std::collections::HashSet<Uuid>,
    brokers: Vec<Broker>,
    public_keys: HashMap<Uuid, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_brokers(&self, brokers: Vec<Broker>) {
        self.inner.lock().brokers = brokers;
    }

    pub fn enqueue_action(&self, record: ActionRecord) {
        self.inner.lock().actions.push(record);
    }
}

#[async_trait]
impl PersistenceStore for MemoryStore {
    async fn read_property(&self, key: &str) -> Result<Option<Property>, TransientError> {
        Ok(self.inner.lock().properties.get(key).map(|value| Property { key: key.to_string(), value: value.clone() }))
    }

    async fn write_property(&self, key: &str, value: &str) -> Result<(), TransientError> {
        self.inner.lock().properties.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn list_pending_actions(&self, checkpoint: DateTime<Utc>, limit: i64) -> Result<Vec<ActionRecord>, TransientError> {
        let state = self.inner.lock();
        Ok(state
            .actions
            .iter()
            .filter(|record| record.created_at > checkpoint)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn append_create_action(&self, order: Order, created_at: DateTime<Utc>) -> Result<(), TransientError> {
        use crate::model::action::Action;
        self.inner.lock().actions.push(Action::Create { order }.created_at(created_at));
        Ok(())
    }

    async fn append_cancel_action(&self, order_id: Uuid, _user_id: Uuid, created_at: DateTime<Utc>) -> Result<(), TransientError> {
        use crate::model::action::Action;
        let mut state = self.inner.lock();
        let market = state
            .actions
            .iter()
            .find_map(|record| match &record.action {
                Action::Create { order } if order.id == order_id => Some((order.quote_asset, order.base_asset)),
                _ => None,
            })
            .ok_or_else(|| TransientError::Persistence(format!("no CREATE record found for order {order_id}")))?;
        state
            .actions
            .push(Action::Cancel { order_id, market_quote: market.0, market_base: market.1 }.created_at(created_at));
        Ok(())
    }

    async fn record_trade(&self, _trade: Trade, _taker: Order, _maker: Order, transfers: Vec<Transfer>) -> Result<(), TransientError> {
        let mut state = self.inner.lock();
        for transfer in transfers {
            state.transfers.entry(transfer.id).or_insert(transfer);
        }
        Ok(())
    }

    async fn record_cancel(&self, _order_id: Uuid, _residual_amount: FixedPoint, _residual_funds: FixedPoint, transfer: Option<Transfer>) -> Result<(), TransientError> {
        if let Some(transfer) = transfer {
            self.inner.lock().transfers.entry(transfer.id).or_insert(transfer);
        }
        Ok(())
    }

    async fn list_pending_transfers(&self, broker_id: Uuid, limit: i64) -> Result<Vec<Transfer>, TransientError> {
        let state = self.inner.lock();
        Ok(state
            .transfers
            .values()
            .filter(|t| t.broker_id == broker_id && !state.submitted.contains(&t.id))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn mark_transfers_submitted(&self, transfer_ids: &[Uuid]) -> Result<(), TransientError> {
        let mut state = self.inner.lock();
        for id in transfer_ids {
            state.submitted.insert(*id);
        }
        Ok(())
    }

    async fn create_refund_transfer(&self, transfer: Transfer) -> Result<(), TransientError> {
        self.inner.lock().transfers.entry(transfer.id).or_insert(transfer);
        Ok(())
    }

    async fn all_brokers(&self) -> Result<Vec<Broker>, TransientError> {
        Ok(self.inner.lock().brokers.clone())
    }

    async fn update_user_public_key(&self, user_id: Uuid, public_key: &str) -> Result<(), TransientError> {
        self.inner.lock().public_keys.insert(user_id, public_key.to_string());
        Ok(())
    }
}

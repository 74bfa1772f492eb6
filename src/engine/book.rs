//! Per-market order book: price-time priority matching over fixed-point
//! arithmetic.
//!
//! Generalizes the teacher's `Orderbook` (two price-ordered maps of FIFO
//! queues plus an order-id index for O(1) cancel) to the funds-tracking BID
//! side and to the explicit `MatchCallbacks` trait instead of a direct
//! persistence dependency.

use crate::engine::callbacks::MatchCallbacks;
use crate::engine::types::MarketParams;
use crate::error::InvariantError;
use crate::model::order::{Order, OrderSide, OrderType};
use crate::numeric::FixedPoint;
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

type Side = BTreeMap<FixedPoint, VecDeque<Order>>;

/// A single market's live order book. Mutated exclusively by the book's
/// dedicated task (spec §5) — the locks exist so read-only observers
/// (metrics, diagnostics) can inspect depth without blocking matching, not
/// to support concurrent writers.
pub struct Book {
    params: MarketParams,
    bids: RwLock<Side>,
    asks: RwLock<Side>,
    /// order id -> (side, price) for live resting orders.
    order_index: DashMap<Uuid, (OrderSide, FixedPoint)>,
    /// Every order id ever attached to this book, retained for the process
    /// lifetime so a late CANCEL for an already-exhausted order can be told
    /// apart from a genuine cancel-before-create race.
    seen: DashSet<Uuid>,
    callbacks: Arc<dyn MatchCallbacks>,
}

impl Book {
    pub fn new(params: MarketParams, callbacks: Arc<dyn MatchCallbacks>) -> Self {
        Self {
            params,
            bids: RwLock::new(BTreeMap::new()),
            asks: RwLock::new(BTreeMap::new()),
            order_index: DashMap::new(),
            seen: DashSet::new(),
            callbacks,
        }
    }

    pub fn params(&self) -> &MarketParams {
        &self.params
    }

    pub fn order_count(&self) -> usize {
        self.order_index.len()
    }

    fn side_map(&self, side: OrderSide) -> &RwLock<Side> {
        match side {
            OrderSide::Bid => &self.bids,
            OrderSide::Ask => &self.asks,
        }
    }

    fn best_price(&self, side: OrderSide) -> Option<FixedPoint> {
        let book = self.side_map(side).read();
        match side {
            // Bids are matched best-first, i.e. highest price first.
            OrderSide::Bid => book.keys().next_back().copied(),
            // Asks are matched best-first, i.e. lowest price first.
            OrderSide::Ask => book.keys().next().copied(),
        }
    }

    fn pop_front_at(&self, side: OrderSide, price: FixedPoint) -> Option<Order> {
        let mut book = self.side_map(side).write();
        let queue = book.get_mut(&price)?;
        let order = queue.pop_front();
        if queue.is_empty() {
            book.remove(&price);
        }
        order
    }

    fn push_front(&self, side: OrderSide, price: FixedPoint, order: Order) {
        let mut book = self.side_map(side).write();
        book.entry(price).or_insert_with(VecDeque::new).push_front(order);
    }

    fn rest(&self, order: Order) {
        let side = order.side;
        let price = order.price;
        let id = order.id;
        {
            let mut book = self.side_map(side).write();
            book.entry(price).or_insert_with(VecDeque::new).push_back(order);
        }
        self.order_index.insert(id, (side, price));
    }

    fn remove_from_index(&self, order_id: Uuid) {
        self.order_index.remove(&order_id);
    }

    /// Handle a CREATE action: match the incoming order against the
    /// opposite side, then dispose of any leftover per spec §4.2.
    pub async fn attach_create(&self, mut taker: Order) {
        self.seen.insert(taker.id);
        let opposite = opposite_side(taker.side);

        loop {
            if taker.is_exhausted() {
                break;
            }

            let Some(maker_price) = self.best_price(opposite) else {
                break;
            };

            if taker.order_type == OrderType::Limit && !crosses(taker.side, taker.price, maker_price) {
                break;
            }

            let Some(mut maker) = self.pop_front_at(opposite, maker_price) else {
                break;
            };

            let max_base = compute_max_base(&taker, &maker, maker_price);

            if max_base.is_zero() {
                self.push_front(opposite, maker_price, maker);
                break;
            }

            let trade_funds = maker_price.mul(&max_base).rescale(self.params.funds_precision());

            apply_fill(&mut taker, max_base, trade_funds, &self.params);
            apply_fill(&mut maker, max_base, trade_funds, &self.params);

            self.callbacks
                .transact(&taker, &maker, max_base, maker_price, trade_funds)
                .await;

            let maker_exhausted = match maker.side {
                OrderSide::Ask => maker.remaining_amount.is_zero(),
                OrderSide::Bid => maker.remaining_funds < self.params.min_notional,
            };

            if maker_exhausted {
                self.remove_from_index(maker.id);
            } else {
                self.push_front(opposite, maker_price, maker);
            }
        }

        self.dispose_taker(taker).await;
    }

    async fn dispose_taker(&self, taker: Order) {
        match taker.order_type {
            OrderType::Market => {
                if !taker.is_exhausted() {
                    self.callbacks
                        .cancel(&taker, taker.remaining_amount, taker.remaining_funds)
                        .await;
                }
            }
            OrderType::Limit => {
                if taker.is_exhausted() {
                    return;
                }
                let below_minimum = match taker.side {
                    OrderSide::Bid => taker.remaining_funds < self.params.min_notional,
                    OrderSide::Ask => taker.remaining_amount.is_zero(),
                };
                if below_minimum {
                    self.callbacks
                        .cancel(&taker, taker.remaining_amount, taker.remaining_funds)
                        .await;
                } else {
                    self.rest(taker);
                }
            }
        }
    }

    /// Handle a CANCEL action. Per spec §4.2: if the order is present,
    /// remove it and report the live residual; if absent, the engine must
    /// be able to prove it was already resolved (never a genuine
    /// cancel-before-create race, since actions are applied in strict
    /// per-market order).
    pub async fn attach_cancel(&self, order_id: Uuid) -> Result<(), InvariantError> {
        if let Some((_, (side, price))) = self.order_index.remove(&order_id) {
            if let Some(order) = self.pop_specific(side, price, order_id) {
                self.callbacks
                    .cancel(&order, order.remaining_amount, order.remaining_funds)
                    .await;
                return Ok(());
            }
        }

        if self.seen.contains(&order_id) {
            self.callbacks.absorb_cancel(order_id).await;
            Ok(())
        } else {
            Err(InvariantError::CancelBeforeCreate(order_id))
        }
    }

    fn pop_specific(&self, side: OrderSide, price: FixedPoint, order_id: Uuid) -> Option<Order> {
        let mut book = self.side_map(side).write();
        let queue = book.get_mut(&price)?;
        let pos = queue.iter().position(|o| o.id == order_id)?;
        let order = queue.remove(pos);
        if queue.is_empty() {
            book.remove(&price);
        }
        order
    }

    /// Total outstanding depth on one side, for metrics/diagnostics.
    pub fn depth(&self, side: OrderSide) -> FixedPoint {
        let book = self.side_map(side).read();
        book.values()
            .flat_map(|q| q.iter())
            .fold(FixedPoint::zero(crate::config::AMOUNT_PRECISION), |acc, o| acc.add(&o.remaining_amount))
    }
}

fn opposite_side(side: OrderSide) -> OrderSide {
    match side {
        OrderSide::Ask => OrderSide::Bid,
        OrderSide::Bid => OrderSide::Ask,
    }
}

/// ASK crosses when taker.price ≤ maker.price; BID crosses when
/// taker.price ≥ maker.price. Maker always sets the trade price.
fn crosses(taker_side: OrderSide, taker_price: FixedPoint, maker_price: FixedPoint) -> bool {
    match taker_side {
        OrderSide::Ask => taker_price <= maker_price,
        OrderSide::Bid => taker_price >= maker_price,
    }
}

fn compute_max_base(taker: &Order, maker: &Order, maker_price: FixedPoint) -> FixedPoint {
    let amount_precision = crate::config::AMOUNT_PRECISION;
    match taker.side {
        OrderSide::Ask => taker.remaining_amount.min(&maker.remaining_amount),
        OrderSide::Bid => {
            let by_funds = taker.remaining_funds.div(&maker_price).rescale(amount_precision);
            maker.remaining_amount.min(&by_funds)
        }
    }
}

/// Apply one match step's effect to either the taker or a maker. The
/// authoritative field for ASK orders is `remaining_amount`/`filled_amount`;
/// for BID orders it is `remaining_funds`/`filled_funds`. The other pair is
/// kept in sync from the order's own resting price so that, e.g., a BID
/// maker's `remaining_amount` is always available for an ASK taker to
/// consume against (spec §4.2 step 4).
fn apply_fill(order: &mut Order, amount: FixedPoint, funds: FixedPoint, params: &MarketParams) {
    match order.side {
        OrderSide::Ask => {
            order.remaining_amount = order.remaining_amount.sub(&amount);
            order.filled_amount = order.filled_amount.add(&amount);
            order.filled_funds = order.filled_funds.add(&funds);
            if order.order_type == OrderType::Limit {
                order.remaining_funds = order.remaining_amount.mul(&order.price).rescale(params.funds_precision());
            }
        }
        OrderSide::Bid => {
            order.remaining_funds = order.remaining_funds.sub(&funds);
            order.filled_funds = order.filled_funds.add(&funds);
            order.filled_amount = order.filled_amount.add(&amount);
            if order.order_type == OrderType::Limit {
                order.remaining_amount = order
                    .remaining_funds
                    .div(&order.price)
                    .rescale(crate::config::AMOUNT_PRECISION);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AMOUNT_PRECISION;
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;

    #[derive(Default)]
    struct Recorder {
        trades: Mutex<Vec<(Uuid, Uuid, FixedPoint, FixedPoint)>>,
        cancels: Mutex<Vec<(Uuid, FixedPoint, FixedPoint)>>,
        absorbed: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl MatchCallbacks for Recorder {
        async fn transact(&self, taker: &Order, maker: &Order, amount: FixedPoint, price: FixedPoint, _funds: FixedPoint) {
            self.trades.lock().push((taker.id, maker.id, amount, price));
        }

        async fn cancel(&self, order: &Order, residual_amount: FixedPoint, residual_funds: FixedPoint) {
            self.cancels.lock().push((order.id, residual_amount, residual_funds));
        }

        async fn absorb_cancel(&self, order_id: Uuid) {
            self.absorbed.lock().push(order_id);
        }
    }

    fn params() -> MarketParams {
        MarketParams {
            quote_asset: Uuid::new_v4(),
            base_asset: Uuid::new_v4(),
            price_precision: 8,
            min_notional: FixedPoint::from_decimal(dec!(0.0001), 12),
        }
    }

    fn limit_ask(price: rust_decimal::Decimal, amount: rust_decimal::Decimal, p: &MarketParams) -> Order {
        let price_fp = FixedPoint::from_decimal(price, p.price_precision);
        let amount_fp = FixedPoint::from_decimal(amount, AMOUNT_PRECISION);
        Order {
            id: Uuid::new_v4(),
            side: OrderSide::Ask,
            order_type: OrderType::Limit,
            quote_asset: p.quote_asset,
            base_asset: p.base_asset,
            price: price_fp,
            remaining_amount: amount_fp,
            filled_amount: FixedPoint::zero(AMOUNT_PRECISION),
            remaining_funds: amount_fp.mul(&price_fp).rescale(p.funds_precision()),
            filled_funds: FixedPoint::zero(p.funds_precision()),
            user_id: Uuid::new_v4(),
            broker_id: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    fn limit_bid(price: rust_decimal::Decimal, amount: rust_decimal::Decimal, p: &MarketParams) -> Order {
        let price_fp = FixedPoint::from_decimal(price, p.price_precision);
        let amount_fp = FixedPoint::from_decimal(amount, AMOUNT_PRECISION);
        let funds_fp = amount_fp.mul(&price_fp).rescale(p.funds_precision());
        Order {
            id: Uuid::new_v4(),
            side: OrderSide::Bid,
            order_type: OrderType::Limit,
            quote_asset: p.quote_asset,
            base_asset: p.base_asset,
            price: price_fp,
            remaining_amount: amount_fp,
            filled_amount: FixedPoint::zero(AMOUNT_PRECISION),
            remaining_funds: funds_fp,
            filled_funds: FixedPoint::zero(p.funds_precision()),
            user_id: Uuid::new_v4(),
            broker_id: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn simple_cross_fully_fills_both_sides() {
        let p = params();
        let cb = Arc::new(Recorder::default());
        let book = Book::new(p.clone(), cb.clone());

        let bid = limit_bid(dec!(100), dec!(1.0), &p);
        book.attach_create(bid).await;

        let ask = limit_ask(dec!(100), dec!(1.0), &p);
        book.attach_create(ask).await;

        assert_eq!(cb.trades.lock().len(), 1);
        assert_eq!(book.order_count(), 0);
    }

    #[tokio::test]
    async fn partial_fill_rests_remainder() {
        let p = params();
        let cb = Arc::new(Recorder::default());
        let book = Book::new(p.clone(), cb.clone());

        let bid = limit_bid(dec!(100), dec!(2.0), &p);
        book.attach_create(bid).await;

        let ask = limit_ask(dec!(100), dec!(3.0), &p);
        book.attach_create(ask).await;

        assert_eq!(cb.trades.lock().len(), 1);
        assert_eq!(book.order_count(), 1);
    }

    #[tokio::test]
    async fn no_cross_limit_rests_both_orders() {
        let p = params();
        let cb = Arc::new(Recorder::default());
        let book = Book::new(p.clone(), cb.clone());

        let ask = limit_ask(dec!(101), dec!(1.0), &p);
        book.attach_create(ask).await;
        let bid = limit_bid(dec!(99), dec!(1.0), &p);
        book.attach_create(bid).await;

        assert!(cb.trades.lock().is_empty());
        assert_eq!(book.order_count(), 2);
    }

    #[tokio::test]
    async fn cancel_resting_order_reports_residual_and_removes_it() {
        let p = params();
        let cb = Arc::new(Recorder::default());
        let book = Book::new(p.clone(), cb.clone());

        let ask = limit_ask(dec!(100), dec!(1.0), &p);
        let id = ask.id;
        book.attach_create(ask).await;

        book.attach_cancel(id).await.unwrap();

        assert_eq!(cb.cancels.lock().len(), 1);
        assert_eq!(book.order_count(), 0);
    }

    #[tokio::test]
    async fn cancel_of_never_attached_order_is_an_invariant_violation() {
        let p = params();
        let cb = Arc::new(Recorder::default());
        let book = Book::new(p, cb);

        let err = book.attach_cancel(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, InvariantError::CancelBeforeCreate(_)));
    }

    #[tokio::test]
    async fn cancel_of_already_exhausted_order_is_absorbed() {
        let p = params();
        let cb = Arc::new(Recorder::default());
        let book = Book::new(p.clone(), cb.clone());

        let bid = limit_bid(dec!(100), dec!(1.0), &p);
        let bid_id = bid.id;
        book.attach_create(bid).await;
        let ask = limit_ask(dec!(100), dec!(1.0), &p);
        book.attach_create(ask).await;

        book.attach_cancel(bid_id).await.unwrap();

        assert_eq!(cb.absorbed.lock().len(), 1);
        assert!(cb.cancels.lock().is_empty());
    }

    #[tokio::test]
    async fn market_bid_sweeps_multiple_levels_and_cancels_dust_residual() {
        let p = params();
        let cb = Arc::new(Recorder::default());
        let book = Book::new(p.clone(), cb.clone());

        book.attach_create(limit_ask(dec!(100), dec!(1.0), &p)).await;
        book.attach_create(limit_ask(dec!(110), dec!(1.0), &p)).await;
        book.attach_create(limit_ask(dec!(120), dec!(1.0), &p)).await;

        let funds_fp = FixedPoint::from_decimal(dec!(250), p.funds_precision());
        let market_bid = Order {
            id: Uuid::new_v4(),
            side: OrderSide::Bid,
            order_type: OrderType::Market,
            quote_asset: p.quote_asset,
            base_asset: p.base_asset,
            price: FixedPoint::zero(p.price_precision),
            remaining_amount: FixedPoint::zero(AMOUNT_PRECISION),
            filled_amount: FixedPoint::zero(AMOUNT_PRECISION),
            remaining_funds: funds_fp,
            filled_funds: FixedPoint::zero(p.funds_precision()),
            user_id: Uuid::new_v4(),
            broker_id: Uuid::new_v4(),
            created_at: Utc::now(),
        };
        book.attach_create(market_bid).await;

        // trades at 100 (1.0) and 110 (1.0), remaining funds 40 then a
        // partial 0.3333 @ 120 leaving a small residual refunded via cancel.
        assert_eq!(cb.trades.lock().len(), 3);
        assert_eq!(cb.cancels.lock().len(), 1);
    }
}

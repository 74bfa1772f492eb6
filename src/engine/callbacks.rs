//! Trade/cancel emission as a small interface owned by the book, not a
//! closure capturing persistence — this keeps the book unit-testable with a
//! recorder double instead of a live persistence collaborator (spec §9).

use crate::model::Order;
use crate::numeric::FixedPoint;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait MatchCallbacks: Send + Sync {
    /// One match step between `taker` and `maker`. Implementations persist
    /// the trade and enqueue its settlement transfers atomically; they must
    /// be idempotent and must retry internally on transient failure — the
    /// book awaits this call and does not proceed until it returns.
    async fn transact(
        &self,
        taker: &Order,
        maker: &Order,
        trade_amount: FixedPoint,
        trade_price: FixedPoint,
        trade_funds: FixedPoint,
    );

    /// An order (or a market-order residual) leaves the book without being
    /// fully absorbed by a trade. Persists the cancellation and enqueues the
    /// residual's refund transfer.
    async fn cancel(&self, order: &Order, residual_amount: FixedPoint, residual_funds: FixedPoint);

    /// A CANCEL action arrived for an order id the book no longer holds
    /// because it was already matched to exhaustion in this process
    /// lifetime. A no-op: the fill-exhaustion transfer already exists and
    /// transfer ids are deterministic, so nothing further is enqueued.
    async fn absorb_cancel(&self, order_id: Uuid);
}

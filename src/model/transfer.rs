use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Why a transfer is being paid out. Mirrors the `S` tag of the wire memo
/// (`TransferAction.S`): FILL, CANCEL, REFUND, MATCH.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferSource {
    /// An order's filled proceeds, released once the order is exhausted.
    OrderFilled,
    /// The residual returned when a resting order is cancelled.
    OrderCancelled,
    /// A deposit that failed validation, refunded in full minus the network fee cut.
    OrderInvalid,
    /// A single settled leg of a trade (base to the bid side, quote to the ask side).
    TradeConfirmed,
}

impl TransferSource {
    pub fn memo_tag(&self) -> &'static str {
        match self {
            TransferSource::OrderFilled => "FILL",
            TransferSource::OrderCancelled => "CANCEL",
            TransferSource::OrderInvalid => "REFUND",
            TransferSource::TradeConfirmed => "MATCH",
        }
    }
}

/// What the transfer settles: either a single order (FILL/CANCEL/REFUND) or
/// a trade's two legs (MATCH, which needs both counterparties' order ids).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDetail {
    Order(Uuid),
    Trade { ask_order_id: Uuid, bid_order_id: Uuid },
}

/// An outbound settlement instruction awaiting submission to the external
/// network. `id` is derived deterministically from `(source, detail,
/// asset_id)` so that replaying the same logical event always produces the
/// same transfer id and resubmission is a safe no-op.
#[derive(Debug, Clone)]
pub struct Transfer {
    pub id: Uuid,
    pub broker_id: Uuid,
    pub user_id: Uuid,
    pub asset_id: Uuid,
    pub amount: Decimal,
    pub source: TransferSource,
    pub detail: TransferDetail,
    pub created_at: DateTime<Utc>,
}

/// Derive a deterministic transfer id from its logical identity, so that
/// replaying the same settlement event after a restart produces the same id.
pub fn derive_transfer_id(source: TransferSource, detail: TransferDetail, asset_id: Uuid) -> Uuid {
    let mut namespace = Vec::with_capacity(48);
    namespace.extend_from_slice(source.memo_tag().as_bytes());
    match detail {
        TransferDetail::Order(id) => namespace.extend_from_slice(id.as_bytes()),
        TransferDetail::Trade { ask_order_id, bid_order_id } => {
            namespace.extend_from_slice(ask_order_id.as_bytes());
            namespace.extend_from_slice(bid_order_id.as_bytes());
        }
    }
    namespace.extend_from_slice(asset_id.as_bytes());
    Uuid::new_v5(&Uuid::NAMESPACE_OID, &namespace)
}

/// Derive a trade-leg transfer id from `(trade_id, asset_id)` alone (spec
/// §4.4: "transfer-id deterministically derived from (trade-id, asset)").
/// Kept distinct from `derive_transfer_id`'s `(source, detail, asset)` input
/// because a `TradeConfirmed` transfer's `detail` carries the ask/bid order
/// ids for the MATCH memo (spec §6), not the trade id itself — two legs of
/// the same trade must still land on different ids since they differ by
/// asset.
pub fn derive_trade_transfer_id(trade_id: Uuid, asset_id: Uuid) -> Uuid {
    let mut namespace = Vec::with_capacity(40);
    namespace.extend_from_slice(TransferSource::TradeConfirmed.memo_tag().as_bytes());
    namespace.extend_from_slice(trade_id.as_bytes());
    namespace.extend_from_slice(asset_id.as_bytes());
    Uuid::new_v5(&Uuid::NAMESPACE_OID, &namespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_id_is_deterministic() {
        let order_id = Uuid::new_v4();
        let asset = Uuid::new_v4();
        let a = derive_transfer_id(TransferSource::OrderCancelled, TransferDetail::Order(order_id), asset);
        let b = derive_transfer_id(TransferSource::OrderCancelled, TransferDetail::Order(order_id), asset);
        assert_eq!(a, b);
    }

    #[test]
    fn transfer_id_differs_by_source() {
        let order_id = Uuid::new_v4();
        let asset = Uuid::new_v4();
        let a = derive_transfer_id(TransferSource::OrderCancelled, TransferDetail::Order(order_id), asset);
        let b = derive_transfer_id(TransferSource::OrderInvalid, TransferDetail::Order(order_id), asset);
        assert_ne!(a, b);
    }

    #[test]
    fn trade_transfer_id_differs_by_asset_leg() {
        let trade_id = Uuid::new_v4();
        let base = Uuid::new_v4();
        let quote = Uuid::new_v4();
        let base_leg = derive_trade_transfer_id(trade_id, base);
        let quote_leg = derive_trade_transfer_id(trade_id, quote);
        assert_ne!(base_leg, quote_leg);
        assert_eq!(base_leg, derive_trade_transfer_id(trade_id, base));
    }
}

use crate::numeric::FixedPoint;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Ask,
    Bid,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Ask => write!(f, "ask"),
            OrderSide::Bid => write!(f, "bid"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

/// A resting or in-flight order.
///
/// ASK orders carry `remaining_amount`/`filled_amount` as the authoritative
/// fields (they sell a fixed base quantity); BID orders carry
/// `remaining_funds`/`filled_funds` as authoritative (they reserve a
/// quote-denominated spend cap). Both pairs of fields are tracked on every
/// order regardless of side because a maker's non-authoritative field still
/// needs bookkeeping when it is matched against (spec §4.2 step 7).
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quote_asset: Uuid,
    pub base_asset: Uuid,
    /// Scaled at the quote's price precision. Zero for MARKET orders.
    pub price: FixedPoint,
    /// Scaled at AMOUNT_PRECISION.
    pub remaining_amount: FixedPoint,
    pub filled_amount: FixedPoint,
    /// Scaled at the quote's funds precision (AMOUNT_PRECISION + price precision).
    pub remaining_funds: FixedPoint,
    pub filled_funds: FixedPoint,
    pub user_id: Uuid,
    pub broker_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// `true` once the order has nothing left to match and should leave the book.
    pub fn is_exhausted(&self) -> bool {
        match self.side {
            OrderSide::Ask => self.remaining_amount.is_zero(),
            OrderSide::Bid => self.remaining_funds.is_zero(),
        }
    }
}

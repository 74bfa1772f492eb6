use crate::model::order::OrderSide;
use crate::numeric::FixedPoint;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Which counterparty in a trade was resting (maker) versus incoming (taker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Liquidity {
    Maker,
    Taker,
}

/// The result of a single match step between a taker and one maker.
#[derive(Debug, Clone, Serialize)]
pub struct Trade {
    pub id: Uuid,
    pub ask_order_id: Uuid,
    pub bid_order_id: Uuid,
    pub base_amount: FixedPoint,
    pub price: FixedPoint,
    pub funds: FixedPoint,
    pub taker_side: OrderSide,
    /// Per-market sequence number, assigned by the persistence collaborator.
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
}

impl Trade {
    pub fn maker_order_id(&self) -> Uuid {
        match self.taker_side {
            OrderSide::Ask => self.bid_order_id,
            OrderSide::Bid => self.ask_order_id,
        }
    }

    pub fn taker_order_id(&self) -> Uuid {
        match self.taker_side {
            OrderSide::Ask => self.ask_order_id,
            OrderSide::Bid => self.bid_order_id,
        }
    }
}

use crate::model::order::Order;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A single item in the durable action log driving the engine. Actions are
/// the only input the engine accepts; it is otherwise stateless from the
/// persistence collaborator's point of view.
#[derive(Debug, Clone)]
pub enum Action {
    Create { order: Order },
    Cancel { order_id: Uuid, market_quote: Uuid, market_base: Uuid },
}

impl Action {
    pub fn created_at(&self, created_at: DateTime<Utc>) -> ActionRecord {
        ActionRecord { action: self.clone(), created_at }
    }
}

/// An action paired with its durable ordering key.
#[derive(Debug, Clone)]
pub struct ActionRecord {
    pub action: Action,
    pub created_at: DateTime<Utc>,
}

impl ActionRecord {
    pub fn market(&self) -> (Uuid, Uuid) {
        match &self.action {
            Action::Create { order } => (order.quote_asset, order.base_asset),
            Action::Cancel { market_quote, market_base, .. } => (*market_quote, *market_base),
        }
    }
}

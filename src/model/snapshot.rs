use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// An inbound settled deposit notification from the external network.
/// `payload` is the opaque memo the depositor attached, decoded by the
/// deposit parser into an `OrderAction`.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub snapshot_id: Uuid,
    pub amount: Decimal,
    pub asset_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub trace_id: Uuid,
    /// The broker id the deposit was sent to.
    pub user_id: Uuid,
    /// The depositing user's id, on whose behalf the order is created.
    pub opponent_id: Uuid,
    pub payload: Vec<u8>,
}

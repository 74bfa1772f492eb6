//! Wire shape of the deposit memo (`OrderAction`). Single-letter keys match
//! the asset-transfer network's memo-size constraints, mirroring the
//! original's `OrderAction` struct.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAction {
    /// Settlement public key, present only on a registration memo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub u: Option<String>,
    /// Side tag: "A" (ask) or "B" (bid). Absent on a cancel memo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<String>,
    /// The counter asset id (the asset the depositor wants, not the one deposited).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a: Option<Uuid>,
    /// Limit price, as a decimal string. Absent or ignored for market orders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
    /// Order type tag: "L" (limit) or "M" (market).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    /// Target order id, present only on a cancel memo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub o: Option<Uuid>,
}

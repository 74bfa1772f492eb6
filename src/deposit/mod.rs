//! Deposit ingestion and order-parsing layer: the deterministic translation
//! of inbound asset-transfer notifications into validated engine orders (or
//! refunds).

mod parser;
mod poller;
mod types;

pub use parser::{parse_snapshot, refund_amount, DepositOutcome};
pub use poller::{run_deposit_poller, NullSnapshotSource, SnapshotSource, DEPOSIT_CHECKPOINT_KEY};
pub use types::OrderAction;

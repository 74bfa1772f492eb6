//! Per-broker transfer poller: pulls pending transfers, builds the wire
//! memo, and submits them to the external asset-transfer network.
//!
//! Grounded on the original's `PollTransfers`/`ensureProcessTransfer`/
//! `processTransfer` loop. Submission is serialized per `(recipient, asset)`
//! through a small lock table so that two transfers to the same wallet/asset
//! never race on the network's own sequencing, without gating unrelated
//! transfers behind a single global lock.

use crate::broker::{SendOutcome, TransferSender};
use crate::config::{LOCK_TABLE_SLOTS, POLL_INTERVAL, TRANSFER_BATCH_SIZE};
use crate::model::transfer::{Transfer, TransferDetail};
use crate::model::Broker;
use crate::pipeline::persistence::PersistenceStore;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const MEMO_MAX_BYTES: usize = 140;

/// Wire shape of a transfer memo: short single-letter keys to stay inside
/// the 140-byte envelope after MessagePack + Base64 encoding.
#[derive(Debug, Serialize, Deserialize)]
struct TransferMemo {
    /// Source tag: FILL, CANCEL, REFUND, MATCH.
    s: String,
    /// Primary order id this transfer settles.
    o: Uuid,
    /// Counterparty order id, present only for MATCH transfers.
    #[serde(skip_serializing_if = "Option::is_none")]
    b: Option<Uuid>,
}

/// Encode a transfer's memo, erroring if the encoded envelope would exceed
/// the wire limit.
pub fn encode_memo(transfer: &Transfer) -> Result<String, crate::error::InvariantError> {
    let (o, b) = match transfer.detail {
        TransferDetail::Order(id) => (id, None),
        TransferDetail::Trade { ask_order_id, bid_order_id } => (ask_order_id, Some(bid_order_id)),
    };
    let memo = TransferMemo { s: transfer.source.memo_tag().to_string(), o, b };
    let packed = rmp_serde::to_vec(&memo).expect("TransferMemo always serializes");
    let encoded = BASE64.encode(packed);
    if encoded.len() > MEMO_MAX_BYTES {
        return Err(crate::error::InvariantError::MemoTooLarge(encoded.len()));
    }
    Ok(encoded)
}

/// Serializes concurrent submissions to the same `(recipient, asset)` pair
/// across all in-flight transfers for a broker, without a single global lock.
struct LockTable {
    slots: Vec<Mutex<()>>,
}

impl LockTable {
    fn new(slots: usize) -> Self {
        Self { slots: (0..slots).map(|_| Mutex::new(())).collect() }
    }

    fn slot_for(&self, recipient: Uuid, asset: Uuid) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        recipient.hash(&mut hasher);
        asset.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.slots.len();
        &self.slots[index]
    }
}

/// Runs forever, polling `broker`'s pending transfers and submitting each
/// through `sender`. Intended to be spawned once per configured broker.
pub async fn run_transfer_poller<S, T>(store: Arc<S>, sender: Arc<T>, broker: Broker)
where
    S: PersistenceStore + 'static,
    T: TransferSender + 'static,
{
    let locks = LockTable::new(LOCK_TABLE_SLOTS);

    loop {
        let pending = match store.list_pending_transfers(broker.id, TRANSFER_BATCH_SIZE).await {
            Ok(transfers) => transfers,
            Err(err) => {
                tracing::warn!(broker_id = %broker.id, error = %err, "failed to list pending transfers");
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }
        };

        let mut submitted = Vec::with_capacity(pending.len());
        for transfer in &pending {
            let memo = match encode_memo(transfer) {
                Ok(memo) => memo,
                Err(err) => {
                    tracing::error!(transfer_id = %transfer.id, error = %err, "transfer memo exceeds wire limit, skipping");
                    continue;
                }
            };

            let guard = locks.slot_for(transfer.user_id, transfer.asset_id).lock().await;
            let outcome = sender
                .send(&broker, transfer.user_id, transfer.asset_id, transfer.amount, transfer.id, &memo)
                .await;
            drop(guard);

            match outcome {
                SendOutcome::Ok => submitted.push(transfer.id),
                SendOutcome::Retry => {
                    tracing::debug!(transfer_id = %transfer.id, "transfer submission will be retried next poll");
                }
            }
        }

        if !submitted.is_empty() {
            if let Err(err) = store.mark_transfers_submitted(&submitted).await {
                tracing::warn!(broker_id = %broker.id, error = %err, "failed to mark transfers submitted");
            }
        }

        if pending.len() < TRANSFER_BATCH_SIZE as usize {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::transfer::TransferSource;
    use chrono::Utc;

    #[test]
    fn memo_round_trips_and_stays_under_limit() {
        let transfer = Transfer {
            id: Uuid::new_v4(),
            broker_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            asset_id: Uuid::new_v4(),
            amount: rust_decimal::Decimal::ONE,
            source: TransferSource::OrderCancelled,
            detail: TransferDetail::Order(Uuid::new_v4()),
            created_at: Utc::now(),
        };
        let encoded = encode_memo(&transfer).unwrap();
        assert!(encoded.len() <= MEMO_MAX_BYTES);

        let packed = BASE64.decode(encoded).unwrap();
        let decoded: TransferMemo = rmp_serde::from_slice(&packed).unwrap();
        assert_eq!(decoded.s, "CANCEL");
    }

    #[test]
    fn match_memo_carries_both_order_ids() {
        let transfer = Transfer {
            id: Uuid::new_v4(),
            broker_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            asset_id: Uuid::new_v4(),
            amount: rust_decimal::Decimal::ONE,
            source: TransferSource::TradeConfirmed,
            detail: TransferDetail::Trade { ask_order_id: Uuid::new_v4(), bid_order_id: Uuid::new_v4() },
            created_at: Utc::now(),
        };
        let encoded = encode_memo(&transfer).unwrap();
        let packed = BASE64.decode(encoded).unwrap();
        let decoded: TransferMemo = rmp_serde::from_slice(&packed).unwrap();
        assert!(decoded.b.is_some());
    }
}

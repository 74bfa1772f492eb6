//! Polls the external asset-transfer network for settled deposits, parses
//! each into an order/cancel/refund, and persists the outcome.
//!
//! Grounded on the original's `PollMixinNetwork`/`ensureProcessSnapshot`
//! loop shape (`examples/original_source/exchange/exchange.go`), translated
//! to a watermark read from `PersistenceStore` instead of an in-process
//! Go-channel checkpoint.

use crate::config::{ExchangeConfig, POLL_INTERVAL};
use crate::deposit::parser::{parse_snapshot, refund_amount, DepositOutcome};
use crate::model::snapshot::Snapshot;
use crate::model::transfer::{derive_transfer_id, Transfer, TransferDetail, TransferSource};
use crate::pipeline::persistence::PersistenceStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// The deposit poller's persisted watermark, named after the property key
/// the original uses for its Mixin-network snapshot checkpoint.
pub const DEPOSIT_CHECKPOINT_KEY: &str = "exchange-checkpoint-mixin-network-snapshots";

const SNAPSHOT_BATCH_SIZE: i64 = 500;

/// Contract-level access to the external network's settled-deposit feed.
/// The concrete transport (HTTP poll against a specific network API) is a
/// Non-goal; this is the interface the deposit poller consumes.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn list_snapshots(&self, checkpoint: DateTime<Utc>, limit: i64) -> Result<Vec<Snapshot>, crate::error::TransientError>;
}

/// Always reports an empty page. Stands in for a concrete network poller in
/// the demo binary, so the deposit-poller task has something to run against
/// without a live asset-transfer network connection.
pub struct NullSnapshotSource;

#[async_trait]
impl SnapshotSource for NullSnapshotSource {
    async fn list_snapshots(&self, _checkpoint: DateTime<Utc>, _limit: i64) -> Result<Vec<Snapshot>, crate::error::TransientError> {
        Ok(Vec::new())
    }
}

/// Runs forever: polls `source` for snapshots after the persisted watermark,
/// parses and persists each one, then advances the watermark. A snapshot
/// already seen in this process lifetime (the in-memory `dedupe` set) is
/// skipped without a second persistence round-trip; cross-restart dedupe
/// relies on `create_order_action`'s order-id uniqueness instead (spec §4.5).
pub async fn run_deposit_poller<S>(store: Arc<S>, source: Arc<dyn SnapshotSource>, config: Arc<ExchangeConfig>)
where
    S: PersistenceStore + 'static,
{
    let our_brokers: HashSet<Uuid> = config.brokers.iter().map(|b| b.broker_id).collect();
    let dedupe: DashSet<Uuid> = DashSet::new();
    let mut checkpoint = load_checkpoint(store.as_ref()).await;

    loop {
        let page = match source.list_snapshots(checkpoint, SNAPSHOT_BATCH_SIZE).await {
            Ok(page) => page,
            Err(err) => {
                tracing::warn!(error = %err, "failed to list network snapshots");
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }
        };

        if page.is_empty() {
            tokio::time::sleep(POLL_INTERVAL).await;
            continue;
        }

        let mut last_created_at = checkpoint;
        for snapshot in &page {
            if !dedupe.insert(snapshot.snapshot_id) {
                last_created_at = snapshot.created_at;
                continue;
            }

            process_snapshot(store.as_ref(), &config, &our_brokers, snapshot).await;
            last_created_at = snapshot.created_at;
        }

        checkpoint = last_created_at;
        if let Err(err) = store.write_property(DEPOSIT_CHECKPOINT_KEY, &checkpoint.to_rfc3339()).await {
            tracing::warn!(error = %err, "failed to persist deposit-poll checkpoint");
        }

        if page.len() < SNAPSHOT_BATCH_SIZE as usize {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

/// One snapshot's worth of §4.5, retried with `POLL_INTERVAL` backoff on
/// transient persistence failure — never dropped, per spec §7.
async fn process_snapshot<S: PersistenceStore>(store: &S, config: &ExchangeConfig, our_brokers: &HashSet<Uuid>, snapshot: &Snapshot) {
    let outcome = parse_snapshot(snapshot, config, our_brokers);

    loop {
        let result = match &outcome {
            DepositOutcome::Ignore => Ok(()),
            DepositOutcome::CreateOrder(order) => store.append_create_action(order.clone(), snapshot.created_at).await,
            DepositOutcome::CancelOrder { order_id, opponent_id } => {
                // The market for a cancel is resolved from the order's own
                // CREATE record by the persistence collaborator; the action
                // log entry here only needs to name the order and its owner.
                store.append_cancel_action(*order_id, *opponent_id, snapshot.created_at).await
            }
            DepositOutcome::PublicKeyRegistered { user_id, public_key } => {
                store.update_user_public_key(*user_id, public_key).await
            }
            DepositOutcome::Refund => {
                let amount = refund_amount(snapshot.amount);
                let id = derive_transfer_id(TransferSource::OrderInvalid, TransferDetail::Order(snapshot.trace_id), snapshot.asset_id);
                let transfer = Transfer {
                    id,
                    broker_id: snapshot.user_id,
                    user_id: snapshot.opponent_id,
                    asset_id: snapshot.asset_id,
                    amount,
                    source: TransferSource::OrderInvalid,
                    detail: TransferDetail::Order(snapshot.trace_id),
                    created_at: Utc::now(),
                };
                store.create_refund_transfer(transfer).await
            }
        };

        if result.is_ok() {
            return;
        }
        tracing::warn!(snapshot_id = %snapshot.snapshot_id, "failed to persist deposit outcome, retrying");
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn load_checkpoint<S: PersistenceStore>(store: &S) -> DateTime<Utc> {
    match store.read_property(DEPOSIT_CHECKPOINT_KEY).await {
        Ok(Some(prop)) => DateTime::parse_from_rfc3339(&prop.value)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::MIN_UTC),
        _ => DateTime::<Utc>::MIN_UTC,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QuoteParams;
    use crate::pipeline::persistence::MemoryStore;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn config_with_broker(broker: Uuid, quote: Uuid) -> ExchangeConfig {
        let mut quotes = HashMap::new();
        quotes.insert(quote, QuoteParams { price_precision: 8, min_notional: dec!(0.0001) });
        ExchangeConfig {
            environment: "test".into(),
            quotes,
            excluded_pairs: HashSet::new(),
            brokers: vec![crate::config::BrokerConfig { broker_id: broker, label: "b".into() }],
        }
    }

    #[tokio::test]
    async fn invalid_deposit_enqueues_refund_at_the_spec_ratio() {
        let store = Arc::new(MemoryStore::new());
        let broker = Uuid::new_v4();
        let config = Arc::new(config_with_broker(broker, Uuid::new_v4()));
        let our_brokers: HashSet<Uuid> = config.brokers.iter().map(|b| b.broker_id).collect();

        let snapshot = Snapshot {
            snapshot_id: Uuid::new_v4(),
            amount: dec!(10),
            asset_id: Uuid::new_v4(),
            created_at: Utc::now(),
            trace_id: Uuid::new_v4(),
            user_id: broker,
            opponent_id: Uuid::new_v4(),
            payload: b"garbage".to_vec(),
        };

        process_snapshot(store.as_ref(), &config, &our_brokers, &snapshot).await;

        let transfers = store.list_pending_transfers(broker, 10).await.unwrap();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].amount, dec!(9.990));
        assert_eq!(
            transfers[0].id,
            derive_transfer_id(TransferSource::OrderInvalid, TransferDetail::Order(snapshot.trace_id), snapshot.asset_id)
        );
    }
}

//! Broker/transfer-sender contract (spec §4.6).
//!
//! The engine depends only on this trait, never on a concrete network
//! client: broker credential management (session keys, PIN encryption, RSA)
//! is explicitly out of scope. `Broker` is an opaque handle the contract
//! methods receive.

use crate::model::Broker;
use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Outcome of attempting to submit a single outbound transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The network accepted the transfer (or it was already present, since
    /// submission is idempotent by trace id).
    Ok,
    /// A transient failure; the caller should retry after `POLL_INTERVAL`.
    Retry,
}

/// Serializes outbound payments to the external asset-transfer network.
#[async_trait]
pub trait TransferSender: Send + Sync {
    /// Submit one outbound payment. `memo` is the already-encoded,
    /// already-size-checked wire payload (MessagePack + Base64, ≤140 bytes).
    /// Resubmission with the same `trace_id` must be a no-op on the network.
    async fn send(
        &self,
        broker: &Broker,
        recipient: Uuid,
        asset: Uuid,
        amount: Decimal,
        trace_id: Uuid,
        memo: &str,
    ) -> SendOutcome;
}

/// Logs every outbound transfer instead of submitting it anywhere. Stands in
/// for a concrete network client in the demo binary and in tests, the way
/// the teacher's `CacheManager` degrades to a no-op when Redis is
/// unavailable rather than special-casing its absence at every call site.
pub struct LoggingTransferSender;

#[async_trait]
impl TransferSender for LoggingTransferSender {
    async fn send(
        &self,
        broker: &Broker,
        recipient: Uuid,
        asset: Uuid,
        amount: Decimal,
        trace_id: Uuid,
        memo: &str,
    ) -> SendOutcome {
        tracing::info!(
            broker_id = %broker.id,
            %recipient,
            %asset,
            %amount,
            %trace_id,
            memo,
            "submitting transfer to external network"
        );
        SendOutcome::Ok
    }
}

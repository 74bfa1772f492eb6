//! Error taxonomy for the engine, pipeline, and deposit layers.
//!
//! Three kinds per spec §7: validation errors are recoverable by refunding
//! the triggering deposit and never reach the engine; persistence/network
//! errors are transient and retried with backoff; invariant violations are
//! fatal and must stop the process rather than silently corrupt state.

use thiserror::Error;
use uuid::Uuid;

/// Errors raised while validating and parsing a deposit snapshot into an
/// order or refund. Every variant here ends in a refund, never in the
/// snapshot being silently dropped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("memo payload is not valid MessagePack")]
    MalformedMemo,
    #[error("order type tag {0:?} is not L or M")]
    UnknownOrderType(String),
    #[error("order side tag {0:?} is not A or B")]
    UnknownSide(String),
    #[error("quote asset {0} is not in the permitted quote set")]
    QuoteNotPermitted(Uuid),
    #[error("pair (quote={quote}, base={base}) is an excluded orientation")]
    ExcludedPair { quote: Uuid, base: Uuid },
    #[error("base and quote asset must differ")]
    BaseEqualsQuote,
    #[error("limit order price must be positive")]
    NonPositiveLimitPrice,
    #[error("market order must carry a zero price")]
    NonZeroMarketPrice,
    #[error("bid funds below minimum notional for quote asset")]
    FundsBelowMinimum,
    #[error("ask notional (price * amount) below minimum notional for quote asset")]
    NotionalBelowMinimum,
    #[error("numeric value out of bounds: {0}")]
    OutOfBounds(&'static str),
}

/// Errors from the persistence and transfer-sender collaborators. Always
/// retried with `POLL_INTERVAL` backoff; never causes a dropped action or
/// transfer.
#[derive(Debug, Error)]
pub enum TransientError {
    #[error("persistence unavailable: {0}")]
    Persistence(String),
    #[error("transfer network call failed: {0}")]
    Network(String),
}

/// Fatal errors. The process must stop rather than continue with
/// potentially corrupted state.
#[derive(Debug, Error)]
pub enum InvariantError {
    #[error("cancel received for order {0} that was never attached and has no recorded residual")]
    CancelBeforeCreate(Uuid),
    #[error("trade callback invoked with zero trade amount")]
    ZeroAmountTrade,
    #[error("transfer source {0:?} is not a recognized TransferAction source")]
    UnknownTransferSource(String),
    #[error("encoded memo exceeds the 140-byte limit ({0} bytes)")]
    MemoTooLarge(usize),
    #[error("action log returned actions out of (created_at, action_id) order")]
    OutOfOrderActionLog,
}

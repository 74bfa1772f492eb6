/// An opaque key/value entry used only for engine checkpoints (the deposit
/// poller's watermark). Ownership split per spec §3: the pipeline owns
/// transfers and actions, the engine owns the in-memory books, and the
/// property store holds only the deposit watermark.
#[derive(Debug, Clone)]
pub struct Property {
    pub key: String,
    pub value: String,
}

/// Well-known property key for the deposit poller's watermark.
pub const DEPOSIT_CHECKPOINT_KEY: &str = "deposit-poll-checkpoint";

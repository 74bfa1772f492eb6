use crate::config::AMOUNT_PRECISION;
use crate::numeric::FixedPoint;
use uuid::Uuid;

/// Pricing parameters for one market (a single quote/base pair), derived
/// from the quote asset's configured precision and minimum notional.
#[derive(Debug, Clone, Copy)]
pub struct MarketParams {
    pub quote_asset: Uuid,
    pub base_asset: Uuid,
    pub price_precision: u32,
    /// Minimum notional (in funds-precision units) below which a resting
    /// order's residual is dust and must be cancelled rather than left open.
    pub min_notional: FixedPoint,
}

impl MarketParams {
    pub fn funds_precision(&self) -> u32 {
        AMOUNT_PRECISION + self.price_precision
    }
}

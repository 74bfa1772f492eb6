//! Deterministic translation of an inbound network snapshot into an engine
//! order, a cancel, a public-key registration, or a refund.
//!
//! Grounded on the original's `processSnapshot`/`decryptOrderAction`/
//! `getQuoteBasePair` (`examples/original_source/exchange/mixin.go`),
//! reimplemented as a pure function returning an outcome enum instead of the
//! Go version's persist-then-return-nil control flow.

use crate::config::{ExchangeConfig, AMOUNT_PRECISION, MAX_AMOUNT, MAX_FUNDS, MAX_PRICE};
use crate::deposit::types::OrderAction;
use crate::error::ValidationError;
use crate::model::order::{Order, OrderSide, OrderType};
use crate::model::snapshot::Snapshot;
use crate::numeric::FixedPoint;
use base64::Engine;
use rust_decimal::Decimal;
use std::collections::HashSet;
use uuid::Uuid;

/// What a snapshot resolves to once steps 1-9 of spec §4.5 have run.
#[derive(Debug, Clone)]
pub enum DepositOutcome {
    CreateOrder(Order),
    CancelOrder { order_id: Uuid, opponent_id: Uuid },
    /// A memo whose `U` field is longer than 16 bytes is not an order at
    /// all: it registers a withdrawal public key for the depositing user.
    PublicKeyRegistered { user_id: Uuid, public_key: String },
    /// Validation failed somewhere past memo-decode; the deposit is refunded
    /// at `refund_ratio()` rather than silently dropped.
    Refund,
    /// Not addressed to one of our brokers, or missing required routing
    /// fields. Not our money to refund.
    Ignore,
}

/// Steps 1-11 of spec §4.5. `our_brokers` is the configured broker id set
/// (step 1: "if user-id is not one of our broker ids, ignore").
pub fn parse_snapshot(snapshot: &Snapshot, config: &ExchangeConfig, our_brokers: &HashSet<Uuid>) -> DepositOutcome {
    if !our_brokers.contains(&snapshot.user_id) {
        return DepositOutcome::Ignore;
    }
    if snapshot.opponent_id.is_nil() || snapshot.trace_id.is_nil() {
        return DepositOutcome::Ignore;
    }
    if snapshot.amount <= Decimal::ZERO {
        return DepositOutcome::Ignore;
    }

    let action = match decode_memo(&snapshot.payload) {
        Some(action) => action,
        None => return DepositOutcome::Refund,
    };

    if let Some(public_key) = &action.u {
        if public_key.len() > 16 {
            return DepositOutcome::PublicKeyRegistered {
                user_id: snapshot.opponent_id,
                public_key: public_key.clone(),
            };
        }
    }

    if let Some(order_id) = action.o {
        if !order_id.is_nil() {
            return DepositOutcome::CancelOrder { order_id, opponent_id: snapshot.opponent_id };
        }
    }

    match build_create_order(snapshot, &action, config) {
        Ok(order) => DepositOutcome::CreateOrder(order),
        Err(err) => {
            tracing::debug!(trace_id = %snapshot.trace_id, error = %err, "deposit failed validation, refunding");
            DepositOutcome::Refund
        }
    }
}

/// The wire memo is MessagePack, Base64-wrapped (std or URL-safe — spec §6
/// allows either). Any failure at any stage is a decode failure, which the
/// caller turns into a refund rather than a panic.
fn decode_memo(payload: &[u8]) -> Option<OrderAction> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(payload))
        .ok()?;
    rmp_serde::from_slice(&bytes).ok()
}

fn build_create_order(snapshot: &Snapshot, action: &OrderAction, config: &ExchangeConfig) -> Result<Order, ValidationError> {
    let order_type = match action.t.as_deref() {
        Some("L") => OrderType::Limit,
        Some("M") => OrderType::Market,
        other => return Err(ValidationError::UnknownOrderType(other.unwrap_or("").to_string())),
    };
    let side = match action.s.as_deref() {
        Some("A") => OrderSide::Ask,
        Some("B") => OrderSide::Bid,
        other => return Err(ValidationError::UnknownSide(other.unwrap_or("").to_string())),
    };
    let counter_asset = action.a.ok_or(ValidationError::OutOfBounds("missing counter asset"))?;

    let (quote, base) = match side {
        OrderSide::Ask => (counter_asset, snapshot.asset_id),
        OrderSide::Bid => (snapshot.asset_id, counter_asset),
    };
    if quote == base {
        return Err(ValidationError::BaseEqualsQuote);
    }
    let quote_params = config
        .quotes
        .get(&quote)
        .ok_or(ValidationError::QuoteNotPermitted(quote))?;
    if config.excluded_pairs.contains(&(quote, base)) {
        return Err(ValidationError::ExcludedPair { quote, base });
    }

    let price_text = action.p.as_deref().unwrap_or("0");
    let price_decimal: Decimal = price_text
        .parse()
        .map_err(|_| ValidationError::OutOfBounds("price is not a valid decimal"))?;
    if price_decimal > Decimal::from(MAX_PRICE) || price_decimal.is_sign_negative() {
        return Err(ValidationError::OutOfBounds("price"));
    }
    let price = FixedPoint::from_decimal(price_decimal, quote_params.price_precision);

    match order_type {
        OrderType::Limit if price.is_zero() => return Err(ValidationError::NonPositiveLimitPrice),
        OrderType::Market if !price.is_zero() => return Err(ValidationError::NonZeroMarketPrice),
        _ => {}
    }

    let funds_precision = quote_params.funds_precision();
    let (remaining_amount, remaining_funds) = match side {
        OrderSide::Bid => {
            if snapshot.amount > Decimal::from(MAX_FUNDS) {
                return Err(ValidationError::OutOfBounds("funds"));
            }
            let funds = FixedPoint::from_decimal(snapshot.amount, funds_precision);
            if funds.to_decimal() < quote_params.min_notional {
                return Err(ValidationError::FundsBelowMinimum);
            }
            (FixedPoint::zero(AMOUNT_PRECISION), funds)
        }
        OrderSide::Ask => {
            if snapshot.amount > Decimal::from(MAX_AMOUNT) {
                return Err(ValidationError::OutOfBounds("amount"));
            }
            let amount = FixedPoint::from_decimal(snapshot.amount, AMOUNT_PRECISION);
            if order_type == OrderType::Limit {
                let notional = price.mul(&amount).rescale(funds_precision);
                if notional.to_decimal() < quote_params.min_notional {
                    return Err(ValidationError::NotionalBelowMinimum);
                }
            }
            (amount, FixedPoint::zero(funds_precision))
        }
    };

    Ok(Order {
        id: snapshot.trace_id,
        side,
        order_type,
        quote_asset: quote,
        base_asset: base,
        price,
        remaining_amount,
        filled_amount: FixedPoint::zero(AMOUNT_PRECISION),
        remaining_funds,
        filled_funds: FixedPoint::zero(funds_precision),
        user_id: snapshot.opponent_id,
        broker_id: snapshot.user_id,
        created_at: snapshot.created_at,
    })
}

/// `refund_amount = 0.999 × deposit_amount` (spec §4.5 step 10). The 0.1%
/// covers the outbound network fee on the refund transfer itself.
pub fn refund_amount(deposit_amount: Decimal) -> Decimal {
    deposit_amount * crate::config::refund_ratio()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QuoteParams;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::collections::{HashMap, HashSet};

    fn config_with_quote(quote: Uuid) -> ExchangeConfig {
        let mut quotes = HashMap::new();
        quotes.insert(quote, QuoteParams { price_precision: 8, min_notional: dec!(0.0001) });
        ExchangeConfig {
            environment: "test".into(),
            quotes,
            excluded_pairs: HashSet::new(),
            brokers: vec![],
        }
    }

    fn encode(action: &OrderAction) -> Vec<u8> {
        let packed = rmp_serde::to_vec(action).unwrap();
        base64::engine::general_purpose::STANDARD.encode(packed).into_bytes()
    }

    fn snapshot(user_id: Uuid, asset_id: Uuid, amount: Decimal, payload: Vec<u8>) -> Snapshot {
        Snapshot {
            snapshot_id: Uuid::new_v4(),
            amount,
            asset_id,
            created_at: Utc::now(),
            trace_id: Uuid::new_v4(),
            user_id,
            opponent_id: Uuid::new_v4(),
            payload,
        }
    }

    #[test]
    fn ignores_snapshot_not_addressed_to_our_broker() {
        let broker = Uuid::new_v4();
        let config = config_with_quote(Uuid::new_v4());
        let snap = snapshot(Uuid::new_v4(), Uuid::new_v4(), dec!(1), vec![]);
        let mut ours = HashSet::new();
        ours.insert(broker);
        assert!(matches!(parse_snapshot(&snap, &config, &ours), DepositOutcome::Ignore));
    }

    #[test]
    fn malformed_memo_triggers_refund_not_drop() {
        let broker = Uuid::new_v4();
        let config = config_with_quote(Uuid::new_v4());
        let snap = snapshot(broker, Uuid::new_v4(), dec!(1), b"not valid msgpack".to_vec());
        let mut ours = HashSet::new();
        ours.insert(broker);
        assert!(matches!(parse_snapshot(&snap, &config, &ours), DepositOutcome::Refund));
    }

    #[test]
    fn long_u_field_registers_public_key_instead_of_creating_an_order() {
        let broker = Uuid::new_v4();
        let config = config_with_quote(Uuid::new_v4());
        let action = OrderAction {
            u: Some("a-very-long-public-key-over-sixteen-bytes".to_string()),
            s: None,
            a: None,
            p: None,
            t: None,
            o: None,
        };
        let snap = snapshot(broker, Uuid::new_v4(), dec!(1), encode(&action));
        let mut ours = HashSet::new();
        ours.insert(broker);
        match parse_snapshot(&snap, &config, &ours) {
            DepositOutcome::PublicKeyRegistered { public_key, .. } => assert_eq!(public_key, action.u.unwrap()),
            other => panic!("expected PublicKeyRegistered, got {other:?}"),
        }
    }

    #[test]
    fn nil_order_cancel_field_is_ignored_as_an_order_field() {
        let broker = Uuid::new_v4();
        let quote = Uuid::new_v4();
        let config = config_with_quote(quote);
        let action = OrderAction {
            u: None,
            s: Some("A".to_string()),
            a: Some(quote),
            p: Some("100".to_string()),
            t: Some("L".to_string()),
            o: Some(Uuid::nil()),
        };
        let snap = snapshot(broker, Uuid::new_v4(), dec!(1), encode(&action));
        let mut ours = HashSet::new();
        ours.insert(broker);
        assert!(matches!(parse_snapshot(&snap, &config, &ours), DepositOutcome::CreateOrder(_)));
    }

    #[test]
    fn non_nil_order_field_is_a_cancel() {
        let broker = Uuid::new_v4();
        let config = config_with_quote(Uuid::new_v4());
        let target = Uuid::new_v4();
        let action = OrderAction { u: None, s: None, a: None, p: None, t: None, o: Some(target) };
        let snap = snapshot(broker, Uuid::new_v4(), dec!(1), encode(&action));
        let mut ours = HashSet::new();
        ours.insert(broker);
        match parse_snapshot(&snap, &config, &ours) {
            DepositOutcome::CancelOrder { order_id, .. } => assert_eq!(order_id, target),
            other => panic!("expected CancelOrder, got {other:?}"),
        }
    }

    #[test]
    fn excluded_pair_orientation_refunds() {
        let broker = Uuid::new_v4();
        let btc = Uuid::new_v4();
        let usdt = Uuid::new_v4();
        let mut quotes = HashMap::new();
        quotes.insert(btc, QuoteParams { price_precision: 8, min_notional: dec!(0.0001) });
        quotes.insert(usdt, QuoteParams { price_precision: 4, min_notional: dec!(1) });
        let mut excluded_pairs = HashSet::new();
        excluded_pairs.insert((btc, usdt));
        let config = ExchangeConfig { environment: "test".into(), quotes, excluded_pairs, brokers: vec![] };

        // ASK selling USDT for BTC: quote=btc (from action.a), base=usdt (snapshot asset).
        let action = OrderAction { u: None, s: Some("A".to_string()), a: Some(btc), p: Some("1".to_string()), t: Some("L".to_string()), o: None };
        let snap = snapshot(broker, usdt, dec!(10), encode(&action));
        let mut ours = HashSet::new();
        ours.insert(broker);
        assert!(matches!(parse_snapshot(&snap, &config, &ours), DepositOutcome::Refund));
    }

    #[test]
    fn refund_amount_applies_the_spec_ratio() {
        assert_eq!(refund_amount(dec!(100)), dec!(99.900));
    }

    #[test]
    fn bid_funds_below_minimum_refunds() {
        let broker = Uuid::new_v4();
        let quote = Uuid::new_v4();
        let mut quotes = HashMap::new();
        quotes.insert(quote, QuoteParams { price_precision: 4, min_notional: dec!(1) });
        let config = ExchangeConfig { environment: "test".into(), quotes, excluded_pairs: HashSet::new(), brokers: vec![] };
        let base = Uuid::new_v4();
        let action = OrderAction { u: None, s: Some("B".to_string()), a: Some(base), p: Some("100".to_string()), t: Some("L".to_string()), o: None };
        let snap = snapshot(broker, quote, dec!(0.01), encode(&action));
        let mut ours = HashSet::new();
        ours.insert(broker);
        assert!(matches!(parse_snapshot(&snap, &config, &ours), DepositOutcome::Refund));
    }

    #[test]
    fn bid_funds_above_maximum_refunds() {
        let broker = Uuid::new_v4();
        let quote = Uuid::new_v4();
        let mut quotes = HashMap::new();
        quotes.insert(quote, QuoteParams { price_precision: 4, min_notional: dec!(1) });
        let config = ExchangeConfig { environment: "test".into(), quotes, excluded_pairs: HashSet::new(), brokers: vec![] };
        let base = Uuid::new_v4();
        let action = OrderAction { u: None, s: Some("B".to_string()), a: Some(base), p: Some("100".to_string()), t: Some("L".to_string()), o: None };
        let snap = snapshot(broker, quote, dec!(6_000_000_000_000_000_000), encode(&action));
        let mut ours = HashSet::new();
        ours.insert(broker);
        assert!(matches!(parse_snapshot(&snap, &config, &ours), DepositOutcome::Refund));
    }
}

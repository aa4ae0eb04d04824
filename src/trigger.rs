//! Pure trigger evaluation. Everything here is side-effect free given
//! `(order, current price, now)` so the scheduler can fan evaluation out
//! without ordering concerns and tests can enumerate the boundaries.
//!
//! Equality always triggers (`>=`/`<=`, never strict). A missing price
//! never triggers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::order::{Activation, ScheduledOrder, Side, TpSlKind, TpSlOrder, TriggerCondition};

/// Whether a scheduled order's activation condition is satisfied.
///
/// Time-mode orders ignore `price`; price-mode orders ignore `now`.
pub fn scheduled_order_ready(
    order: &ScheduledOrder,
    price: Option<Decimal>,
    now: DateTime<Utc>,
) -> bool {
    match order.activation {
        Activation::Time { at } => now >= at,
        Activation::Price {
            trigger_price,
            condition,
        } => match price {
            Some(current) => match condition {
                TriggerCondition::Above => current >= trigger_price,
                TriggerCondition::Below => current <= trigger_price,
            },
            None => false,
        },
    }
}

/// Whether a take-profit/stop-loss exit's condition is satisfied.
///
/// The trigger direction is derived from `(kind, side)`:
///
/// | kind        | side  | ready condition        |
/// |-------------|-------|------------------------|
/// | take_profit | long  | price >= trigger_price |
/// | take_profit | short | price <= trigger_price |
/// | stop_loss   | long  | price <= trigger_price |
/// | stop_loss   | short | price >= trigger_price |
pub fn tpsl_ready(order: &TpSlOrder, price: Option<Decimal>) -> bool {
    let Some(current) = price else {
        return false;
    };

    match (order.kind, order.side) {
        (TpSlKind::TakeProfit, Side::Long) | (TpSlKind::StopLoss, Side::Short) => {
            current >= order.trigger_price
        }
        (TpSlKind::TakeProfit, Side::Short) | (TpSlKind::StopLoss, Side::Long) => {
            current <= order.trigger_price
        }
    }
}

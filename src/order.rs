//! Domain model for conditional orders: scheduled entries awaiting a time
//! or price condition, and take-profit/stop-loss exits bound to open
//! positions. Status transitions are owned by the external execution
//! command; this crate only reads and evaluates these records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt::Display;
use std::str::FromStr;

/// Raised when a database TEXT code does not map onto a domain enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {kind} code: {value}")]
pub struct InvalidCode {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! str_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $code:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $code,)+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = InvalidCode;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($code => Ok(Self::$variant),)+
                    _ => Err(InvalidCode { kind: $kind, value: s.to_string() }),
                }
            }
        }
    };
}

str_enum!(Side, "side", {
    Long => "long",
    Short => "short",
});

str_enum!(OrderKind, "order kind", {
    Market => "market",
    Limit => "limit",
});

str_enum!(TriggerCondition, "trigger condition", {
    Above => "above",
    Below => "below",
});

str_enum!(TpSlKind, "tp/sl kind", {
    TakeProfit => "take_profit",
    StopLoss => "stop_loss",
});

str_enum!(ScheduledOrderStatus, "scheduled order status", {
    Pending => "pending",
    Watching => "watching",
    Executing => "executing",
    Executed => "executed",
    Failed => "failed",
    Cancelled => "cancelled",
});

str_enum!(TpSlStatus, "tp/sl status", {
    Active => "active",
    Executing => "executing",
    Executed => "executed",
    Failed => "failed",
    Cancelled => "cancelled",
});

/// How a scheduled order becomes live. Exactly one mode per order; an order
/// cannot be eligible under both a time and a price condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Time {
        at: DateTime<Utc>,
    },
    Price {
        trigger_price: Decimal,
        condition: TriggerCondition,
    },
}

/// An order intent not yet live in the market.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledOrder {
    pub id: i64,
    pub room_id: i64,
    pub user_id: i64,
    pub symbol: String,
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: Decimal,
    pub limit_price: Option<Decimal>,
    pub leverage: u32,
    pub activation: Activation,
    /// Exit intents carried through to the position created on execution.
    /// Not evaluated by this engine.
    pub take_profit_price: Option<Decimal>,
    pub stop_loss_price: Option<Decimal>,
    pub status: ScheduledOrderStatus,
}

/// An exit intent bound to an already-open position. `side` is inherited
/// from the position at read time; the trigger direction is derived from
/// `(kind, side)` and never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct TpSlOrder {
    pub id: i64,
    pub position_id: i64,
    pub room_id: i64,
    pub user_id: i64,
    pub kind: TpSlKind,
    pub side: Side,
    pub quantity: Decimal,
    pub trigger_price: Decimal,
    /// Explicit order price for limit-style exits.
    pub order_price: Option<Decimal>,
    pub status: TpSlStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_round_trips_through_str() {
        assert_eq!("long".parse::<Side>().unwrap(), Side::Long);
        assert_eq!("short".parse::<Side>().unwrap(), Side::Short);
        assert_eq!(Side::Long.as_str(), "long");
        assert_eq!(Side::Short.to_string(), "short");
    }

    #[test]
    fn unknown_code_is_rejected() {
        let err = "sideways".parse::<Side>().unwrap_err();
        assert_eq!(err.kind, "side");
        assert_eq!(err.value, "sideways");

        "limit_if_touched".parse::<OrderKind>().unwrap_err();
        "between".parse::<TriggerCondition>().unwrap_err();
        "trailing_stop".parse::<TpSlKind>().unwrap_err();
    }

    #[test]
    fn status_codes_match_storage_contract() {
        for (code, status) in [
            ("pending", ScheduledOrderStatus::Pending),
            ("watching", ScheduledOrderStatus::Watching),
            ("executing", ScheduledOrderStatus::Executing),
            ("executed", ScheduledOrderStatus::Executed),
            ("failed", ScheduledOrderStatus::Failed),
            ("cancelled", ScheduledOrderStatus::Cancelled),
        ] {
            assert_eq!(code.parse::<ScheduledOrderStatus>().unwrap(), status);
            assert_eq!(status.as_str(), code);
        }

        assert_eq!("active".parse::<TpSlStatus>().unwrap(), TpSlStatus::Active);
        assert_eq!(TpSlStatus::Active.as_str(), "active");
    }
}

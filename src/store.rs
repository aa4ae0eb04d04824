//! Order repository gateway. Read-only: the engine lists candidates and
//! lets the external execution command own every status transition, so
//! this layer stays free of business logic.
//!
//! A malformed row (unknown status code, unparseable decimal, trigger
//! price without a condition) is logged and skipped rather than failing
//! the listing; it simply counts as "not ready this tick".

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::warn;

use crate::error::StoreError;
use crate::order::{
    Activation, OrderKind, ScheduledOrder, ScheduledOrderStatus, Side, TpSlKind, TpSlOrder,
    TpSlStatus,
};

#[async_trait]
pub trait OrderStore: Send + Sync + 'static {
    /// Time-mode orders in `pending` whose due time is at or before `now`.
    async fn due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledOrder>, StoreError>;

    /// Price-mode orders in `watching`.
    async fn watching_scheduled(&self) -> Result<Vec<ScheduledOrder>, StoreError>;

    /// Active exit orders, each paired with its position's symbol.
    async fn active_tpsl(&self) -> Result<Vec<(TpSlOrder, String)>, StoreError>;
}

#[derive(Debug, Clone)]
pub struct SqliteOrderStore {
    pool: SqlitePool,
}

impl SqliteOrderStore {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ScheduledOrderRow {
    id: i64,
    room_id: i64,
    user_id: i64,
    symbol: String,
    side: String,
    kind: String,
    quantity: String,
    limit_price: Option<String>,
    leverage: i64,
    activation: String,
    scheduled_at: Option<DateTime<Utc>>,
    trigger_price: Option<String>,
    trigger_condition: Option<String>,
    take_profit_price: Option<String>,
    stop_loss_price: Option<String>,
    status: String,
}

#[derive(Debug, sqlx::FromRow)]
struct TpSlOrderRow {
    id: i64,
    position_id: i64,
    room_id: i64,
    user_id: i64,
    kind: String,
    side: String,
    symbol: String,
    quantity: String,
    trigger_price: String,
    order_price: Option<String>,
    status: String,
}

fn parse_decimal(value: &str, id: i64, field: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(value).map_err(|e| StoreError::MalformedRow {
        id,
        reason: format!("{field} {value:?}: {e}"),
    })
}

fn parse_code<T>(value: &str, id: i64) -> Result<T, StoreError>
where
    T: FromStr<Err = crate::order::InvalidCode>,
{
    value.parse::<T>().map_err(|e| StoreError::MalformedRow {
        id,
        reason: e.to_string(),
    })
}

impl TryFrom<ScheduledOrderRow> for ScheduledOrder {
    type Error = StoreError;

    fn try_from(row: ScheduledOrderRow) -> Result<Self, Self::Error> {
        let id = row.id;

        let activation = match row.activation.as_str() {
            "time" => {
                let at = row.scheduled_at.ok_or_else(|| StoreError::MalformedRow {
                    id,
                    reason: "time activation without scheduled_at".to_string(),
                })?;
                Activation::Time { at }
            }
            "price" => {
                // The invariant: trigger_price and trigger_condition travel
                // together, and a watching order always has both.
                let (Some(price), Some(condition)) = (&row.trigger_price, &row.trigger_condition)
                else {
                    return Err(StoreError::MalformedRow {
                        id,
                        reason: "price activation without trigger price and condition".to_string(),
                    });
                };
                Activation::Price {
                    trigger_price: parse_decimal(price, id, "trigger_price")?,
                    condition: parse_code(condition, id)?,
                }
            }
            other => {
                return Err(StoreError::MalformedRow {
                    id,
                    reason: format!("unknown activation mode {other:?}"),
                });
            }
        };

        Ok(Self {
            id,
            room_id: row.room_id,
            user_id: row.user_id,
            symbol: row.symbol,
            side: parse_code::<Side>(&row.side, id)?,
            kind: parse_code::<OrderKind>(&row.kind, id)?,
            quantity: parse_decimal(&row.quantity, id, "quantity")?,
            limit_price: row
                .limit_price
                .as_deref()
                .map(|p| parse_decimal(p, id, "limit_price"))
                .transpose()?,
            leverage: u32::try_from(row.leverage).map_err(|_| StoreError::MalformedRow {
                id,
                reason: format!("leverage out of range: {}", row.leverage),
            })?,
            activation,
            take_profit_price: row
                .take_profit_price
                .as_deref()
                .map(|p| parse_decimal(p, id, "take_profit_price"))
                .transpose()?,
            stop_loss_price: row
                .stop_loss_price
                .as_deref()
                .map(|p| parse_decimal(p, id, "stop_loss_price"))
                .transpose()?,
            status: parse_code::<ScheduledOrderStatus>(&row.status, id)?,
        })
    }
}

impl TryFrom<TpSlOrderRow> for TpSlOrder {
    type Error = StoreError;

    fn try_from(row: TpSlOrderRow) -> Result<Self, Self::Error> {
        let id = row.id;

        Ok(Self {
            id,
            position_id: row.position_id,
            room_id: row.room_id,
            user_id: row.user_id,
            kind: parse_code::<TpSlKind>(&row.kind, id)?,
            side: parse_code::<Side>(&row.side, id)?,
            quantity: parse_decimal(&row.quantity, id, "quantity")?,
            trigger_price: parse_decimal(&row.trigger_price, id, "trigger_price")?,
            order_price: row
                .order_price
                .as_deref()
                .map(|p| parse_decimal(p, id, "order_price"))
                .transpose()?,
            status: parse_code::<TpSlStatus>(&row.status, id)?,
        })
    }
}

fn collect_valid<R, T>(rows: Vec<R>) -> Vec<T>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter()
        .filter_map(|row| match T::try_from(row) {
            Ok(order) => Some(order),
            Err(e) => {
                warn!("Skipping malformed order row: {e}");
                None
            }
        })
        .collect()
}

const SCHEDULED_ORDER_COLUMNS: &str = "id, room_id, user_id, symbol, side, kind, quantity, \
     limit_price, leverage, activation, scheduled_at, trigger_price, trigger_condition, \
     take_profit_price, stop_loss_price, status";

#[async_trait]
impl OrderStore for SqliteOrderStore {
    async fn due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledOrder>, StoreError> {
        let query = format!(
            "SELECT {SCHEDULED_ORDER_COLUMNS} FROM scheduled_orders \
             WHERE status = 'pending' AND activation = 'time' \
             AND datetime(scheduled_at) <= datetime(?1)"
        );

        let rows = sqlx::query_as::<_, ScheduledOrderRow>(&query)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;

        Ok(collect_valid(rows))
    }

    async fn watching_scheduled(&self) -> Result<Vec<ScheduledOrder>, StoreError> {
        let query = format!(
            "SELECT {SCHEDULED_ORDER_COLUMNS} FROM scheduled_orders \
             WHERE status = 'watching' AND activation = 'price'"
        );

        let rows = sqlx::query_as::<_, ScheduledOrderRow>(&query)
            .fetch_all(&self.pool)
            .await?;

        Ok(collect_valid(rows))
    }

    async fn active_tpsl(&self) -> Result<Vec<(TpSlOrder, String)>, StoreError> {
        let rows = sqlx::query_as::<_, TpSlOrderRow>(
            "SELECT t.id, t.position_id, t.room_id, t.user_id, t.kind, p.side, p.symbol, \
             t.quantity, t.trigger_price, t.order_price, t.status \
             FROM tpsl_orders t \
             JOIN positions p ON p.id = t.position_id \
             WHERE t.status = 'active'",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let symbol = row.symbol.clone();
                match TpSlOrder::try_from(row) {
                    Ok(order) => Some((order, symbol)),
                    Err(e) => {
                        warn!("Skipping malformed tp/sl row: {e}");
                        None
                    }
                }
            })
            .collect())
    }
}

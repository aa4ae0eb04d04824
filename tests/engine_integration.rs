//! End-to-end tick test: SQLite-backed order store, mock quote endpoint,
//! mock execution command. Verifies the full candidate -> quote ->
//! evaluate -> dispatch path with the real HTTP clients.

use chrono::{Duration as ChronoDuration, Utc};
use httpmock::prelude::*;
use serde_json::json;
use sqlx::SqlitePool;
use std::time::Duration;
use tokio::sync::watch;
use url::Url;

use trigger_engine::dispatch::HttpDispatcher;
use trigger_engine::quote::HttpPriceSource;
use trigger_engine::scheduler::{Scheduler, SchedulerConfig};
use trigger_engine::store::SqliteOrderStore;

async fn setup_db() -> SqlitePool {
    let pool = SqlitePool::connect(":memory:").await.unwrap();
    sqlx::migrate!().run(&pool).await.unwrap();
    pool
}

#[tokio::test]
async fn engine_dispatches_ready_orders_end_to_end() {
    let pool = setup_db().await;
    let now = Utc::now();

    // Time-mode order already due.
    sqlx::query(
        "INSERT INTO scheduled_orders \
         (room_id, user_id, symbol, side, kind, quantity, leverage, activation, \
          scheduled_at, status) \
         VALUES (1, 1, 'BTCUSDT', 'long', 'market', '1', 10, 'time', ?1, 'pending')",
    )
    .bind(now - ChronoDuration::minutes(1))
    .execute(&pool)
    .await
    .unwrap();

    // Price-mode order: below 50000, current price 49999.99 => ready.
    sqlx::query(
        "INSERT INTO scheduled_orders \
         (room_id, user_id, symbol, side, kind, quantity, leverage, activation, \
          trigger_price, trigger_condition, status) \
         VALUES (1, 1, 'BTCUSDT', 'long', 'market', '0.5', 5, 'price', \
          '50000', 'below', 'watching')",
    )
    .execute(&pool)
    .await
    .unwrap();

    // Price-mode order that must not fire: above 99999.
    sqlx::query(
        "INSERT INTO scheduled_orders \
         (room_id, user_id, symbol, side, kind, quantity, leverage, activation, \
          trigger_price, trigger_condition, status) \
         VALUES (1, 1, 'BTCUSDT', 'short', 'limit', '0.5', 5, 'price', \
          '99999', 'above', 'watching')",
    )
    .execute(&pool)
    .await
    .unwrap();

    // Short position with a take-profit at exactly the current price:
    // equality counts as ready.
    let position_id = sqlx::query(
        "INSERT INTO positions (room_id, user_id, symbol, side, quantity, entry_price) \
         VALUES (1, 1, 'ETHUSDT', 'short', '2', '120')",
    )
    .execute(&pool)
    .await
    .unwrap()
    .last_insert_rowid();

    sqlx::query(
        "INSERT INTO tpsl_orders \
         (position_id, room_id, user_id, kind, quantity, trigger_price, status) \
         VALUES (?1, 1, 1, 'take_profit', '2', '100', 'active')",
    )
    .bind(position_id)
    .execute(&pool)
    .await
    .unwrap();

    let quote_server = MockServer::start();
    let btc_quote = quote_server.mock(|when, then| {
        when.method(GET)
            .path("/api/v3/ticker/price")
            .query_param("symbol", "BTCUSDT");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({"symbol": "BTCUSDT", "price": "49999.99"}));
    });
    let eth_quote = quote_server.mock(|when, then| {
        when.method(GET)
            .path("/api/v3/ticker/price")
            .query_param("symbol", "ETHUSDT");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({"symbol": "ETHUSDT", "price": "100"}));
    });

    let execution_server = MockServer::start();
    let scheduled_execute = execution_server.mock(|when, then| {
        when.method(POST)
            .path("/functions/execute-scheduled-order")
            .header("authorization", "Bearer integration_secret");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({"ok": true}));
    });
    let tpsl_execute = execution_server.mock(|when, then| {
        when.method(POST)
            .path("/functions/execute-tpsl-order")
            .header("authorization", "Bearer integration_secret")
            .json_body(json!({"order_id": 1, "observed_price": "100"}));
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({"ok": true, "detail": "executed"}));
    });

    let store = SqliteOrderStore::new(pool);
    let prices = HttpPriceSource::new(
        Url::parse(&quote_server.base_url()).unwrap(),
        Duration::from_secs(5),
    )
    .unwrap();
    let dispatcher = HttpDispatcher::new(
        Url::parse(&execution_server.base_url()).unwrap(),
        "integration_secret".to_string(),
        Duration::from_secs(5),
    )
    .unwrap();

    let config = SchedulerConfig {
        tick_interval: Duration::from_millis(100),
        max_dispatch_jitter: Duration::ZERO,
    };
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Scheduler::new(config, store, prices, dispatcher, shutdown_rx);

    let handle = tokio::spawn(scheduler.start());
    tokio::time::sleep(Duration::from_millis(350)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    // One quote per distinct symbol per tick, shared across the three
    // BTCUSDT orders.
    assert!(btc_quote.hits() >= 1);
    assert!(eth_quote.hits() >= 1);
    assert_eq!(btc_quote.hits(), eth_quote.hits());

    // Two scheduled orders ready per tick (due + below-trigger); the
    // above-99999 order never dispatches. The mock never flips order
    // status, so every tick re-dispatches: hits are a multiple of the
    // per-tick ready counts.
    assert!(scheduled_execute.hits() >= 2);
    assert_eq!(scheduled_execute.hits() % 2, 0);
    assert!(tpsl_execute.hits() >= 1);
}

//! The orchestrating control loop. On a fixed tick: list candidate orders,
//! fetch one quote per distinct symbol, evaluate triggers, and fan out
//! execution dispatches. The loop owns no business state; order status
//! transitions belong to the external execution command, so a tick is safe
//! to repeat for an order whose previous dispatch had an unknown outcome.

use chrono::Utc;
use futures_util::future::join_all;
use rand::Rng;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::dispatch::ExecutionDispatcher;
use crate::error::SchedulerError;
use crate::order::{ScheduledOrder, TpSlOrder};
use crate::quote::PriceSource;
use crate::store::OrderStore;
use crate::trigger::{scheduled_order_ready, tpsl_ready};

/// Consecutive ticks a symbol may go without a usable quote before the
/// streak is flagged for manual review. The orders themselves keep being
/// retried either way.
const QUOTE_FAILURE_REVIEW_THRESHOLD: u32 = 10;

/// Guards against duplicate scheduler start-up within one process
/// lifetime (supervisor or hot-reload double-init).
static SCHEDULER_STARTED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    /// Random delay added before each dispatch within a tick to spread
    /// load on the execution endpoint.
    pub max_dispatch_jitter: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(30),
            max_dispatch_jitter: Duration::from_millis(500),
        }
    }
}

/// Tick-local observability counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub candidates: usize,
    pub ready: usize,
    pub dispatched: usize,
    pub failed: usize,
}

pub struct Scheduler<S, P, E> {
    config: SchedulerConfig,
    store: S,
    prices: P,
    dispatcher: E,
    shutdown: watch::Receiver<bool>,
    /// Consecutive unusable-quote ticks per symbol, for the manual-review
    /// flag. Private to the loop task; never crosses a task boundary.
    quote_misses: HashMap<String, u32>,
}

impl<S, P, E> Scheduler<S, P, E>
where
    S: OrderStore,
    P: PriceSource,
    E: ExecutionDispatcher,
{
    pub fn new(
        config: SchedulerConfig,
        store: S,
        prices: P,
        dispatcher: E,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            store,
            prices,
            dispatcher,
            shutdown,
            quote_misses: HashMap::new(),
        }
    }

    /// Runs the tick loop until shutdown. Idempotent at the process level:
    /// a second start within the same process returns
    /// `SchedulerError::AlreadyStarted` instead of spawning a rival loop.
    pub async fn start(mut self) -> Result<(), SchedulerError> {
        if SCHEDULER_STARTED.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyStarted);
        }

        info!(
            "Starting conditional order scheduler with interval {:?}",
            self.config.tick_interval
        );

        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // A failed tick is abandoned; the next one still fires.
                    if let Err(e) = self.tick().await {
                        error!("Tick abandoned: {e}");
                    }
                }
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        info!("Shutdown requested, stopping scheduler");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// One bounded, self-contained unit of work.
    pub async fn tick(&mut self) -> Result<TickReport, SchedulerError> {
        let now = Utc::now();

        let due = self.store.due_scheduled(now).await?;
        let watching = self.store.watching_scheduled().await?;
        let exits = self.store.active_tpsl().await?;

        let mut report = TickReport {
            candidates: due.len() + watching.len() + exits.len(),
            ..TickReport::default()
        };

        if report.candidates == 0 {
            debug!("No conditional order candidates this tick");
            return Ok(report);
        }

        let symbols: BTreeSet<&str> = watching
            .iter()
            .map(|order| order.symbol.as_str())
            .chain(exits.iter().map(|(_, symbol)| symbol.as_str()))
            .collect();

        let quotes = self.fetch_quotes(&symbols).await;
        self.note_quote_outcomes(&symbols, &quotes);

        let ready_entries: Vec<(&ScheduledOrder, Option<Decimal>)> = due
            .iter()
            .filter(|order| scheduled_order_ready(order, None, now))
            .map(|order| (order, None))
            .chain(watching.iter().filter_map(|order| {
                let price = quotes.get(&order.symbol).copied();
                scheduled_order_ready(order, price, now).then_some((order, price))
            }))
            .collect();

        let ready_exits: Vec<(&TpSlOrder, Decimal)> = exits
            .iter()
            .filter_map(|(order, symbol)| match quotes.get(symbol).copied() {
                Some(price) if tpsl_ready(order, Some(price)) => Some((order, price)),
                _ => None,
            })
            .collect();

        report.ready = ready_entries.len() + ready_exits.len();

        let entry_dispatches = ready_entries
            .iter()
            .map(|(order, price)| self.dispatch_scheduled(order, *price));
        let exit_dispatches = ready_exits
            .iter()
            .map(|(order, price)| self.dispatch_tpsl(order, *price));

        let (entry_results, exit_results) =
            tokio::join!(join_all(entry_dispatches), join_all(exit_dispatches));

        report.dispatched = entry_results
            .iter()
            .chain(exit_results.iter())
            .filter(|ok| **ok)
            .count();
        report.failed = report.ready - report.dispatched;

        info!(
            "Tick complete: {} candidates, {} ready, {} dispatched, {} failed",
            report.candidates, report.ready, report.dispatched, report.failed
        );

        Ok(report)
    }

    /// One fetch per distinct symbol, fanned out concurrently. Unavailable
    /// symbols are simply absent from the returned map.
    async fn fetch_quotes(&self, symbols: &BTreeSet<&str>) -> HashMap<String, Decimal> {
        let fetches = symbols.iter().map(|symbol| async move {
            (symbol.to_string(), self.prices.latest(symbol).await)
        });

        join_all(fetches)
            .await
            .into_iter()
            .filter_map(|(symbol, quote)| quote.price().map(|price| (symbol, price)))
            .collect()
    }

    fn note_quote_outcomes(&mut self, symbols: &BTreeSet<&str>, quotes: &HashMap<String, Decimal>) {
        for symbol in symbols {
            if quotes.contains_key(*symbol) {
                self.quote_misses.remove(*symbol);
                continue;
            }

            let misses = self
                .quote_misses
                .entry((*symbol).to_string())
                .and_modify(|count| *count += 1)
                .or_insert(1);

            if *misses >= QUOTE_FAILURE_REVIEW_THRESHOLD {
                warn!(
                    "No usable price for {symbol} after {misses} consecutive ticks; \
                     flagging for manual review"
                );
                *misses = 0;
            }
        }
    }

    async fn dispatch_scheduled(
        &self,
        order: &ScheduledOrder,
        observed_price: Option<Decimal>,
    ) -> bool {
        self.add_jittered_delay().await;

        match self
            .dispatcher
            .execute_scheduled(order.id, observed_price)
            .await
        {
            Ok(outcome) if outcome.ok => {
                info!("Executed scheduled order {}", order.id);
                true
            }
            Ok(outcome) => {
                warn!(
                    "Execution rejected scheduled order {}: {}",
                    order.id,
                    outcome.detail.as_deref().unwrap_or("no detail")
                );
                false
            }
            Err(e) => {
                error!("Dispatch failed for scheduled order {}: {e}", order.id);
                false
            }
        }
    }

    async fn dispatch_tpsl(&self, order: &TpSlOrder, observed_price: Decimal) -> bool {
        self.add_jittered_delay().await;

        match self.dispatcher.execute_tpsl(order.id, observed_price).await {
            Ok(outcome) if outcome.ok => {
                info!("Executed tp/sl order {}", order.id);
                true
            }
            Ok(outcome) => {
                warn!(
                    "Execution rejected tp/sl order {}: {}",
                    order.id,
                    outcome.detail.as_deref().unwrap_or("no detail")
                );
                false
            }
            Err(e) => {
                error!("Dispatch failed for tp/sl order {}: {e}", order.id);
                false
            }
        }
    }

    async fn add_jittered_delay(&self) {
        if self.config.max_dispatch_jitter > Duration::ZERO {
            #[allow(clippy::cast_possible_truncation)]
            let max_jitter_millis = self.config.max_dispatch_jitter.as_millis() as u64;
            let jitter_millis = rand::thread_rng().gen_range(0..max_jitter_millis);
            tokio::time::sleep(Duration::from_millis(jitter_millis)).await;
        }
    }
}

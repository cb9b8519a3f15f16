//! Background expiry sweep.
//!
//! Expired holds already stop counting against availability, so the sweep is
//! housekeeping: it stamps `released_at` so the rows drop out of the active
//! index. A failed pass is logged and retried on the next tick.

use crate::reservation::ReservationEngine;
use std::time::Duration;
use stock_ledger_core::{Catalog, InventoryStore};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Period used when a zero interval is supplied.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Runs [`ReservationEngine::sweep_expired`] on a fixed interval until shutdown.
pub struct ExpirySweeper<S, C> {
    engine: ReservationEngine<S, C>,
    interval: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl<S, C> ExpirySweeper<S, C>
where
    S: InventoryStore + 'static,
    C: Catalog + 'static,
{
    /// Create a sweeper. The first pass runs immediately.
    ///
    /// A zero `interval` is raised to [`MIN_SWEEP_INTERVAL`].
    #[must_use]
    pub const fn new(
        engine: ReservationEngine<S, C>,
        interval: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        let interval = if interval.is_zero() {
            MIN_SWEEP_INTERVAL
        } else {
            interval
        };
        Self {
            engine,
            interval,
            shutdown,
        }
    }

    /// Spawn the loop on the current runtime
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Sweep until a shutdown signal arrives (or the sender is dropped).
    pub async fn run(mut self) {
        info!(interval_secs = self.interval.as_secs(), "Expiry sweeper started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!("Expiry sweeper received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    match self.engine.sweep_expired().await {
                        Ok(released) if released.is_empty() => debug!("No expired reservations"),
                        Ok(released) => debug!(count = released.len(), "Sweep pass complete"),
                        Err(e) => error!(error = %e, "Expiry sweep failed, will retry next tick"),
                    }
                }
            }
        }

        info!("Expiry sweeper stopped");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::reservation::{ReservationPolicy, ReserveRequest};
    use chrono::Duration as ChronoDuration;
    use std::sync::Arc;
    use stock_ledger_core::environment::Clock;
    use stock_ledger_testing::{
        InMemoryCatalog, InMemoryInventoryStore, MockClock, fixtures, test_clock,
    };

    async fn expired_hold() -> (
        ReservationEngine<InMemoryInventoryStore, InMemoryCatalog>,
        stock_ledger_core::ReservationId,
    ) {
        let product = fixtures::product("SKU-1", 5, 100);
        let warehouse = fixtures::warehouse("W1", 100, None);
        let catalog = InMemoryCatalog::new()
            .with_product(product.clone())
            .with_warehouse(warehouse.clone());
        let store = InMemoryInventoryStore::new();
        let clock = MockClock::new(test_clock().now());
        store
            .receive_stock(product.id, warehouse.id, 10, clock.now())
            .await
            .unwrap();

        let engine = ReservationEngine::new(
            Arc::new(store.clone()),
            Arc::new(catalog),
            Arc::new(clock.clone()),
            ReservationPolicy::default(),
        );
        let reservation = engine
            .reserve(ReserveRequest::new(product.id, warehouse.id, 4, 1))
            .await
            .unwrap();
        clock.advance(ChronoDuration::minutes(2));
        (engine, reservation.reservation_id)
    }

    async fn wait_for_release(
        engine: &ReservationEngine<InMemoryInventoryStore, InMemoryCatalog>,
        reservation_id: &stock_ledger_core::ReservationId,
    ) -> bool {
        for _ in 0..100 {
            let current = engine.get_reservation(reservation_id).await.unwrap();
            if current.released_at.is_some() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn sweeps_until_shutdown() {
        let (engine, reservation_id) = expired_hold().await;

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle =
            ExpirySweeper::new(engine.clone(), Duration::from_millis(10), shutdown_rx).spawn();

        assert!(
            wait_for_release(&engine, &reservation_id).await,
            "sweeper never released the expired reservation"
        );

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn zero_interval_falls_back_to_the_minimum_period() {
        let (engine, reservation_id) = expired_hold().await;

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let sweeper = ExpirySweeper::new(engine.clone(), Duration::ZERO, shutdown_rx);
        assert_eq!(sweeper.interval, MIN_SWEEP_INTERVAL);
        let handle = sweeper.spawn();

        assert!(wait_for_release(&engine, &reservation_id).await);

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

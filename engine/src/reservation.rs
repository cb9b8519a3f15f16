//! Reservation engine.
//!
//! # Effective Availability
//!
//! `effective = ledger.available_quantity - Σ quantity of active reservations`
//!
//! The sum is computed live from the reservation store. The ledger's
//! `reserved_quantity` counter is never consulted. A reservation past its
//! `expires_at` stops counting immediately; the sweep only stamps `released_at`.
//!
//! # Locking
//!
//! `reserve` locks the `(product, warehouse)` ledger row, sums active holds and
//! inserts the new one inside a single [`LedgerTransaction`]. Concurrent
//! reservations on the same pair queue on that lock, so they can never jointly
//! exceed the available quantity.

use crate::config::ReservationConfig;
use crate::discard;
use crate::metrics;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stock_ledger_core::environment::Clock;
use stock_ledger_core::error::Result;
use stock_ledger_core::{
    Catalog, InventoryError, InventoryStore, LedgerTransaction, ProductId, ReservationId,
    StockReservation, WarehouseId,
};

/// Bounds on caller-requested hold durations, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationPolicy {
    /// Shortest hold
    pub min_minutes: u32,
    /// Longest hold
    pub max_minutes: u32,
}

impl Default for ReservationPolicy {
    fn default() -> Self {
        Self {
            min_minutes: 1,
            max_minutes: 1440,
        }
    }
}

impl From<&ReservationConfig> for ReservationPolicy {
    fn from(config: &ReservationConfig) -> Self {
        Self {
            min_minutes: config.min_minutes,
            max_minutes: config.max_minutes,
        }
    }
}

impl ReservationPolicy {
    fn check_minutes(self, what: &str, minutes: u32) -> Result<()> {
        if (self.min_minutes..=self.max_minutes).contains(&minutes) {
            Ok(())
        } else {
            Err(InventoryError::InvalidArgument(format!(
                "{what} must be between {} and {} minutes, got {minutes}",
                self.min_minutes, self.max_minutes
            )))
        }
    }
}

/// Request to hold stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveRequest {
    /// Product to hold
    pub product_id: ProductId,
    /// Warehouse to hold it in
    pub warehouse_id: WarehouseId,
    /// Units to hold
    pub quantity: u32,
    /// Hold duration
    pub duration_minutes: u32,
    /// Free-text reason
    pub reason: String,
    /// Token making retries of this request safe
    pub idempotency_key: Option<String>,
}

impl ReserveRequest {
    /// Request with an empty reason and no idempotency key
    #[must_use]
    pub const fn new(
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: u32,
        duration_minutes: u32,
    ) -> Self {
        Self {
            product_id,
            warehouse_id,
            quantity,
            duration_minutes,
            reason: String::new(),
            idempotency_key: None,
        }
    }

    /// Attach a reason
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Attach an idempotency key
    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

enum Reserved {
    Created(StockReservation),
    Replayed(StockReservation),
}

/// Creates, releases, extends and sweeps reservations.
pub struct ReservationEngine<S, C> {
    store: Arc<S>,
    catalog: Arc<C>,
    clock: Arc<dyn Clock>,
    policy: ReservationPolicy,
}

impl<S, C> Clone for ReservationEngine<S, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            catalog: Arc::clone(&self.catalog),
            clock: Arc::clone(&self.clock),
            policy: self.policy,
        }
    }
}

impl<S, C> ReservationEngine<S, C>
where
    S: InventoryStore,
    C: Catalog,
{
    /// Create an engine over shared collaborators
    #[must_use]
    pub fn new(
        store: Arc<S>,
        catalog: Arc<C>,
        clock: Arc<dyn Clock>,
        policy: ReservationPolicy,
    ) -> Self {
        Self {
            store,
            catalog,
            clock,
            policy,
        }
    }

    /// Ledger availability minus active holds, floored at zero.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::TransactionFailed`] if the store cannot be read.
    pub async fn effective_available(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<u64> {
        let now = self.clock.now();
        let available = self
            .store
            .get_item(product_id, warehouse_id)
            .await?
            .map_or(0, |item| u64::from(item.available_quantity));
        let held = self
            .store
            .active_reserved_quantity(product_id, warehouse_id, now)
            .await?;
        Ok(available.saturating_sub(held))
    }

    /// Whether `quantity` units could be reserved right now. No side effects.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::TransactionFailed`] if the store cannot be read.
    pub async fn can_reserve(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: u32,
    ) -> Result<bool> {
        if quantity == 0 {
            return Ok(false);
        }
        let effective = self.effective_available(product_id, warehouse_id).await?;
        Ok(u64::from(quantity) <= effective)
    }

    /// Place a hold.
    ///
    /// A request carrying an idempotency key that was already used returns the
    /// original reservation and creates nothing.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::InvalidArgument`] for a zero quantity or a duration outside policy
    /// - [`InventoryError::NotFound`] for an unknown product or warehouse
    /// - [`InventoryError::InsufficientStock`] when effective availability is short
    /// - [`InventoryError::TransactionFailed`] when the store cannot commit
    #[tracing::instrument(
        skip_all,
        fields(
            product_id = %request.product_id,
            warehouse_id = %request.warehouse_id,
            quantity = request.quantity,
        )
    )]
    pub async fn reserve(&self, request: ReserveRequest) -> Result<StockReservation> {
        if request.quantity == 0 {
            return Err(InventoryError::InvalidArgument(
                "quantity must be positive".to_string(),
            ));
        }
        self.policy
            .check_minutes("duration", request.duration_minutes)?;
        self.ensure_known(request.product_id, request.warehouse_id)
            .await?;

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let reserved = match Self::reserve_within(&mut tx, &request, now).await {
            Ok(reserved) => reserved,
            Err(error) => {
                discard(tx).await;
                if let InventoryError::InsufficientStock { requested, available } = &error {
                    tracing::info!(requested, available, "Reservation rejected: insufficient stock");
                    metrics::record_reservation_rejected();
                } else {
                    tracing::warn!(%error, "Reservation failed");
                }
                return Err(error);
            }
        };

        match reserved {
            Reserved::Created(reservation) => {
                tx.commit().await.map_err(|error| {
                    tracing::error!(%error, "Failed to commit reservation");
                    InventoryError::from(error)
                })?;
                metrics::record_reservation_created(reservation.quantity);
                tracing::info!(
                    reservation_id = %reservation.reservation_id,
                    expires_at = %reservation.expires_at,
                    "Reservation created"
                );
                Ok(reservation)
            }
            Reserved::Replayed(reservation) => {
                discard(tx).await;
                metrics::record_reservation_replayed();
                tracing::info!(
                    reservation_id = %reservation.reservation_id,
                    "Idempotency key already used, returning existing reservation"
                );
                Ok(reservation)
            }
        }
    }

    async fn reserve_within(
        tx: &mut S::Tx,
        request: &ReserveRequest,
        now: DateTime<Utc>,
    ) -> Result<Reserved> {
        let item = tx
            .lock_item(request.product_id, request.warehouse_id)
            .await?;

        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = tx.find_reservation_by_key(key).await? {
                return Ok(Reserved::Replayed(existing));
            }
        }

        let available = item.map_or(0, |item| u64::from(item.available_quantity));
        let held = tx
            .active_reserved_quantity(request.product_id, request.warehouse_id, now)
            .await?;
        let effective = available.saturating_sub(held);

        if u64::from(request.quantity) > effective {
            return Err(InventoryError::InsufficientStock {
                requested: u64::from(request.quantity),
                available: effective,
            });
        }

        let reservation = StockReservation {
            reservation_id: ReservationId::generate(now),
            product_id: request.product_id,
            warehouse_id: request.warehouse_id,
            quantity: request.quantity,
            created_at: now,
            expires_at: now + Duration::minutes(i64::from(request.duration_minutes)),
            released_at: None,
            reason: request.reason.clone(),
            idempotency_key: request.idempotency_key.clone(),
        };
        tx.insert_reservation(&reservation).await?;

        Ok(Reserved::Created(reservation))
    }

    /// Release a hold. Expired-but-unswept holds can still be released.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::NotFound`] for an unknown reservation
    /// - [`InventoryError::AlreadyReleased`] when `released_at` is already set
    /// - [`InventoryError::TransactionFailed`] when the store cannot be updated
    #[tracing::instrument(skip_all, fields(reservation_id = %reservation_id))]
    pub async fn release(&self, reservation_id: &ReservationId) -> Result<StockReservation> {
        let now = self.clock.now();

        if let Some(released) = self.store.mark_released(reservation_id, now).await? {
            metrics::record_reservation_released();
            tracing::info!(
                product_id = %released.product_id,
                warehouse_id = %released.warehouse_id,
                quantity = released.quantity,
                "Reservation released"
            );
            return Ok(released);
        }

        match self.store.get_reservation(reservation_id).await? {
            None => Err(InventoryError::not_found("reservation", reservation_id)),
            Some(_) => {
                tracing::debug!("Reservation already released");
                Err(InventoryError::AlreadyReleased(reservation_id.clone()))
            }
        }
    }

    /// Push an active hold's expiry forward.
    ///
    /// Returns `false` when the reservation is missing, released or already expired.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::InvalidArgument`] when `additional_minutes` is outside policy
    /// - [`InventoryError::TransactionFailed`] when the store cannot be updated
    #[tracing::instrument(skip_all, fields(reservation_id = %reservation_id, additional_minutes = additional_minutes))]
    pub async fn extend(
        &self,
        reservation_id: &ReservationId,
        additional_minutes: u32,
    ) -> Result<bool> {
        self.policy
            .check_minutes("extension", additional_minutes)?;
        let now = self.clock.now();

        match self
            .store
            .extend_reservation(reservation_id, additional_minutes, now)
            .await?
        {
            Some(extended) => {
                tracing::info!(expires_at = %extended.expires_at, "Reservation extended");
                Ok(true)
            }
            None => {
                tracing::debug!("Reservation not extendable");
                Ok(false)
            }
        }
    }

    /// Reservation by id, in any state.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::NotFound`] for an unknown reservation
    /// - [`InventoryError::TransactionFailed`] if the store cannot be read
    pub async fn get_reservation(&self, reservation_id: &ReservationId) -> Result<StockReservation> {
        self.store
            .get_reservation(reservation_id)
            .await?
            .ok_or_else(|| InventoryError::not_found("reservation", reservation_id))
    }

    /// Holds currently counting against a product's availability, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::TransactionFailed`] if the store cannot be read.
    pub async fn active_reservations(&self, product_id: ProductId) -> Result<Vec<StockReservation>> {
        let now = self.clock.now();
        Ok(self
            .store
            .active_reservations_for_product(product_id, now)
            .await?)
    }

    /// Stamp `released_at` on every expired hold. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::TransactionFailed`] if the store cannot be updated.
    #[tracing::instrument(skip_all)]
    pub async fn sweep_expired(&self) -> Result<Vec<StockReservation>> {
        let now = self.clock.now();
        let released = self.store.release_expired(now).await?;

        if !released.is_empty() {
            metrics::record_reservations_expired(released.len());
            tracing::info!(count = released.len(), "Expired reservations released");
        }
        Ok(released)
    }

    async fn ensure_known(&self, product_id: ProductId, warehouse_id: WarehouseId) -> Result<()> {
        if self.catalog.get_product(product_id).await?.is_none() {
            return Err(InventoryError::not_found("product", product_id));
        }
        if self.catalog.get_warehouse(warehouse_id).await?.is_none() {
            return Err(InventoryError::not_found("warehouse", warehouse_id));
        }
        Ok(())
    }
}

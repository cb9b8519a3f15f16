//! Facade wiring the engines over one store, one catalog and one clock.
//!
//! Mutating operations here return [`OperationOutcome`] so a transport layer can
//! serialize them directly. Read operations go through the component accessors.

use crate::allocation::{TransferRequest, WarehouseAllocator};
use crate::config::Config;
use crate::monitor::LowStockMonitor;
use crate::outcome::OperationOutcome;
use crate::reservation::{ReservationEngine, ReservationPolicy, ReserveRequest};
use crate::sweeper::ExpirySweeper;
use std::sync::Arc;
use std::time::Duration;
use stock_ledger_core::environment::Clock;
use stock_ledger_core::error::Result;
use stock_ledger_core::{
    Catalog, InventoryError, InventoryItem, InventoryStore, ProductId, ReservationId,
    StockReservation, StockTransfer, WarehouseId,
};
use tokio::sync::broadcast;

/// Reservation engine, allocator and monitor sharing their collaborators.
pub struct StockLedger<S, C> {
    store: Arc<S>,
    catalog: Arc<C>,
    clock: Arc<dyn Clock>,
    reservations: ReservationEngine<S, C>,
    allocator: WarehouseAllocator<S, C>,
    monitor: LowStockMonitor<S, C>,
    sweep_interval: Duration,
}

impl<S, C> StockLedger<S, C>
where
    S: InventoryStore + 'static,
    C: Catalog + 'static,
{
    /// Wire the engines from configuration
    #[must_use]
    pub fn new(store: Arc<S>, catalog: Arc<C>, clock: Arc<dyn Clock>, config: &Config) -> Self {
        let reservations = ReservationEngine::new(
            Arc::clone(&store),
            Arc::clone(&catalog),
            Arc::clone(&clock),
            ReservationPolicy::from(&config.reservations),
        );
        let allocator = WarehouseAllocator::new(
            Arc::clone(&store),
            Arc::clone(&catalog),
            Arc::clone(&clock),
            config.transfers.retry_policy(),
        );
        let monitor = LowStockMonitor::new(
            Arc::clone(&store),
            Arc::clone(&catalog),
            Arc::clone(&clock),
        );

        Self {
            store,
            catalog,
            clock,
            reservations,
            allocator,
            monitor,
            sweep_interval: config.reservations.sweep_interval(),
        }
    }

    /// Reservation engine
    #[must_use]
    pub const fn reservations(&self) -> &ReservationEngine<S, C> {
        &self.reservations
    }

    /// Multi-warehouse allocator
    #[must_use]
    pub const fn allocator(&self) -> &WarehouseAllocator<S, C> {
        &self.allocator
    }

    /// Low-stock monitor
    #[must_use]
    pub const fn monitor(&self) -> &LowStockMonitor<S, C> {
        &self.monitor
    }

    /// Background sweeper bound to this ledger's reservation engine
    #[must_use]
    pub fn sweeper(&self, shutdown: broadcast::Receiver<()>) -> ExpirySweeper<S, C> {
        ExpirySweeper::new(self.reservations.clone(), self.sweep_interval, shutdown)
    }

    /// Place a hold.
    pub async fn reserve(&self, request: ReserveRequest) -> OperationOutcome<StockReservation> {
        match self.reservations.reserve(request).await {
            Ok(reservation) => {
                let message = format!(
                    "Reserved {} units until {}",
                    reservation.quantity,
                    reservation.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
                OperationOutcome::succeeded(message, reservation)
            }
            Err(error) => OperationOutcome::failed(&error),
        }
    }

    /// Release a hold.
    pub async fn release(&self, reservation_id: &ReservationId) -> OperationOutcome<StockReservation> {
        OperationOutcome::from_result(
            self.reservations.release(reservation_id).await,
            format!("Reservation {reservation_id} released"),
        )
    }

    /// Extend an active hold.
    pub async fn extend(
        &self,
        reservation_id: &ReservationId,
        additional_minutes: u32,
    ) -> OperationOutcome<bool> {
        match self.reservations.extend(reservation_id, additional_minutes).await {
            Ok(true) => OperationOutcome::succeeded(
                format!("Reservation {reservation_id} extended by {additional_minutes} minutes"),
                true,
            ),
            Ok(false) => OperationOutcome {
                success: false,
                message: format!("Reservation {reservation_id} is not active"),
                record: Some(false),
                error_kind: None,
            },
            Err(error) => OperationOutcome::failed(&error),
        }
    }

    /// Move stock between warehouses.
    pub async fn transfer_stock(&self, request: TransferRequest) -> OperationOutcome<StockTransfer> {
        match self.allocator.transfer_stock(request).await {
            Ok(transfer) => {
                let message = format!(
                    "Transferred {} units from {} to {}",
                    transfer.quantity, transfer.from_warehouse_id, transfer.to_warehouse_id
                );
                OperationOutcome::succeeded(message, transfer)
            }
            Err(error) => OperationOutcome::failed(&error),
        }
    }

    /// Change a product's reorder level.
    pub async fn update_reorder_level(
        &self,
        product_id: ProductId,
        reorder_level: u32,
    ) -> OperationOutcome<bool> {
        match self.monitor.update_reorder_level(product_id, reorder_level).await {
            Ok(true) => OperationOutcome::succeeded(
                format!("Reorder level set to {reorder_level}"),
                true,
            ),
            Ok(false) => OperationOutcome {
                success: false,
                message: format!("product {product_id} not found"),
                record: Some(false),
                error_kind: None,
            },
            Err(error) => OperationOutcome::failed(&error),
        }
    }

    /// External stock receipt into a known `(product, warehouse)` pair.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::InvalidArgument`] for a zero quantity
    /// - [`InventoryError::NotFound`] for an unknown product or warehouse
    /// - [`InventoryError::TransactionFailed`] when the store cannot be updated
    #[tracing::instrument(
        skip_all,
        fields(product_id = %product_id, warehouse_id = %warehouse_id, quantity = quantity)
    )]
    pub async fn receive_stock(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: u32,
    ) -> Result<InventoryItem> {
        if quantity == 0 {
            return Err(InventoryError::InvalidArgument(
                "quantity must be positive".to_string(),
            ));
        }
        if self.catalog.get_product(product_id).await?.is_none() {
            return Err(InventoryError::not_found("product", product_id));
        }
        if self.catalog.get_warehouse(warehouse_id).await?.is_none() {
            return Err(InventoryError::not_found("warehouse", warehouse_id));
        }

        let item = self
            .store
            .receive_stock(product_id, warehouse_id, quantity, self.clock.now())
            .await?;
        tracing::info!(available = item.available_quantity, "Stock received");
        Ok(item)
    }
}

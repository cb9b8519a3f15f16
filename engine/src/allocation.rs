//! Multi-warehouse allocator.
//!
//! Reads the raw ledger across warehouses, splits demand nearest-first, moves
//! stock between warehouses atomically and reports capacity utilization.
//!
//! # Allocation Heuristic
//!
//! Candidates are active warehouses with stock. When the customer's coordinates
//! are known each candidate gets a haversine distance; candidates are ordered by
//! distance (no coordinates = +∞) then by available quantity descending, and the
//! demand is filled greedily in that order. This minimises shipping distance,
//! not the number of warehouses touched.
//!
//! # Transfer Locking
//!
//! Both ledger rows are locked in `WarehouseId` order, so two opposite-direction
//! transfers of the same product cannot deadlock.

use crate::discard;
use crate::geo::haversine_km;
use crate::metrics;
use crate::retry::{RetryPolicy, retry_with_predicate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use stock_ledger_core::environment::Clock;
use stock_ledger_core::error::Result;
use stock_ledger_core::{
    Catalog, InventoryError, InventoryItem, InventoryStore, LedgerTransaction, ProductId,
    StockTransfer, TransferId, TransferStatus, Warehouse, WarehouseId,
};

/// One warehouse's ledger position for a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseStock {
    /// Warehouse holding the stock
    pub warehouse_id: WarehouseId,
    /// Warehouse code
    pub warehouse_code: String,
    /// Warehouse name
    pub warehouse_name: String,
    /// Ledger available quantity
    pub available_quantity: u32,
    /// Ledger reserved counter (hint only)
    pub reserved_quantity: u32,
    /// Warehouse latitude
    pub latitude: Option<f64>,
    /// Warehouse longitude
    pub longitude: Option<f64>,
    /// Whether the warehouse accepts allocations
    pub is_active: bool,
}

impl WarehouseStock {
    fn new(warehouse: &Warehouse, item: &InventoryItem) -> Self {
        Self {
            warehouse_id: warehouse.id,
            warehouse_code: warehouse.code.clone(),
            warehouse_name: warehouse.name.clone(),
            available_quantity: item.available_quantity,
            reserved_quantity: item.reserved_quantity,
            latitude: warehouse.latitude,
            longitude: warehouse.longitude,
            is_active: warehouse.is_active,
        }
    }

    fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

/// Cross-warehouse availability for a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityReport {
    /// Product checked
    pub product_id: ProductId,
    /// Quantity asked for
    pub required_quantity: u32,
    /// Σ ledger available quantity over every warehouse holding the product
    pub total_available: u64,
    /// `total_available >= required_quantity`
    pub is_available: bool,
    /// Per-warehouse positions
    pub warehouses: Vec<WarehouseStock>,
}

/// Why a warehouse was picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationReason {
    /// Ranked by distance to the customer
    #[serde(rename = "Closest warehouse")]
    ClosestWarehouse,
    /// Ranked by stock on hand
    #[serde(rename = "Best available stock")]
    BestAvailableStock,
}

impl AllocationReason {
    /// Human-readable label
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ClosestWarehouse => "Closest warehouse",
            Self::BestAvailableStock => "Best available stock",
        }
    }
}

impl fmt::Display for AllocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Part of a demand assigned to one warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    /// Warehouse to ship from
    pub warehouse_id: WarehouseId,
    /// Warehouse code
    pub warehouse_code: String,
    /// Units to take from it
    pub quantity: u32,
    /// 1 = ship first
    pub priority: u32,
    /// Distance to the customer, when both ends have coordinates
    pub distance_km: Option<f64>,
    /// Why it was picked
    pub allocation_reason: AllocationReason,
}

/// Request to move stock between two warehouses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Product to move
    pub product_id: ProductId,
    /// Source warehouse
    pub from_warehouse_id: WarehouseId,
    /// Destination warehouse
    pub to_warehouse_id: WarehouseId,
    /// Units to move
    pub quantity: u32,
    /// Why
    pub reason: String,
    /// Optional operator notes
    pub notes: Option<String>,
}

/// Capacity usage of one warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationReport {
    /// Warehouse measured
    pub warehouse_id: WarehouseId,
    /// Warehouse code
    pub warehouse_code: String,
    /// Warehouse name
    pub warehouse_name: String,
    /// Configured capacity
    pub capacity: u32,
    /// Σ (available + reserved) over the warehouse's ledger rows
    pub used_capacity: u64,
    /// `used / capacity * 100`, 0 when capacity is 0
    pub utilization_percentage: f64,
    /// Number of products with a ledger row in the warehouse
    pub product_count: usize,
}

impl UtilizationReport {
    #[allow(clippy::cast_precision_loss)] // Unit counts stay well below 2^52
    fn new(warehouse: &Warehouse, items: &[InventoryItem]) -> Self {
        let used_capacity: u64 = items.iter().map(InventoryItem::occupied).sum();
        let utilization_percentage = if warehouse.capacity == 0 {
            0.0
        } else {
            used_capacity as f64 / f64::from(warehouse.capacity) * 100.0
        };

        Self {
            warehouse_id: warehouse.id,
            warehouse_code: warehouse.code.clone(),
            warehouse_name: warehouse.name.clone(),
            capacity: warehouse.capacity,
            used_capacity,
            utilization_percentage,
            product_count: items.len(),
        }
    }
}

/// Split `required` across `stock` nearest-first.
///
/// Only active warehouses with stock are candidates. Returns an empty plan when
/// they cannot cover `required` between them; otherwise the allocations sum to
/// exactly `required`.
#[must_use]
pub fn plan_allocation(
    stock: &[WarehouseStock],
    required: u32,
    customer: Option<(f64, f64)>,
) -> Vec<Allocation> {
    let mut candidates: Vec<(&WarehouseStock, Option<f64>)> = stock
        .iter()
        .filter(|s| s.is_active && s.available_quantity > 0)
        .map(|s| {
            let distance = customer
                .zip(s.coordinates())
                .map(|(from, to)| haversine_km(from, to));
            (s, distance)
        })
        .collect();

    let coverable: u64 = candidates
        .iter()
        .map(|(s, _)| u64::from(s.available_quantity))
        .sum();
    if required == 0 || coverable < u64::from(required) {
        return Vec::new();
    }

    candidates.sort_by(|(a, da), (b, db)| {
        by_distance(*da, *db).then_with(|| b.available_quantity.cmp(&a.available_quantity))
    });

    let mut remaining = required;
    let mut allocations = Vec::new();
    for ((stock, distance), priority) in candidates.into_iter().zip(1..) {
        if remaining == 0 {
            break;
        }
        let quantity = remaining.min(stock.available_quantity);
        remaining -= quantity;
        allocations.push(Allocation {
            warehouse_id: stock.warehouse_id,
            warehouse_code: stock.warehouse_code.clone(),
            quantity,
            priority,
            distance_km: distance,
            allocation_reason: if distance.is_some() {
                AllocationReason::ClosestWarehouse
            } else {
                AllocationReason::BestAvailableStock
            },
        });
    }
    allocations
}

fn by_distance(a: Option<f64>, b: Option<f64>) -> Ordering {
    a.unwrap_or(f64::INFINITY)
        .total_cmp(&b.unwrap_or(f64::INFINITY))
}

/// Aggregates ledger state across warehouses and moves stock between them.
pub struct WarehouseAllocator<S, C> {
    store: Arc<S>,
    catalog: Arc<C>,
    clock: Arc<dyn Clock>,
    retry_policy: RetryPolicy,
}

impl<S, C> Clone for WarehouseAllocator<S, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            catalog: Arc::clone(&self.catalog),
            clock: Arc::clone(&self.clock),
            retry_policy: self.retry_policy.clone(),
        }
    }
}

impl<S, C> WarehouseAllocator<S, C>
where
    S: InventoryStore,
    C: Catalog,
{
    /// Create an allocator over shared collaborators
    #[must_use]
    pub fn new(
        store: Arc<S>,
        catalog: Arc<C>,
        clock: Arc<dyn Clock>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            catalog,
            clock,
            retry_policy,
        }
    }

    /// Ledger position of a product in every warehouse holding it.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::NotFound`] for an unknown product
    /// - [`InventoryError::TransactionFailed`] if the store cannot be read
    pub async fn check_availability(
        &self,
        product_id: ProductId,
        required_quantity: u32,
    ) -> Result<AvailabilityReport> {
        if self.catalog.get_product(product_id).await?.is_none() {
            return Err(InventoryError::not_found("product", product_id));
        }

        let warehouses = self.stock_by_warehouse(product_id).await?;
        let total_available: u64 = warehouses
            .iter()
            .map(|w| u64::from(w.available_quantity))
            .sum();

        Ok(AvailabilityReport {
            product_id,
            required_quantity,
            total_available,
            is_available: total_available >= u64::from(required_quantity),
            warehouses,
        })
    }

    /// Nearest-first split of `required_quantity`.
    ///
    /// Empty when the product is not available in that quantity.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::NotFound`] for an unknown product
    /// - [`InventoryError::TransactionFailed`] if the store cannot be read
    #[tracing::instrument(skip_all, fields(product_id = %product_id, required_quantity = required_quantity))]
    pub async fn optimize_allocation(
        &self,
        product_id: ProductId,
        required_quantity: u32,
        customer: Option<(f64, f64)>,
    ) -> Result<Vec<Allocation>> {
        let report = self.check_availability(product_id, required_quantity).await?;
        if !report.is_available {
            tracing::debug!(
                total_available = report.total_available,
                "Not enough stock to allocate"
            );
            return Ok(Vec::new());
        }

        let allocations = plan_allocation(&report.warehouses, required_quantity, customer);
        tracing::debug!(warehouses = allocations.len(), "Allocation planned");
        Ok(allocations)
    }

    /// Move stock atomically between two warehouses.
    ///
    /// Either both ledger sides change and a `Completed` transfer is recorded, or
    /// nothing changes. Transaction failures are retried with backoff.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::InvalidArgument`] for a zero quantity or identical warehouses
    /// - [`InventoryError::NotFound`] for an unknown product or warehouse
    /// - [`InventoryError::InsufficientStock`] when the source lacks the stock
    /// - [`InventoryError::TransactionFailed`] when retries are exhausted
    #[tracing::instrument(
        skip_all,
        fields(
            product_id = %request.product_id,
            from_warehouse_id = %request.from_warehouse_id,
            to_warehouse_id = %request.to_warehouse_id,
            quantity = request.quantity,
        )
    )]
    pub async fn transfer_stock(&self, request: TransferRequest) -> Result<StockTransfer> {
        if request.from_warehouse_id == request.to_warehouse_id {
            return Err(InventoryError::InvalidArgument(
                "source and destination warehouses must differ".to_string(),
            ));
        }
        if request.quantity == 0 {
            return Err(InventoryError::InvalidArgument(
                "quantity must be positive".to_string(),
            ));
        }
        self.ensure_known(&request).await?;

        let result = retry_with_predicate(
            &self.retry_policy,
            || self.try_transfer(&request),
            InventoryError::is_retryable,
        )
        .await;

        match &result {
            Ok(transfer) => {
                metrics::record_transfer_completed(transfer.quantity);
                tracing::info!(transfer_id = %transfer.id, "Transfer completed");
            }
            Err(error @ InventoryError::InsufficientStock { .. }) => {
                metrics::record_transfer_failed();
                tracing::info!(%error, "Transfer rejected");
            }
            Err(error) => {
                metrics::record_transfer_failed();
                tracing::error!(%error, "Transfer failed");
            }
        }
        result
    }

    async fn try_transfer(&self, request: &TransferRequest) -> Result<StockTransfer> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        match Self::transfer_within(&mut tx, request, now).await {
            Ok(transfer) => {
                tx.commit().await?;
                Ok(transfer)
            }
            Err(error) => {
                discard(tx).await;
                Err(error)
            }
        }
    }

    async fn transfer_within(
        tx: &mut S::Tx,
        request: &TransferRequest,
        now: DateTime<Utc>,
    ) -> Result<StockTransfer> {
        let product_id = request.product_id;
        let (from, to) = (request.from_warehouse_id, request.to_warehouse_id);

        let source = if from < to {
            let source = tx.lock_item(product_id, from).await?;
            tx.lock_item(product_id, to).await?;
            source
        } else {
            tx.lock_item(product_id, to).await?;
            tx.lock_item(product_id, from).await?
        };

        let available = source.map_or(0, |item| item.available_quantity);
        if available < request.quantity {
            return Err(InventoryError::InsufficientStock {
                requested: u64::from(request.quantity),
                available: u64::from(available),
            });
        }

        let delta = i64::from(request.quantity);
        tx.adjust_available(product_id, from, -delta, now).await?;
        tx.adjust_available(product_id, to, delta, now).await?;

        let transfer = StockTransfer {
            id: TransferId::new(),
            product_id,
            from_warehouse_id: from,
            to_warehouse_id: to,
            quantity: request.quantity,
            reason: request.reason.clone(),
            notes: request.notes.clone(),
            transfer_date: now,
            status: TransferStatus::Completed,
        };
        tx.insert_transfer(&transfer).await?;

        Ok(transfer)
    }

    /// Transfers recorded for a product, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::TransactionFailed`] if the store cannot be read.
    pub async fn transfer_history(&self, product_id: ProductId) -> Result<Vec<StockTransfer>> {
        Ok(self.store.transfers_for_product(product_id).await?)
    }

    /// Capacity usage of one warehouse.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::NotFound`] for an unknown warehouse
    /// - [`InventoryError::TransactionFailed`] if the store cannot be read
    pub async fn warehouse_utilization(&self, warehouse_id: WarehouseId) -> Result<UtilizationReport> {
        let warehouse = self
            .catalog
            .get_warehouse(warehouse_id)
            .await?
            .ok_or_else(|| InventoryError::not_found("warehouse", warehouse_id))?;
        let items = self.store.items_for_warehouse(warehouse_id).await?;
        Ok(UtilizationReport::new(&warehouse, &items))
    }

    /// Capacity usage of every active warehouse.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::TransactionFailed`] if the store cannot be read.
    pub async fn network_utilization(&self) -> Result<Vec<UtilizationReport>> {
        let warehouses = self.catalog.list_active_warehouses().await?;
        let mut reports = Vec::with_capacity(warehouses.len());
        for warehouse in &warehouses {
            let items = self.store.items_for_warehouse(warehouse.id).await?;
            reports.push(UtilizationReport::new(warehouse, &items));
        }
        Ok(reports)
    }

    async fn stock_by_warehouse(&self, product_id: ProductId) -> Result<Vec<WarehouseStock>> {
        let items = self.store.items_for_product(product_id).await?;
        let ids: Vec<WarehouseId> = items.iter().map(|item| item.warehouse_id).collect();
        let warehouses: HashMap<WarehouseId, Warehouse> = self
            .catalog
            .get_warehouses_by_ids(&ids)
            .await?
            .into_iter()
            .map(|w| (w.id, w))
            .collect();

        Ok(items
            .iter()
            .filter_map(|item| match warehouses.get(&item.warehouse_id) {
                Some(warehouse) => Some(WarehouseStock::new(warehouse, item)),
                None => {
                    tracing::warn!(
                        warehouse_id = %item.warehouse_id,
                        "Ledger row references a warehouse missing from the catalog"
                    );
                    None
                }
            })
            .collect())
    }

    async fn ensure_known(&self, request: &TransferRequest) -> Result<()> {
        if self.catalog.get_product(request.product_id).await?.is_none() {
            return Err(InventoryError::not_found("product", request.product_id));
        }
        for warehouse_id in [request.from_warehouse_id, request.to_warehouse_id] {
            if self.catalog.get_warehouse(warehouse_id).await?.is_none() {
                return Err(InventoryError::not_found("warehouse", warehouse_id));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use stock_ledger_core::ErrorKind;
    use stock_ledger_testing::{
        FaultPlan, InMemoryCatalog, InMemoryInventoryStore, fixtures, test_clock,
    };

    fn stock(code: &str, available: u32, coordinates: Option<(f64, f64)>) -> WarehouseStock {
        WarehouseStock {
            warehouse_id: WarehouseId::new(),
            warehouse_code: code.to_string(),
            warehouse_name: format!("Warehouse {code}"),
            available_quantity: available,
            reserved_quantity: 0,
            latitude: coordinates.map(|(lat, _)| lat),
            longitude: coordinates.map(|(_, lon)| lon),
            is_active: true,
        }
    }

    #[test]
    fn nearest_warehouse_goes_first() {
        let far = stock("NYC", 100, Some((40.7128, -74.0060)));
        let near = stock("LAX", 100, Some((34.0522, -118.2437)));
        let customer = Some((37.7749, -122.4194));

        let plan = plan_allocation(&[far, near.clone()], 50, customer);

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].warehouse_id, near.warehouse_id);
        assert_eq!(plan[0].quantity, 50);
        assert_eq!(plan[0].priority, 1);
        assert_eq!(plan[0].allocation_reason, AllocationReason::ClosestWarehouse);
    }

    #[test]
    fn missing_coordinates_sort_last() {
        let unknown = stock("UNK", 500, None);
        let near = stock("SFO", 10, Some((37.6, -122.4)));

        let plan = plan_allocation(&[unknown.clone(), near.clone()], 30, Some((37.7749, -122.4194)));

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].warehouse_id, near.warehouse_id);
        assert_eq!(plan[0].quantity, 10);
        assert_eq!(plan[1].warehouse_id, unknown.warehouse_id);
        assert_eq!(plan[1].quantity, 20);
        assert_eq!(plan[1].priority, 2);
        assert_eq!(plan[1].allocation_reason, AllocationReason::BestAvailableStock);
        assert_eq!(plan[1].distance_km, None);
    }

    #[test]
    fn without_customer_largest_stock_goes_first() {
        let small = stock("A", 5, Some((0.0, 0.0)));
        let large = stock("B", 50, Some((10.0, 10.0)));

        let plan = plan_allocation(&[small, large.clone()], 20, None);

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].warehouse_id, large.warehouse_id);
        assert_eq!(plan[0].allocation_reason, AllocationReason::BestAvailableStock);
    }

    #[test]
    fn inactive_and_empty_warehouses_are_skipped() {
        let mut inactive = stock("OFF", 100, None);
        inactive.is_active = false;
        let empty = stock("EMPTY", 0, None);
        let live = stock("LIVE", 8, None);

        assert!(plan_allocation(&[inactive.clone(), empty.clone(), live.clone()], 10, None).is_empty());

        let plan = plan_allocation(&[inactive, empty, live.clone()], 8, None);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].warehouse_id, live.warehouse_id);
    }

    #[test]
    fn reason_labels() {
        assert_eq!(AllocationReason::ClosestWarehouse.to_string(), "Closest warehouse");
        assert_eq!(
            serde_json::to_value(AllocationReason::BestAvailableStock).unwrap(),
            "Best available stock"
        );
    }

    proptest! {
        #[test]
        fn plan_never_over_allocates(
            levels in proptest::collection::vec((0_u32..200, proptest::option::of((-90.0_f64..90.0, -180.0_f64..180.0))), 0..8),
            required in 0_u32..1_000,
            customer in proptest::option::of((-90.0_f64..90.0, -180.0_f64..180.0)),
        ) {
            let warehouses: Vec<WarehouseStock> = levels
                .iter()
                .enumerate()
                .map(|(i, (available, coords))| stock(&format!("W{i}"), *available, *coords))
                .collect();

            let plan = plan_allocation(&warehouses, required, customer);
            let total: u64 = plan.iter().map(|a| u64::from(a.quantity)).sum();
            let coverable: u64 = warehouses.iter().map(|w| u64::from(w.available_quantity)).sum();

            if plan.is_empty() {
                prop_assert!(required == 0 || coverable < u64::from(required));
            } else {
                prop_assert_eq!(total, u64::from(required));
            }
            for (allocation, priority) in plan.iter().zip(1_u32..) {
                let source = warehouses.iter().find(|w| w.warehouse_id == allocation.warehouse_id).unwrap();
                prop_assert!(allocation.quantity > 0);
                prop_assert!(allocation.quantity <= source.available_quantity);
                prop_assert_eq!(allocation.priority, priority);
            }
        }
    }

    struct Harness {
        allocator: WarehouseAllocator<InMemoryInventoryStore, InMemoryCatalog>,
        store: InMemoryInventoryStore,
        product: ProductId,
        w1: WarehouseId,
        w2: WarehouseId,
    }

    async fn harness(w1_stock: u32) -> Harness {
        let product = fixtures::product("SKU-1", 20, 1_000);
        let w1 = fixtures::warehouse("W1", 500, None);
        let w2 = fixtures::warehouse("W2", 0, None);
        let catalog = InMemoryCatalog::new()
            .with_product(product.clone())
            .with_warehouse(w1.clone())
            .with_warehouse(w2.clone());
        let store = InMemoryInventoryStore::new();
        store
            .receive_stock(product.id, w1.id, w1_stock, test_clock().now())
            .await
            .unwrap();

        let policy = RetryPolicy::builder()
            .max_retries(2)
            .initial_delay(std::time::Duration::from_millis(1))
            .build();

        Harness {
            allocator: WarehouseAllocator::new(
                Arc::new(store.clone()),
                Arc::new(catalog),
                Arc::new(test_clock()),
                policy,
            ),
            store,
            product: product.id,
            w1: w1.id,
            w2: w2.id,
        }
    }

    fn request(h: &Harness, quantity: u32) -> TransferRequest {
        TransferRequest {
            product_id: h.product,
            from_warehouse_id: h.w1,
            to_warehouse_id: h.w2,
            quantity,
            reason: "rebalance".to_string(),
            notes: None,
        }
    }

    async fn available(h: &Harness, warehouse: WarehouseId) -> u32 {
        h.store
            .get_item(h.product, warehouse)
            .await
            .unwrap()
            .map_or(0, |item| item.available_quantity)
    }

    #[tokio::test]
    async fn transfer_rejects_same_warehouse() {
        let h = harness(10).await;
        let mut same = request(&h, 1);
        same.to_warehouse_id = h.w1;

        let error = h.allocator.transfer_stock(same).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn transfer_retries_transient_failures() {
        let h = harness(10).await;
        h.store.inject_fault(FaultPlan {
            fail_on_write: Some(2),
            ..FaultPlan::default()
        });

        let transfer = h.allocator.transfer_stock(request(&h, 4)).await.unwrap();

        assert_eq!(transfer.status, TransferStatus::Completed);
        assert_eq!(available(&h, h.w1).await, 6);
        assert_eq!(available(&h, h.w2).await, 4);
        assert_eq!(h.store.all_transfers().await.len(), 1);
    }

    #[tokio::test]
    async fn transfer_does_not_replay_constraint_violations() {
        let h = harness(10).await;
        h.store.inject_fault(FaultPlan {
            reject_on_write: Some(1),
            ..FaultPlan::default()
        });

        let error = h.allocator.transfer_stock(request(&h, 4)).await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::TransactionFailed);
        assert!(!error.is_retryable());
        assert_eq!(available(&h, h.w1).await, 10);
        assert_eq!(available(&h, h.w2).await, 0);
        assert!(h.store.all_transfers().await.is_empty());
    }

    #[tokio::test]
    async fn utilization_of_zero_capacity_is_zero() {
        let h = harness(10).await;
        h.allocator.transfer_stock(request(&h, 4)).await.unwrap();

        let w1 = h.allocator.warehouse_utilization(h.w1).await.unwrap();
        assert_eq!(w1.used_capacity, 6);
        assert!((w1.utilization_percentage - 1.2).abs() < 1e-9);

        let w2 = h.allocator.warehouse_utilization(h.w2).await.unwrap();
        assert_eq!(w2.used_capacity, 4);
        assert!(w2.utilization_percentage.abs() < f64::EPSILON);

        let network = h.allocator.network_utilization().await.unwrap();
        assert_eq!(network.len(), 2);
    }

    #[tokio::test]
    async fn utilization_of_unknown_warehouse_is_not_found() {
        let h = harness(10).await;
        let error = h
            .allocator
            .warehouse_utilization(WarehouseId::new())
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }
}

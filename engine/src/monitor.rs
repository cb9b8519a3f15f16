//! Low-stock monitor.
//!
//! Read-only over the ledger. The only write it performs is a product's reorder
//! level, which lives in the catalog.

use crate::metrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use stock_ledger_core::environment::Clock;
use stock_ledger_core::error::Result;
use stock_ledger_core::{
    Catalog, InventoryItem, InventoryStore, Money, Product, ProductId, Warehouse, WarehouseId,
};

/// Smallest quantity a reorder suggestion will propose
pub const MIN_REORDER_QUANTITY: u32 = 10;

/// Stock at or below this is at least `High` severity
pub const HIGH_SEVERITY_STOCK: u32 = 5;

/// Total stock at or below this marks a product critical in the stock-level report
pub const CRITICAL_STOCK: u64 = 5;

/// Urgency of a low-stock alert, ordered least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AlertSeverity {
    /// At or below reorder level
    Low,
    /// At or below half the reorder level
    Medium,
    /// Five units or fewer
    High,
    /// Out of stock
    Critical,
}

impl AlertSeverity {
    /// Classify a stock position.
    #[must_use]
    pub fn classify(current_stock: u32, reorder_level: u32) -> Self {
        if current_stock == 0 {
            Self::Critical
        } else if current_stock <= HIGH_SEVERITY_STOCK {
            Self::High
        } else if f64::from(current_stock) <= f64::from(reorder_level) * 0.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Suggested reorder quantity for a position.
///
/// `max(round(level * 1.5) - current, level - current)`, floored at
/// [`MIN_REORDER_QUANTITY`].
#[must_use]
pub fn suggested_reorder_quantity(current_stock: u32, reorder_level: u32) -> u32 {
    let target_stock = (f64::from(reorder_level) * 1.5).round();
    let to_target = (target_stock - f64::from(current_stock)).max(0.0);
    let shortage = f64::from(reorder_level.saturating_sub(current_stock));

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Non-negative, ≤ 1.5 * u32::MAX
    let suggested = to_target.max(shortage).min(f64::from(u32::MAX)) as u32;
    suggested.max(MIN_REORDER_QUANTITY)
}

/// A `(product, warehouse)` pair at or below its reorder level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockAlert {
    /// Product
    pub product_id: ProductId,
    /// Product SKU
    pub sku: String,
    /// Product name
    pub product_name: String,
    /// Warehouse
    pub warehouse_id: WarehouseId,
    /// Warehouse code
    pub warehouse_code: String,
    /// Warehouse name
    pub warehouse_name: String,
    /// Ledger available quantity
    pub current_stock: u32,
    /// Product reorder level
    pub reorder_level: u32,
    /// Urgency
    pub severity: AlertSeverity,
    /// When the scan ran
    pub alert_date: DateTime<Utc>,
}

/// Proposed purchase for one alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderSuggestion {
    /// Product
    pub product_id: ProductId,
    /// Product SKU
    pub sku: String,
    /// Product name
    pub product_name: String,
    /// Warehouse to restock
    pub warehouse_id: WarehouseId,
    /// Warehouse code
    pub warehouse_code: String,
    /// Ledger available quantity
    pub current_stock: u32,
    /// Product reorder level
    pub reorder_level: u32,
    /// Units to order
    pub suggested_quantity: u32,
    /// `suggested_quantity * price`
    pub estimated_cost: Money,
    /// Urgency of the underlying alert
    pub severity: AlertSeverity,
}

/// Per-warehouse line of a [`StockLevelReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseStockLevel {
    /// Warehouse
    pub warehouse_id: WarehouseId,
    /// Warehouse code
    pub warehouse_code: String,
    /// Warehouse name
    pub warehouse_name: String,
    /// Ledger available quantity
    pub available_quantity: u32,
    /// Units held by active reservations
    pub reserved_quantity: u64,
}

/// Stock position of one product across the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevelReport {
    /// Product
    pub product_id: ProductId,
    /// Product SKU
    pub sku: String,
    /// Product name
    pub product_name: String,
    /// Product reorder level
    pub reorder_level: u32,
    /// Σ available over warehouses
    pub total_available_stock: u64,
    /// Σ active reservations over warehouses
    pub total_reserved_stock: u64,
    /// `total_available_stock <= reorder_level`
    pub is_low_stock: bool,
    /// `total_available_stock <= 5`
    pub is_critical_stock: bool,
    /// Breakdown
    pub warehouses: Vec<WarehouseStockLevel>,
}

/// Derives alerts, reorder suggestions and stock-level reports.
pub struct LowStockMonitor<S, C> {
    store: Arc<S>,
    catalog: Arc<C>,
    clock: Arc<dyn Clock>,
}

impl<S, C> Clone for LowStockMonitor<S, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            catalog: Arc::clone(&self.catalog),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S, C> LowStockMonitor<S, C>
where
    S: InventoryStore,
    C: Catalog,
{
    /// Create a monitor over shared collaborators
    #[must_use]
    pub fn new(store: Arc<S>, catalog: Arc<C>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            catalog,
            clock,
        }
    }

    /// One alert per `(active product, warehouse)` pair with
    /// `available <= reorder_level`, most urgent first.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::TransactionFailed`](stock_ledger_core::InventoryError::TransactionFailed)
    /// if the store or catalog cannot be read.
    #[tracing::instrument(skip_all)]
    pub async fn low_stock_alerts(&self) -> Result<Vec<LowStockAlert>> {
        let now = self.clock.now();
        let mut alerts = Vec::new();

        for (product, rows) in self.positions().await? {
            for (item, warehouse) in rows {
                if item.available_quantity > product.reorder_level {
                    continue;
                }
                alerts.push(LowStockAlert {
                    product_id: product.id,
                    sku: product.sku.clone(),
                    product_name: product.name.clone(),
                    warehouse_id: warehouse.id,
                    warehouse_code: warehouse.code.clone(),
                    warehouse_name: warehouse.name.clone(),
                    current_stock: item.available_quantity,
                    reorder_level: product.reorder_level,
                    severity: AlertSeverity::classify(
                        item.available_quantity,
                        product.reorder_level,
                    ),
                    alert_date: now,
                });
            }
        }

        alerts.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then(a.current_stock.cmp(&b.current_stock))
        });

        metrics::record_low_stock_alerts(alerts.len());
        tracing::debug!(count = alerts.len(), "Low-stock scan complete");
        Ok(alerts)
    }

    /// One suggestion per alert, in alert order.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::TransactionFailed`](stock_ledger_core::InventoryError::TransactionFailed)
    /// if the store or catalog cannot be read.
    pub async fn reorder_suggestions(&self) -> Result<Vec<ReorderSuggestion>> {
        let alerts = self.low_stock_alerts().await?;
        let mut prices: HashMap<ProductId, Money> = HashMap::new();
        let mut suggestions = Vec::with_capacity(alerts.len());

        for alert in alerts {
            let price = match prices.get(&alert.product_id) {
                Some(price) => *price,
                None => {
                    let price = self
                        .catalog
                        .get_product(alert.product_id)
                        .await?
                        .map_or(Money::default(), |p| p.price);
                    prices.insert(alert.product_id, price);
                    price
                }
            };
            let suggested_quantity =
                suggested_reorder_quantity(alert.current_stock, alert.reorder_level);

            suggestions.push(ReorderSuggestion {
                product_id: alert.product_id,
                sku: alert.sku,
                product_name: alert.product_name,
                warehouse_id: alert.warehouse_id,
                warehouse_code: alert.warehouse_code,
                current_stock: alert.current_stock,
                reorder_level: alert.reorder_level,
                suggested_quantity,
                estimated_cost: price.times(suggested_quantity),
                severity: alert.severity,
            });
        }
        Ok(suggestions)
    }

    /// Network-wide stock position of every active product, by SKU.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::TransactionFailed`](stock_ledger_core::InventoryError::TransactionFailed)
    /// if the store or catalog cannot be read.
    pub async fn stock_level_report(&self) -> Result<Vec<StockLevelReport>> {
        let now = self.clock.now();
        let mut reports = Vec::new();

        for (product, rows) in self.positions().await? {
            let mut warehouses = Vec::with_capacity(rows.len());
            for (item, warehouse) in rows {
                let reserved_quantity = self
                    .store
                    .active_reserved_quantity(product.id, warehouse.id, now)
                    .await?;
                warehouses.push(WarehouseStockLevel {
                    warehouse_id: warehouse.id,
                    warehouse_code: warehouse.code,
                    warehouse_name: warehouse.name,
                    available_quantity: item.available_quantity,
                    reserved_quantity,
                });
            }

            let total_available_stock: u64 = warehouses
                .iter()
                .map(|w| u64::from(w.available_quantity))
                .sum();
            let total_reserved_stock = warehouses.iter().map(|w| w.reserved_quantity).sum();

            reports.push(StockLevelReport {
                product_id: product.id,
                sku: product.sku,
                product_name: product.name,
                reorder_level: product.reorder_level,
                total_available_stock,
                total_reserved_stock,
                is_low_stock: total_available_stock <= u64::from(product.reorder_level),
                is_critical_stock: total_available_stock <= CRITICAL_STOCK,
                warehouses,
            });
        }
        Ok(reports)
    }

    /// Set a product's reorder level. `false` when the product is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::TransactionFailed`](stock_ledger_core::InventoryError::TransactionFailed)
    /// if the catalog cannot be updated.
    #[tracing::instrument(skip_all, fields(product_id = %product_id, reorder_level = reorder_level))]
    pub async fn update_reorder_level(&self, product_id: ProductId, reorder_level: u32) -> Result<bool> {
        let updated = self
            .catalog
            .update_reorder_level(product_id, reorder_level, self.clock.now())
            .await?;
        if updated {
            tracing::info!("Reorder level updated");
        } else {
            tracing::debug!("Unknown product, reorder level unchanged");
        }
        Ok(updated)
    }

    /// Ledger rows of every active product, paired with their warehouses.
    async fn positions(&self) -> Result<Vec<(Product, Vec<(InventoryItem, Warehouse)>)>> {
        let products = self.catalog.list_active_products().await?;
        let mut positions = Vec::with_capacity(products.len());

        for product in products {
            let items = self.store.items_for_product(product.id).await?;
            let ids: Vec<WarehouseId> = items.iter().map(|item| item.warehouse_id).collect();
            let mut warehouses: HashMap<WarehouseId, Warehouse> = self
                .catalog
                .get_warehouses_by_ids(&ids)
                .await?
                .into_iter()
                .map(|w| (w.id, w))
                .collect();

            let rows = items
                .into_iter()
                .filter_map(|item| {
                    let warehouse = warehouses.remove(&item.warehouse_id)?;
                    Some((item, warehouse))
                })
                .collect();
            positions.push((product, rows));
        }
        Ok(positions)
    }
}

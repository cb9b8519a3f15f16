//! In-memory catalog.

use chrono::{DateTime, Utc};
use stock_ledger_core::{Catalog, Product, ProductId, StoreError, Warehouse, WarehouseId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// `HashMap`-backed catalog.
///
/// Clones share the same maps, so a test can keep a handle to flip flags or
/// inspect reorder levels after the engine has taken its own.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    products: Arc<RwLock<HashMap<ProductId, Product>>>,
    warehouses: Arc<RwLock<HashMap<WarehouseId, Warehouse>>>,
}

impl InMemoryCatalog {
    /// Create an empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style product registration
    #[must_use]
    pub fn with_product(self, product: Product) -> Self {
        self.insert_product(product);
        self
    }

    /// Builder-style warehouse registration
    #[must_use]
    pub fn with_warehouse(self, warehouse: Warehouse) -> Self {
        self.insert_warehouse(warehouse);
        self
    }

    /// Insert or replace a product
    pub fn insert_product(&self, product: Product) {
        self.products.write().unwrap().insert(product.id, product);
    }

    /// Insert or replace a warehouse
    pub fn insert_warehouse(&self, warehouse: Warehouse) {
        self.warehouses
            .write()
            .unwrap()
            .insert(warehouse.id, warehouse);
    }

    /// Current copy of a product
    #[must_use]
    pub fn product(&self, id: ProductId) -> Option<Product> {
        self.products.read().unwrap().get(&id).cloned()
    }
}

impl Catalog for InMemoryCatalog {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.product(id))
    }

    async fn get_warehouse(&self, id: WarehouseId) -> Result<Option<Warehouse>, StoreError> {
        Ok(self.warehouses.read().unwrap().get(&id).cloned())
    }

    async fn get_warehouses_by_ids(
        &self,
        ids: &[WarehouseId],
    ) -> Result<Vec<Warehouse>, StoreError> {
        let warehouses = self.warehouses.read().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| warehouses.get(id).cloned())
            .collect())
    }

    async fn list_active_warehouses(&self) -> Result<Vec<Warehouse>, StoreError> {
        let mut active: Vec<Warehouse> = self
            .warehouses
            .read()
            .unwrap()
            .values()
            .filter(|w| w.is_active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(active)
    }

    async fn list_active_products(&self) -> Result<Vec<Product>, StoreError> {
        let mut active: Vec<Product> = self
            .products
            .read()
            .unwrap()
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.sku.cmp(&b.sku));
        Ok(active)
    }

    async fn update_reorder_level(
        &self,
        id: ProductId,
        reorder_level: u32,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut products = self.products.write().unwrap();
        let Some(product) = products.get_mut(&id) else {
            return Ok(false);
        };
        product.reorder_level = reorder_level;
        product.updated_at = now;
        Ok(true)
    }
}

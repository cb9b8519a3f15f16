//! `PostgreSQL` catalog.

use crate::rows::{self, PRODUCT_COLUMNS, WAREHOUSE_COLUMNS, to_db};
use crate::store_error;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use stock_ledger_core::{Catalog, Product, ProductId, StoreError, Warehouse, WarehouseId};
use uuid::Uuid;

/// Catalog backed by the `products` and `warehouses` tables.
#[derive(Clone, Debug)]
pub struct PostgresCatalog {
    pool: PgPool,
}

impl PostgresCatalog {
    /// Create a catalog over an existing pool
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert or replace a product.
    ///
    /// Catalog maintenance belongs to the catalog service; this is its write path
    /// into the shared schema.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    pub async fn upsert_product(&self, product: &Product) -> Result<(), StoreError> {
        let price_cents = i64::try_from(product.price.cents())
            .map_err(|_| StoreError::Constraint(format!("price out of range: {}", product.price)))?;

        sqlx::query(
            r"
            INSERT INTO products (id, sku, name, reorder_level, price_cents, is_active, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                sku = EXCLUDED.sku,
                name = EXCLUDED.name,
                reorder_level = EXCLUDED.reorder_level,
                price_cents = EXCLUDED.price_cents,
                is_active = EXCLUDED.is_active,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(product.id.as_uuid())
        .bind(&product.sku)
        .bind(&product.name)
        .bind(to_db("reorder_level", product.reorder_level)?)
        .bind(price_cents)
        .bind(product.is_active)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("Failed to upsert product", &e))?;
        Ok(())
    }

    /// Insert or replace a warehouse.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    pub async fn upsert_warehouse(&self, warehouse: &Warehouse) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO warehouses (id, code, name, capacity, latitude, longitude, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                code = EXCLUDED.code,
                name = EXCLUDED.name,
                capacity = EXCLUDED.capacity,
                latitude = EXCLUDED.latitude,
                longitude = EXCLUDED.longitude,
                is_active = EXCLUDED.is_active
            ",
        )
        .bind(warehouse.id.as_uuid())
        .bind(&warehouse.code)
        .bind(&warehouse.name)
        .bind(to_db("capacity", warehouse.capacity)?)
        .bind(warehouse.latitude)
        .bind(warehouse.longitude)
        .bind(warehouse.is_active)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("Failed to upsert warehouse", &e))?;
        Ok(())
    }
}

impl Catalog for PostgresCatalog {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error("Failed to load product", &e))?;
        row.as_ref().map(rows::product).transpose()
    }

    async fn get_warehouse(&self, id: WarehouseId) -> Result<Option<Warehouse>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {WAREHOUSE_COLUMNS} FROM warehouses WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("Failed to load warehouse", &e))?;
        row.as_ref().map(rows::warehouse).transpose()
    }

    async fn get_warehouses_by_ids(
        &self,
        ids: &[WarehouseId],
    ) -> Result<Vec<Warehouse>, StoreError> {
        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let records = sqlx::query(&format!(
            "SELECT {WAREHOUSE_COLUMNS} FROM warehouses WHERE id = ANY($1) ORDER BY code"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("Failed to load warehouses", &e))?;
        records.iter().map(rows::warehouse).collect()
    }

    async fn list_active_warehouses(&self) -> Result<Vec<Warehouse>, StoreError> {
        let records = sqlx::query(&format!(
            "SELECT {WAREHOUSE_COLUMNS} FROM warehouses WHERE is_active ORDER BY code"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("Failed to list warehouses", &e))?;
        records.iter().map(rows::warehouse).collect()
    }

    async fn list_active_products(&self) -> Result<Vec<Product>, StoreError> {
        let records = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE is_active ORDER BY sku"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("Failed to list products", &e))?;
        records.iter().map(rows::product).collect()
    }

    async fn update_reorder_level(
        &self,
        id: ProductId,
        reorder_level: u32,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE products SET reorder_level = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(to_db("reorder_level", reorder_level)?)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("Failed to update reorder level", &e))?;
        Ok(result.rows_affected() == 1)
    }
}

//! `PostgreSQL` inventory store.

use crate::rows::{self, ITEM_COLUMNS, RESERVATION_COLUMNS, TRANSFER_COLUMNS, to_db, to_sum};
use crate::store_error;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use stock_ledger_core::{
    InventoryItem, InventoryStore, LedgerTransaction, ProductId, ReservationId, StockReservation,
    StockTransfer, StoreError, WarehouseId,
};

const ACTIVE_SUM_SQL: &str = r"
    SELECT COALESCE(SUM(quantity), 0)::BIGINT
    FROM stock_reservations
    WHERE product_id = $1
      AND warehouse_id = $2
      AND released_at IS NULL
      AND expires_at > $3
";

/// Inventory store backed by `inventory_items`, `stock_reservations` and
/// `stock_transfers`.
#[derive(Clone, Debug)]
pub struct PostgresInventoryStore {
    pool: PgPool,
}

impl PostgresInventoryStore {
    /// Create a store over an existing pool
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Underlying pool
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl InventoryStore for PostgresInventoryStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("Failed to start transaction", &e))?;
        Ok(PostgresTransaction { tx })
    }

    async fn get_item(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<InventoryItem>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items WHERE product_id = $1 AND warehouse_id = $2"
        ))
        .bind(product_id.as_uuid())
        .bind(warehouse_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("Failed to load inventory item", &e))?;
        row.as_ref().map(rows::item).transpose()
    }

    async fn items_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<InventoryItem>, StoreError> {
        let records = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items WHERE product_id = $1 ORDER BY warehouse_id"
        ))
        .bind(product_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("Failed to load inventory items", &e))?;
        records.iter().map(rows::item).collect()
    }

    async fn items_for_warehouse(
        &self,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<InventoryItem>, StoreError> {
        let records = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items WHERE warehouse_id = $1 ORDER BY product_id"
        ))
        .bind(warehouse_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("Failed to load inventory items", &e))?;
        records.iter().map(rows::item).collect()
    }

    async fn active_reserved_quantity(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let (sum,): (i64,) = sqlx::query_as(ACTIVE_SUM_SQL)
            .bind(product_id.as_uuid())
            .bind(warehouse_id.as_uuid())
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| store_error("Failed to sum active reservations", &e))?;
        to_sum(sum)
    }

    async fn get_reservation(
        &self,
        id: &ReservationId,
    ) -> Result<Option<StockReservation>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM stock_reservations WHERE reservation_id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("Failed to load reservation", &e))?;
        row.as_ref().map(rows::reservation).transpose()
    }

    async fn active_reservations_for_product(
        &self,
        product_id: ProductId,
        now: DateTime<Utc>,
    ) -> Result<Vec<StockReservation>, StoreError> {
        let records = sqlx::query(&format!(
            r"
            SELECT {RESERVATION_COLUMNS}
            FROM stock_reservations
            WHERE product_id = $1 AND released_at IS NULL AND expires_at > $2
            ORDER BY created_at ASC
            "
        ))
        .bind(product_id.as_uuid())
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("Failed to load active reservations", &e))?;
        records.iter().map(rows::reservation).collect()
    }

    async fn mark_released(
        &self,
        id: &ReservationId,
        now: DateTime<Utc>,
    ) -> Result<Option<StockReservation>, StoreError> {
        let row = sqlx::query(&format!(
            r"
            UPDATE stock_reservations
            SET released_at = $2
            WHERE reservation_id = $1 AND released_at IS NULL
            RETURNING {RESERVATION_COLUMNS}
            "
        ))
        .bind(id.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("Failed to release reservation", &e))?;
        row.as_ref().map(rows::reservation).transpose()
    }

    async fn extend_reservation(
        &self,
        id: &ReservationId,
        additional_minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<StockReservation>, StoreError> {
        let row = sqlx::query(&format!(
            r"
            UPDATE stock_reservations
            SET expires_at = expires_at + make_interval(mins => $2)
            WHERE reservation_id = $1 AND released_at IS NULL AND expires_at > $3
            RETURNING {RESERVATION_COLUMNS}
            "
        ))
        .bind(id.as_str())
        .bind(to_db("additional_minutes", additional_minutes)?)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("Failed to extend reservation", &e))?;
        row.as_ref().map(rows::reservation).transpose()
    }

    async fn release_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<StockReservation>, StoreError> {
        let records = sqlx::query(&format!(
            r"
            UPDATE stock_reservations
            SET released_at = $1
            WHERE released_at IS NULL AND expires_at <= $1
            RETURNING {RESERVATION_COLUMNS}
            "
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("Failed to release expired reservations", &e))?;

        let mut released = records
            .iter()
            .map(rows::reservation)
            .collect::<Result<Vec<_>, _>>()?;
        released.sort_by_key(|r| r.created_at);
        Ok(released)
    }

    async fn transfers_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<StockTransfer>, StoreError> {
        let records = sqlx::query(&format!(
            r"
            SELECT {TRANSFER_COLUMNS}
            FROM stock_transfers
            WHERE product_id = $1
            ORDER BY transfer_date DESC
            "
        ))
        .bind(product_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("Failed to load transfers", &e))?;
        records.iter().map(rows::transfer).collect()
    }

    async fn receive_stock(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<InventoryItem, StoreError> {
        let row = sqlx::query(&upsert_available_sql())
            .bind(product_id.as_uuid())
            .bind(warehouse_id.as_uuid())
            .bind(to_db("quantity", quantity)?)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| store_error("Failed to receive stock", &e))?;
        rows::item(&row)
    }
}

/// Creates the row at `$3` or adds `$3` to the existing quantity.
fn upsert_available_sql() -> String {
    format!(
        r"
        INSERT INTO inventory_items
            (product_id, warehouse_id, available_quantity, reserved_quantity, last_updated)
        VALUES ($1, $2, $3, 0, $4)
        ON CONFLICT (product_id, warehouse_id) DO UPDATE SET
            available_quantity = inventory_items.available_quantity + EXCLUDED.available_quantity,
            last_updated = EXCLUDED.last_updated
        RETURNING {ITEM_COLUMNS}
        "
    )
}

/// Adds a negative `$3` to an existing row. Matches nothing when the row is absent.
fn debit_available_sql() -> String {
    format!(
        r"
        UPDATE inventory_items
        SET available_quantity = available_quantity + $3,
            last_updated = $4
        WHERE product_id = $1 AND warehouse_id = $2
        RETURNING {ITEM_COLUMNS}
        "
    )
}

/// Open database transaction. Dropping it without commit rolls it back.
#[derive(Debug)]
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

impl LedgerTransaction for PostgresTransaction {
    async fn lock_item(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<InventoryItem>, StoreError> {
        let row = sqlx::query(&format!(
            r"
            SELECT {ITEM_COLUMNS}
            FROM inventory_items
            WHERE product_id = $1 AND warehouse_id = $2
            FOR UPDATE
            "
        ))
        .bind(product_id.as_uuid())
        .bind(warehouse_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| store_error("Failed to lock inventory item", &e))?;
        row.as_ref().map(rows::item).transpose()
    }

    async fn active_reserved_quantity(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let (sum,): (i64,) = sqlx::query_as(ACTIVE_SUM_SQL)
            .bind(product_id.as_uuid())
            .bind(warehouse_id.as_uuid())
            .bind(now)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| store_error("Failed to sum active reservations", &e))?;
        to_sum(sum)
    }

    async fn find_reservation_by_key(
        &mut self,
        idempotency_key: &str,
    ) -> Result<Option<StockReservation>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM stock_reservations WHERE idempotency_key = $1"
        ))
        .bind(idempotency_key)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| store_error("Failed to look up idempotency key", &e))?;
        row.as_ref().map(rows::reservation).transpose()
    }

    async fn insert_reservation(
        &mut self,
        reservation: &StockReservation,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO stock_reservations (
                reservation_id, product_id, warehouse_id, quantity,
                created_at, expires_at, released_at, reason, idempotency_key
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(reservation.reservation_id.as_str())
        .bind(reservation.product_id.as_uuid())
        .bind(reservation.warehouse_id.as_uuid())
        .bind(to_db("quantity", reservation.quantity)?)
        .bind(reservation.created_at)
        .bind(reservation.expires_at)
        .bind(reservation.released_at)
        .bind(&reservation.reason)
        .bind(reservation.idempotency_key.as_deref())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| store_error("Failed to insert reservation", &e))?;
        Ok(())
    }

    async fn adjust_available(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        delta: i64,
        now: DateTime<Utc>,
    ) -> Result<InventoryItem, StoreError> {
        let delta = i32::try_from(delta)
            .map_err(|_| StoreError::Constraint(format!("quantity delta out of range: {delta}")))?;

        // The CHECK constraint is evaluated on the proposed insert row before
        // ON CONFLICT resolves, so debits must update the existing row directly.
        let sql = if delta < 0 {
            debit_available_sql()
        } else {
            upsert_available_sql()
        };
        let row = sqlx::query(&sql)
            .bind(product_id.as_uuid())
            .bind(warehouse_id.as_uuid())
            .bind(delta)
            .bind(now)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| store_error("Failed to adjust available quantity", &e))?
            .ok_or_else(|| {
                StoreError::Constraint(format!(
                    "cannot debit {} units from a missing ledger row",
                    delta.unsigned_abs()
                ))
            })?;
        rows::item(&row)
    }

    async fn insert_transfer(&mut self, transfer: &StockTransfer) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO stock_transfers (
                id, product_id, from_warehouse_id, to_warehouse_id, quantity,
                reason, notes, transfer_date, status
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(transfer.id.as_uuid())
        .bind(transfer.product_id.as_uuid())
        .bind(transfer.from_warehouse_id.as_uuid())
        .bind(transfer.to_warehouse_id.as_uuid())
        .bind(to_db("quantity", transfer.quantity)?)
        .bind(&transfer.reason)
        .bind(transfer.notes.as_deref())
        .bind(transfer.transfer_date)
        .bind(transfer.status.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| store_error("Failed to record transfer", &e))?;
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| store_error("Failed to commit transaction", &e))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| store_error("Failed to roll back transaction", &e))
    }
}

//! Row decoding and integer conversions.
//!
//! Quantities are `u32` in the domain and `INTEGER` in the schema; the
//! conversions below fail with a [`StoreError`] instead of wrapping.

use crate::store_error;
use sqlx::Row;
use sqlx::postgres::PgRow;
use stock_ledger_core::{
    InventoryItem, Money, Product, ProductId, ReservationId, StockReservation, StockTransfer,
    StoreError, TransferId, TransferStatus, Warehouse, WarehouseId,
};
use uuid::Uuid;

pub(crate) const ITEM_COLUMNS: &str =
    "product_id, warehouse_id, available_quantity, reserved_quantity, last_updated";

pub(crate) const RESERVATION_COLUMNS: &str = "reservation_id, product_id, warehouse_id, quantity, \
     created_at, expires_at, released_at, reason, idempotency_key";

pub(crate) const TRANSFER_COLUMNS: &str = "id, product_id, from_warehouse_id, to_warehouse_id, \
     quantity, reason, notes, transfer_date, status";

pub(crate) const PRODUCT_COLUMNS: &str =
    "id, sku, name, reorder_level, price_cents, is_active, updated_at";

pub(crate) const WAREHOUSE_COLUMNS: &str =
    "id, code, name, capacity, latitude, longitude, is_active";

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| store_error(&format!("Failed to decode {column}"), &e))
}

fn unsigned(column: &str, value: i32) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::Database(format!("{column} is negative: {value}")))
}

/// Domain quantity to `INTEGER`
pub(crate) fn to_db(column: &str, value: u32) -> Result<i32, StoreError> {
    i32::try_from(value)
        .map_err(|_| StoreError::Constraint(format!("{column} out of range: {value}")))
}

/// `BIGINT` aggregate to domain sum
pub(crate) fn to_sum(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Database(format!("negative sum: {value}")))
}

pub(crate) fn item(row: &PgRow) -> Result<InventoryItem, StoreError> {
    Ok(InventoryItem {
        product_id: ProductId::from_uuid(get(row, "product_id")?),
        warehouse_id: WarehouseId::from_uuid(get(row, "warehouse_id")?),
        available_quantity: unsigned("available_quantity", get(row, "available_quantity")?)?,
        reserved_quantity: unsigned("reserved_quantity", get(row, "reserved_quantity")?)?,
        last_updated: get(row, "last_updated")?,
    })
}

pub(crate) fn reservation(row: &PgRow) -> Result<StockReservation, StoreError> {
    Ok(StockReservation {
        reservation_id: ReservationId::new(get::<String>(row, "reservation_id")?),
        product_id: ProductId::from_uuid(get(row, "product_id")?),
        warehouse_id: WarehouseId::from_uuid(get(row, "warehouse_id")?),
        quantity: unsigned("quantity", get(row, "quantity")?)?,
        created_at: get(row, "created_at")?,
        expires_at: get(row, "expires_at")?,
        released_at: get(row, "released_at")?,
        reason: get(row, "reason")?,
        idempotency_key: get(row, "idempotency_key")?,
    })
}

pub(crate) fn transfer(row: &PgRow) -> Result<StockTransfer, StoreError> {
    let status: String = get(row, "status")?;
    let status = match status.as_str() {
        "Completed" => TransferStatus::Completed,
        "Failed" => TransferStatus::Failed,
        other => {
            return Err(StoreError::Database(format!(
                "Invalid transfer status: {other}"
            )));
        }
    };

    Ok(StockTransfer {
        id: TransferId::from_uuid(get(row, "id")?),
        product_id: ProductId::from_uuid(get(row, "product_id")?),
        from_warehouse_id: WarehouseId::from_uuid(get(row, "from_warehouse_id")?),
        to_warehouse_id: WarehouseId::from_uuid(get(row, "to_warehouse_id")?),
        quantity: unsigned("quantity", get(row, "quantity")?)?,
        reason: get(row, "reason")?,
        notes: get(row, "notes")?,
        transfer_date: get(row, "transfer_date")?,
        status,
    })
}

pub(crate) fn product(row: &PgRow) -> Result<Product, StoreError> {
    let price_cents: i64 = get(row, "price_cents")?;
    Ok(Product {
        id: ProductId::from_uuid(get(row, "id")?),
        sku: get(row, "sku")?,
        name: get(row, "name")?,
        reorder_level: unsigned("reorder_level", get(row, "reorder_level")?)?,
        price: Money::from_cents(u64::try_from(price_cents).map_err(|_| {
            StoreError::Database(format!("price_cents is negative: {price_cents}"))
        })?),
        is_active: get(row, "is_active")?,
        updated_at: get(row, "updated_at")?,
    })
}

pub(crate) fn warehouse(row: &PgRow) -> Result<Warehouse, StoreError> {
    Ok(Warehouse {
        id: WarehouseId::from_uuid(get::<Uuid>(row, "id")?),
        code: get(row, "code")?,
        name: get(row, "name")?,
        capacity: unsigned("capacity", get(row, "capacity")?)?,
        latitude: get(row, "latitude")?,
        longitude: get(row, "longitude")?,
        is_active: get(row, "is_active")?,
    })
}

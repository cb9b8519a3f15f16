//! Builders for catalog entities used across tests.

use crate::mocks::test_clock;
use stock_ledger_core::environment::Clock;
use stock_ledger_core::{Money, Product, ProductId, Warehouse, WarehouseId};

/// Active product with a fresh id.
#[must_use]
pub fn product(sku: &str, reorder_level: u32, price_cents: u64) -> Product {
    Product {
        id: ProductId::new(),
        sku: sku.to_string(),
        name: format!("Product {sku}"),
        reorder_level,
        price: Money::from_cents(price_cents),
        is_active: true,
        updated_at: test_clock().now(),
    }
}

/// Active warehouse with a fresh id and optional `(latitude, longitude)`.
#[must_use]
pub fn warehouse(code: &str, capacity: u32, coordinates: Option<(f64, f64)>) -> Warehouse {
    Warehouse {
        id: WarehouseId::new(),
        code: code.to_string(),
        name: format!("Warehouse {code}"),
        capacity,
        latitude: coordinates.map(|(lat, _)| lat),
        longitude: coordinates.map(|(_, lon)| lon),
        is_active: true,
    }
}

//! End-to-end scenarios for the stock ledger over the in-memory backend.
//!
//! Each test wires a [`StockLedger`] the way the server does, swapping in the
//! in-memory store and catalog, and drives it through the public facade.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use chrono::Duration;
use std::sync::Arc;
use stock_ledger_core::environment::Clock;
use stock_ledger_core::{
    ErrorKind, InventoryStore, Product, ReservationId, StockReservation, TransferStatus,
    Warehouse,
};
use stock_ledger_engine::{
    AlertSeverity, AllocationReason, Config, ReserveRequest, StockLedger, TransferRequest,
};
use stock_ledger_testing::{
    FaultPlan, InMemoryCatalog, InMemoryInventoryStore, MockClock, fixtures, test_clock,
};

struct World {
    ledger: StockLedger<InMemoryInventoryStore, InMemoryCatalog>,
    store: InMemoryInventoryStore,
    clock: MockClock,
    product: Product,
    w1: Warehouse,
    w2: Warehouse,
}

/// One product (reorder level 20) in two warehouses: W1 in Amsterdam, W2 in Rotterdam.
fn world(config: &Config) -> World {
    let clock = MockClock::new(test_clock().now());
    let product = fixtures::product("SKU-P", 20, 1_000);
    let w1 = fixtures::warehouse("W1", 1_000, Some((52.3676, 4.9041)));
    let w2 = fixtures::warehouse("W2", 1_000, Some((51.9244, 4.4777)));
    let catalog = InMemoryCatalog::new()
        .with_product(product.clone())
        .with_warehouse(w1.clone())
        .with_warehouse(w2.clone());
    let store = InMemoryInventoryStore::new();

    let ledger = StockLedger::new(
        Arc::new(store.clone()),
        Arc::new(catalog),
        Arc::new(clock.clone()),
        config,
    );

    World {
        ledger,
        store,
        clock,
        product,
        w1,
        w2,
    }
}

async fn stock(world: &World, warehouse: &Warehouse, quantity: u32) {
    world
        .store
        .receive_stock(world.product.id, warehouse.id, quantity, world.clock.now())
        .await
        .unwrap();
}

async fn available(world: &World, warehouse: &Warehouse) -> u32 {
    world
        .store
        .get_item(world.product.id, warehouse.id)
        .await
        .unwrap()
        .map_or(0, |item| item.available_quantity)
}

/// A hold lowers effective availability without touching the ledger, and a
/// second hold beyond what is left is refused.
#[tokio::test]
async fn reservation_reduces_effective_availability_only() {
    let world = world(&Config::default());
    stock(&world, &world.w1, 100).await;

    let first = world
        .ledger
        .reserve(ReserveRequest::new(world.product.id, world.w1.id, 40, 30))
        .await;
    assert!(first.success, "{}", first.message);

    let report = world
        .ledger
        .allocator()
        .check_availability(world.product.id, 70)
        .await
        .unwrap();
    assert_eq!(report.total_available, 100);
    assert!(report.is_available);

    let effective = world
        .ledger
        .reservations()
        .effective_available(world.product.id, world.w1.id)
        .await
        .unwrap();
    assert_eq!(effective, 60);

    let second = world
        .ledger
        .reserve(ReserveRequest::new(world.product.id, world.w1.id, 70, 30))
        .await;
    assert!(!second.success);
    assert_eq!(second.error_kind, Some(ErrorKind::InsufficientStock));
    assert!(second.record.is_none());
}

/// An expired but unswept hold can still be released once, and only once.
#[tokio::test]
async fn expired_reservation_releases_once() {
    let world = world(&Config::default());
    stock(&world, &world.w1, 10).await;

    let now = world.clock.now();
    let id = ReservationId::new("RSV-20240101-ABCD1234");
    world
        .store
        .put_reservation(StockReservation {
            reservation_id: id.clone(),
            product_id: world.product.id,
            warehouse_id: world.w1.id,
            quantity: 4,
            created_at: now - Duration::minutes(31),
            expires_at: now - Duration::minutes(1),
            released_at: None,
            reason: "checkout".to_string(),
            idempotency_key: None,
        })
        .await;

    let first = world.ledger.release(&id).await;
    assert!(first.success, "{}", first.message);
    assert_eq!(
        first.record.and_then(|r| r.released_at),
        Some(world.clock.now())
    );

    let second = world.ledger.release(&id).await;
    assert!(!second.success);
    assert_eq!(second.error_kind, Some(ErrorKind::AlreadyReleased));
}

/// A transfer moves stock and records it; an oversized one changes nothing.
#[tokio::test]
async fn transfer_moves_stock_or_nothing() {
    let world = world(&Config::default());
    stock(&world, &world.w1, 80).await;

    let moved = world
        .ledger
        .transfer_stock(TransferRequest {
            product_id: world.product.id,
            from_warehouse_id: world.w1.id,
            to_warehouse_id: world.w2.id,
            quantity: 30,
            reason: "rebalance".to_string(),
            notes: None,
        })
        .await;
    assert!(moved.success, "{}", moved.message);
    assert_eq!(moved.record.unwrap().status, TransferStatus::Completed);
    assert_eq!(available(&world, &world.w1).await, 50);
    assert_eq!(available(&world, &world.w2).await, 30);

    let refused = world
        .ledger
        .transfer_stock(TransferRequest {
            product_id: world.product.id,
            from_warehouse_id: world.w1.id,
            to_warehouse_id: world.w2.id,
            quantity: 1_000,
            reason: "rebalance".to_string(),
            notes: None,
        })
        .await;
    assert!(!refused.success);
    assert_eq!(refused.error_kind, Some(ErrorKind::InsufficientStock));
    assert_eq!(available(&world, &world.w1).await, 50);
    assert_eq!(available(&world, &world.w2).await, 30);

    let history = world
        .ledger
        .allocator()
        .transfer_history(world.product.id)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
}

/// A failure between the debit and the credit rolls both sides back.
#[tokio::test]
async fn transfer_is_atomic_under_injected_failure() {
    let mut config = Config::default();
    config.transfers.max_retries = 0;
    let world = world(&config);
    stock(&world, &world.w1, 80).await;

    // Second write is the destination credit.
    world.store.inject_fault(FaultPlan {
        fail_on_write: Some(2),
        ..FaultPlan::default()
    });

    let outcome = world
        .ledger
        .transfer_stock(TransferRequest {
            product_id: world.product.id,
            from_warehouse_id: world.w1.id,
            to_warehouse_id: world.w2.id,
            quantity: 30,
            reason: "rebalance".to_string(),
            notes: None,
        })
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(ErrorKind::TransactionFailed));
    assert_eq!(available(&world, &world.w1).await, 80);
    assert_eq!(available(&world, &world.w2).await, 0);
    assert!(world.store.all_transfers().await.is_empty());
}

/// A failed commit of a reservation leaves no hold behind.
#[tokio::test]
async fn failed_reservation_commit_leaves_no_hold() {
    let world = world(&Config::default());
    stock(&world, &world.w1, 10).await;
    world.store.inject_fault(FaultPlan {
        fail_commit: true,
        ..FaultPlan::default()
    });

    let outcome = world
        .ledger
        .reserve(ReserveRequest::new(world.product.id, world.w1.id, 5, 30))
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(ErrorKind::TransactionFailed));
    assert!(world.store.all_reservations().await.is_empty());
    let effective = world
        .ledger
        .reservations()
        .effective_available(world.product.id, world.w1.id)
        .await
        .unwrap();
    assert_eq!(effective, 10);
}

/// Severity and reorder arithmetic for a product with reorder level 20.
#[tokio::test]
async fn low_stock_alerts_and_reorder_suggestions() {
    let world = world(&Config::default());
    stock(&world, &world.w1, 3).await;
    stock(&world, &world.w2, 0).await;

    let alerts = world.ledger.monitor().low_stock_alerts().await.unwrap();
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0].warehouse_id, world.w2.id);
    assert_eq!(alerts[0].severity, AlertSeverity::Critical);
    assert_eq!(alerts[1].warehouse_id, world.w1.id);
    assert_eq!(alerts[1].severity, AlertSeverity::High);

    let suggestions = world.ledger.monitor().reorder_suggestions().await.unwrap();
    let w1 = suggestions
        .iter()
        .find(|s| s.warehouse_id == world.w1.id)
        .unwrap();
    assert_eq!(w1.suggested_quantity, 27);
    assert_eq!(w1.estimated_cost.cents(), 27_000);
}

/// A customer near Rotterdam gets the whole order from W2.
#[tokio::test]
async fn allocation_prefers_the_closest_warehouse() {
    let world = world(&Config::default());
    stock(&world, &world.w1, 100).await;
    stock(&world, &world.w2, 100).await;

    let customer = (51.9225, 4.4792);
    let allocations = world
        .ledger
        .allocator()
        .optimize_allocation(world.product.id, 50, Some(customer))
        .await
        .unwrap();

    assert_eq!(allocations.len(), 1);
    let allocation = &allocations[0];
    assert_eq!(allocation.warehouse_id, world.w2.id);
    assert_eq!(allocation.quantity, 50);
    assert_eq!(allocation.priority, 1);
    assert_eq!(allocation.allocation_reason, AllocationReason::ClosestWarehouse);
    assert_eq!(
        serde_json::to_value(allocation.allocation_reason).unwrap(),
        serde_json::json!("Closest warehouse")
    );
}

/// `can_reserve` agrees with the `reserve` that follows it.
#[tokio::test]
async fn can_reserve_predicts_reserve() {
    let world = world(&Config::default());
    stock(&world, &world.w1, 25).await;
    let reservations = world.ledger.reservations();

    for quantity in [25, 26] {
        let predicted = reservations
            .can_reserve(world.product.id, world.w1.id, quantity)
            .await
            .unwrap();
        let outcome = world
            .ledger
            .reserve(ReserveRequest::new(world.product.id, world.w1.id, quantity, 10))
            .await;
        assert_eq!(predicted, outcome.success, "quantity {quantity}");
        if let Some(reservation) = outcome.record {
            world.ledger.release(&reservation.reservation_id).await;
        }
    }
}

/// Expired holds stop counting at once; the sweep stamps them exactly once.
#[tokio::test]
async fn expiry_frees_stock_before_and_after_the_sweep() {
    let world = world(&Config::default());
    stock(&world, &world.w1, 10).await;

    let outcome = world
        .ledger
        .reserve(ReserveRequest::new(world.product.id, world.w1.id, 10, 5))
        .await;
    assert!(outcome.success);
    let reservations = world.ledger.reservations();
    assert_eq!(
        reservations
            .effective_available(world.product.id, world.w1.id)
            .await
            .unwrap(),
        0
    );

    world.clock.advance(Duration::minutes(6));
    assert_eq!(
        reservations
            .effective_available(world.product.id, world.w1.id)
            .await
            .unwrap(),
        10
    );

    let swept = reservations.sweep_expired().await.unwrap();
    assert_eq!(swept.len(), 1);
    assert!(swept[0].released_at.is_some());
    assert!(reservations.sweep_expired().await.unwrap().is_empty());
}

/// Retried reserve calls carrying the same key create a single hold.
#[tokio::test]
async fn idempotency_key_deduplicates_retries() {
    let world = world(&Config::default());
    stock(&world, &world.w1, 10).await;

    let request = ReserveRequest::new(world.product.id, world.w1.id, 4, 15)
        .with_reason("checkout")
        .with_idempotency_key("order-7");
    let first = world.ledger.reserve(request.clone()).await;
    let second = world.ledger.reserve(request).await;

    assert!(first.success && second.success);
    assert_eq!(
        first.record.unwrap().reservation_id,
        second.record.unwrap().reservation_id
    );
    assert_eq!(world.store.all_reservations().await.len(), 1);
}

/// Received stock shows up in utilization and the stock-level report.
#[tokio::test]
async fn receipts_feed_utilization_and_reports() {
    let world = world(&Config::default());
    world
        .ledger
        .receive_stock(world.product.id, world.w1.id, 250)
        .await
        .unwrap();
    let outcome = world
        .ledger
        .reserve(ReserveRequest::new(world.product.id, world.w1.id, 50, 60))
        .await;
    assert!(outcome.success);

    let utilization = world
        .ledger
        .allocator()
        .warehouse_utilization(world.w1.id)
        .await
        .unwrap();
    assert_eq!(utilization.used_capacity, 250);
    assert!((utilization.utilization_percentage - 25.0).abs() < f64::EPSILON);

    let report = world.ledger.monitor().stock_level_report().await.unwrap();
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].total_available_stock, 250);
    assert_eq!(report[0].total_reserved_stock, 50);
    assert!(!report[0].is_low_stock);

    let zero = world
        .ledger
        .receive_stock(world.product.id, world.w1.id, 0)
        .await;
    assert_eq!(zero.unwrap_err().kind(), ErrorKind::InvalidArgument);
}

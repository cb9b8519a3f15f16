//! Concurrency stress tests for competing reservations and transfers.
//!
//! Many tasks race for the same `(product, warehouse)` pair on a multi-threaded
//! runtime; the ledger must never hand out more than it holds.
//!
//! Run with: `cargo test --test concurrency_stress_test -- --nocapture`

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use std::sync::Arc;
use stock_ledger_core::environment::Clock;
use stock_ledger_core::{ErrorKind, InventoryStore, Product, Warehouse};
use stock_ledger_engine::{Config, ReserveRequest, StockLedger, TransferRequest};
use stock_ledger_testing::{InMemoryCatalog, InMemoryInventoryStore, fixtures, test_clock};

type Ledger = StockLedger<InMemoryInventoryStore, InMemoryCatalog>;

fn setup() -> (Arc<Ledger>, InMemoryInventoryStore, Product, Warehouse, Warehouse) {
    let product = fixtures::product("SKU-RACE", 5, 100);
    let w1 = fixtures::warehouse("W1", 10_000, None);
    let w2 = fixtures::warehouse("W2", 10_000, None);
    let catalog = InMemoryCatalog::new()
        .with_product(product.clone())
        .with_warehouse(w1.clone())
        .with_warehouse(w2.clone());
    let store = InMemoryInventoryStore::new();

    let ledger = StockLedger::new(
        Arc::new(store.clone()),
        Arc::new(catalog),
        Arc::new(test_clock()),
        &Config::default(),
    );
    (Arc::new(ledger), store, product, w1, w2)
}

/// 100 tasks try to hold the last unit; exactly one gets it.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_unit_is_reserved_once() {
    let (ledger, store, product, w1, _) = setup();
    store
        .receive_stock(product.id, w1.id, 1, test_clock().now())
        .await
        .unwrap();

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                ledger
                    .reserve(ReserveRequest::new(product.id, w1.id, 1, 15))
                    .await
            })
        })
        .collect();

    let mut succeeded = 0;
    let mut insufficient = 0;
    for handle in handles {
        let outcome = handle.await.expect("task panicked");
        if outcome.success {
            succeeded += 1;
        } else {
            assert_eq!(outcome.error_kind, Some(ErrorKind::InsufficientStock));
            insufficient += 1;
        }
    }

    println!("✅ {succeeded} succeeded, {insufficient} rejected");
    assert_eq!(succeeded, 1);
    assert_eq!(insufficient, 99);
}

/// Mixed quantities never push the active sum past the ledger quantity.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn active_holds_never_exceed_stock() {
    let (ledger, store, product, w1, _) = setup();
    store
        .receive_stock(product.id, w1.id, 100, test_clock().now())
        .await
        .unwrap();

    let handles: Vec<_> = (0..60_u32)
        .map(|i| {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                ledger
                    .reserve(ReserveRequest::new(product.id, w1.id, 1 + i % 5, 30))
                    .await
            })
        })
        .collect();

    let mut granted: u64 = 0;
    for handle in handles {
        let outcome = handle.await.expect("task panicked");
        if let Some(reservation) = outcome.record {
            granted += u64::from(reservation.quantity);
        }
    }

    let held = store
        .active_reserved_quantity(product.id, w1.id, test_clock().now())
        .await
        .unwrap();
    assert_eq!(held, granted);
    assert!(held <= 100, "held {held} units out of 100");
}

/// Opposite-direction transfers complete without deadlock and conserve stock.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposing_transfers_conserve_stock() {
    let (ledger, store, product, w1, w2) = setup();
    let now = test_clock().now();
    store.receive_stock(product.id, w1.id, 500, now).await.unwrap();
    store.receive_stock(product.id, w2.id, 500, now).await.unwrap();

    let handles: Vec<_> = (0..40)
        .map(|i| {
            let ledger = Arc::clone(&ledger);
            let (from, to) = if i % 2 == 0 { (w1.id, w2.id) } else { (w2.id, w1.id) };
            tokio::spawn(async move {
                ledger
                    .transfer_stock(TransferRequest {
                        product_id: product.id,
                        from_warehouse_id: from,
                        to_warehouse_id: to,
                        quantity: 7,
                        reason: "rebalance".to_string(),
                        notes: None,
                    })
                    .await
            })
        })
        .collect();

    for handle in handles {
        let outcome = handle.await.expect("task panicked");
        assert!(outcome.success, "{}", outcome.message);
    }

    let total: u64 = store
        .items_for_product(product.id)
        .await
        .unwrap()
        .iter()
        .map(|item| u64::from(item.available_quantity))
        .sum();
    assert_eq!(total, 1_000);
    assert_eq!(store.all_transfers().await.len(), 40);
}

//! Domain types for the stock ledger.
//!
//! This module contains the identifiers, value objects and records shared by the
//! reservation engine, the multi-warehouse allocator and the low-stock monitor.
//! Products and warehouses are catalog entities owned elsewhere; the ledger only
//! references them by id.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a product
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProductId(Uuid);

impl ProductId {
    /// Creates a new random `ProductId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `ProductId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ProductId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a warehouse
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WarehouseId(Uuid);

impl WarehouseId {
    /// Creates a new random `WarehouseId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `WarehouseId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for WarehouseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WarehouseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a completed stock transfer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferId(Uuid);

impl TransferId {
    /// Creates a new random `TransferId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `TransferId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Human-decodable reservation identifier: `RSV-<yyyyMMdd>-<8 uppercase hex chars>`.
///
/// The date component is the UTC creation date, which makes ids sortable by day and
/// readable in support tickets. The random suffix carries 32 bits of entropy.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationId(String);

impl ReservationId {
    /// Prefix shared by every reservation id
    pub const PREFIX: &'static str = "RSV";

    /// Generates a fresh id dated `now`.
    #[must_use]
    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix: u32 = rand::random();
        Self(format!("{}-{}-{suffix:08X}", Self::PREFIX, now.format("%Y%m%d")))
    }

    /// Wraps an existing id (e.g. one received from a caller or loaded from storage).
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decodes the creation date embedded in the id.
    ///
    /// Returns `None` for ids that do not follow the `RSV-<yyyyMMdd>-<hex>` layout.
    #[must_use]
    pub fn date_component(&self) -> Option<NaiveDate> {
        let mut parts = self.0.splitn(3, '-');
        if parts.next()? != Self::PREFIX {
            return None;
        }
        let date = parts.next()?;
        let suffix = parts.next()?;
        if suffix.len() != 8 || !suffix.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        NaiveDate::parse_from_str(date, "%Y%m%d").ok()
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Money Value Object (cents-based to avoid floating point errors)
// ============================================================================

/// Represents money in cents to avoid floating-point arithmetic errors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Returns the amount in dollars (rounded down)
    #[must_use]
    pub const fn dollars(&self) -> u64 {
        self.0 / 100
    }

    /// Multiplies a unit price by a quantity, saturating at `u64::MAX` cents.
    #[must_use]
    pub const fn times(self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(quantity as u64))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.dollars(), self.0 % 100)
    }
}

// ============================================================================
// Catalog Entities (external, read-only from the ledger's perspective)
// ============================================================================

/// Product as seen by the ledger
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Unique product identifier
    pub id: ProductId,
    /// Stock-keeping unit
    pub sku: String,
    /// Display name
    pub name: String,
    /// Threshold at or below which a warehouse is considered low on this product
    pub reorder_level: u32,
    /// Unit price
    pub price: Money,
    /// Inactive products are skipped by the low-stock monitor
    pub is_active: bool,
    /// Last catalog update
    pub updated_at: DateTime<Utc>,
}

/// Warehouse as seen by the ledger
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Warehouse {
    /// Unique warehouse identifier
    pub id: WarehouseId,
    /// Short code (e.g. "AMS-1")
    pub code: String,
    /// Display name
    pub name: String,
    /// Storage capacity in units
    pub capacity: u32,
    /// Latitude in decimal degrees
    pub latitude: Option<f64>,
    /// Longitude in decimal degrees
    pub longitude: Option<f64>,
    /// Inactive warehouses never receive allocations
    pub is_active: bool,
}

impl Warehouse {
    /// Coordinates as `(latitude, longitude)` when both are known
    #[must_use]
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

// ============================================================================
// Ledger Records
// ============================================================================

/// Ledger row for one `(product, warehouse)` pair.
///
/// Created lazily on first stock receipt or transfer-in, never deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Product held
    pub product_id: ProductId,
    /// Warehouse holding it
    pub warehouse_id: WarehouseId,
    /// Units on hand
    pub available_quantity: u32,
    /// Legacy reserved counter. A cached hint only; live reservation sums are authoritative.
    pub reserved_quantity: u32,
    /// Last quantity change
    pub last_updated: DateTime<Utc>,
}

impl InventoryItem {
    /// Creates an empty ledger row
    #[must_use]
    pub const fn empty(
        product_id: ProductId,
        warehouse_id: WarehouseId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            product_id,
            warehouse_id,
            available_quantity: 0,
            reserved_quantity: 0,
            last_updated: now,
        }
    }

    /// Units occupying warehouse space (available + reserved)
    #[must_use]
    pub const fn occupied(&self) -> u64 {
        self.available_quantity as u64 + self.reserved_quantity as u64
    }
}

/// Derived lifecycle state of a reservation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    /// Holding stock
    Active,
    /// Past `expires_at` but not yet swept; treated as released for availability
    Expired,
    /// Released explicitly or by the sweep
    Released,
}

/// Time-bounded hold against one `(product, warehouse)` pair
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReservation {
    /// Reservation identifier
    pub reservation_id: ReservationId,
    /// Product held
    pub product_id: ProductId,
    /// Warehouse held against
    pub warehouse_id: WarehouseId,
    /// Units held (always > 0)
    pub quantity: u32,
    /// When the hold was placed
    pub created_at: DateTime<Utc>,
    /// When the hold lapses
    pub expires_at: DateTime<Utc>,
    /// When the hold was released (explicitly or by the sweep)
    pub released_at: Option<DateTime<Utc>>,
    /// Free-text reason supplied by the caller
    pub reason: String,
    /// Caller-supplied token deduplicating retried `reserve` calls
    pub idempotency_key: Option<String>,
}

impl StockReservation {
    /// Lifecycle state at `now`
    #[must_use]
    pub fn status(&self, now: DateTime<Utc>) -> ReservationStatus {
        match self.released_at {
            Some(_) => ReservationStatus::Released,
            None if self.expires_at > now => ReservationStatus::Active,
            None => ReservationStatus::Expired,
        }
    }

    /// Whether the hold still counts against availability at `now`
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status(now) == ReservationStatus::Active
    }
}

/// Outcome recorded for a transfer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    /// Both ledger sides were updated
    Completed,
    /// Nothing was moved
    Failed,
}

impl TransferStatus {
    /// Storage representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of an atomic move between two warehouses
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTransfer {
    /// Transfer identifier
    pub id: TransferId,
    /// Product moved
    pub product_id: ProductId,
    /// Source warehouse
    pub from_warehouse_id: WarehouseId,
    /// Destination warehouse
    pub to_warehouse_id: WarehouseId,
    /// Units moved
    pub quantity: u32,
    /// Why the move happened
    pub reason: String,
    /// Optional operator notes
    pub notes: Option<String>,
    /// When the move committed
    pub transfer_date: DateTime<Utc>,
    /// Final status
    pub status: TransferStatus,
}

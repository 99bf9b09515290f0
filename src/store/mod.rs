//! Storage seams for the catalog, the account directory and the order ledger.
//!
//! Every backend must make the inventory reservation and the order insert one
//! unit of work (see [`OrderLedger::place_order`]), and the cancellation
//! status change together with the inventory restore another.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    Account, NewAccount, NewOrder, NewProduct, Order, OrderFilter, OrderRating, OrderStatus,
    Product, ProductPatch, ProductQuery, ProfilePatch, TimelineEntry,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Insufficient inventory for {product_name}. Available: {available}")]
    InsufficientInventory {
        product_id: Uuid,
        product_name: String,
        available: u32,
    },

    #[error("Duplicate value for {0}")]
    Duplicate(String),

    /// Lost a race with a concurrent writer. Safe to retry.
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        StoreError::NotFound { entity, id }
    }
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Returns soft-deleted products too, so order history keeps resolving.
    async fn fetch_product(&self, id: Uuid) -> Result<Product, StoreError>;

    async fn list_products(&self, query: &ProductQuery) -> Result<Vec<Product>, StoreError>;

    async fn create_product(&self, new: NewProduct) -> Result<Product, StoreError>;

    async fn update_product(&self, id: Uuid, patch: ProductPatch) -> Result<Product, StoreError>;

    async fn soft_delete_product(&self, id: Uuid) -> Result<(), StoreError>;

    /// Standalone stock adjustment for catalog maintenance. Order placement and
    /// cancellation do not go through it: they reserve and restore inside
    /// [`OrderLedger::place_order`] and [`OrderLedger::cancel_order`].
    ///
    /// Atomically lowers `available` by `amount`, failing with
    /// [`StoreError::InsufficientInventory`] instead of going negative.
    /// Returns the new available quantity.
    async fn decrement_available(&self, id: Uuid, amount: u32) -> Result<u32, StoreError>;

    /// Counterpart of [`CatalogStore::decrement_available`]. Atomically raises
    /// `available` by `amount`. Returns the new available quantity.
    async fn increment_available(&self, id: Uuid, amount: u32) -> Result<u32, StoreError>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] when the email is taken.
    async fn create_account(&self, new: NewAccount) -> Result<Account, StoreError>;

    async fn fetch_account(&self, id: Uuid) -> Result<Account, StoreError>;

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    async fn update_account(&self, id: Uuid, patch: ProfilePatch) -> Result<Account, StoreError>;

    async fn set_credential(&self, id: Uuid, password_hash: String) -> Result<(), StoreError>;

    async fn deactivate_account(&self, id: Uuid) -> Result<(), StoreError>;

    async fn list_producers(&self, limit: usize) -> Result<Vec<Account>, StoreError>;
}

#[async_trait]
pub trait OrderLedger: Send + Sync {
    /// Reserves every line item and inserts the order in `pending`, or does neither.
    ///
    /// Fails with [`StoreError::InsufficientInventory`] if any line cannot be
    /// reserved and with [`StoreError::Duplicate`] if the order number is taken.
    async fn place_order(&self, new: NewOrder) -> Result<Order, StoreError>;

    async fn fetch_order(&self, id: Uuid) -> Result<Order, StoreError>;

    /// Newest first. Returns the page and the total number of matching orders.
    async fn list_orders(&self, filter: &OrderFilter) -> Result<(Vec<Order>, u64), StoreError>;

    /// Appends `entry` and moves to `entry.status` if the order is still in
    /// `expected`; otherwise [`StoreError::Conflict`].
    async fn transition_order(
        &self,
        id: Uuid,
        expected: OrderStatus,
        entry: TimelineEntry,
    ) -> Result<Order, StoreError>;

    /// Like [`OrderLedger::transition_order`] into `cancelled`, additionally
    /// returning every line item's quantity to the catalog in the same unit of work
    /// when `restore_inventory` is set.
    async fn cancel_order(
        &self,
        id: Uuid,
        expected: OrderStatus,
        entry: TimelineEntry,
        restore_inventory: bool,
    ) -> Result<Order, StoreError>;

    /// Records the rating if the order is delivered and not yet rated;
    /// otherwise [`StoreError::Conflict`].
    async fn rate_order(&self, id: Uuid, rating: OrderRating) -> Result<Order, StoreError>;
}

/// Everything the service needs from a backend.
pub trait Store: CatalogStore + AccountStore + OrderLedger {}

impl<T: CatalogStore + AccountStore + OrderLedger> Store for T {}

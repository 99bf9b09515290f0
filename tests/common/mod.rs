#![allow(dead_code)]

use std::{collections::HashSet, sync::Arc};

use agriconnect_marketplace::{
    domain::{
        Account, AccountProfile, Category, Location, NewAccount, NewOrder, NewProduct, Order,
        OrderFilter, OrderRating, OrderStatus, Price, PriceUnit, ProducerProfile, Product,
        ProductPatch, ProductQuery, ProfilePatch, ShippingAddress, TimelineEntry,
    },
    engine::{LineItemRequest, OrderEngine, PlaceOrderInput, PricingPolicy},
    store::{AccountStore, CatalogStore, MemoryStore, OrderLedger, Store, StoreError},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use uuid::Uuid;

pub struct Fixture {
    pub store: MemoryStore,
    pub engine: Arc<OrderEngine>,
    sold_out: Arc<Mutex<HashSet<Uuid>>>,
}

impl Fixture {
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let sold_out = Arc::new(Mutex::new(HashSet::new()));
        let shared: Arc<dyn Store> = Arc::new(SellOutStore {
            inner: store.clone(),
            sold_out: sold_out.clone(),
        });
        Self {
            engine: Arc::new(OrderEngine::new(shared, PricingPolicy::default())),
            store,
            sold_out,
        }
    }

    /// From now on every reservation for this seller fails as if a
    /// concurrent buyer had taken the stock first.
    pub fn sell_out(&self, seller_id: Uuid) {
        self.sold_out.lock().insert(seller_id);
    }

    pub async fn producer(&self, email: &str) -> Uuid {
        self.account(
            email,
            AccountProfile::Producer(ProducerProfile {
                farm_name: "Green Acres".into(),
                farm_size: 4.5,
                crops: vec!["Tomatoes".into()],
            }),
        )
        .await
    }

    pub async fn consumer(&self, email: &str) -> Uuid {
        self.account(email, AccountProfile::Consumer).await
    }

    async fn account(&self, email: &str, profile: AccountProfile) -> Uuid {
        self.store
            .create_account(NewAccount {
                first_name: "Test".into(),
                last_name: "User".into(),
                email: email.into(),
                phone: "9876543210".into(),
                location: location(),
                profile,
                password_hash: "unused".into(),
            })
            .await
            .unwrap()
            .id
    }

    /// A product priced per kg in whole rupees.
    pub async fn product(&self, producer_id: Uuid, name: &str, price: i64, available: u32) -> Uuid {
        self.store
            .create_product(NewProduct {
                producer_id,
                name: name.into(),
                description: format!("Fresh {name}"),
                category: Category::Vegetables,
                price: Price {
                    amount: Decimal::new(price, 0),
                    unit: PriceUnit::Kg,
                    currency: "INR".into(),
                },
                location: "Pune".into(),
                images: vec![],
                available,
                is_organic: false,
                harvest_date: None,
                expiry_date: None,
                tags: vec![],
            })
            .await
            .unwrap()
            .id
    }

    pub async fn available(&self, product_id: Uuid) -> u32 {
        self.store.fetch_product(product_id).await.unwrap().available
    }
}

/// Delegates to a [`MemoryStore`] but rejects order placement for sellers
/// registered through [`Fixture::sell_out`], leaving inventory untouched.
struct SellOutStore {
    inner: MemoryStore,
    sold_out: Arc<Mutex<HashSet<Uuid>>>,
}

#[async_trait]
impl CatalogStore for SellOutStore {
    async fn fetch_product(&self, id: Uuid) -> Result<Product, StoreError> {
        self.inner.fetch_product(id).await
    }

    async fn list_products(&self, query: &ProductQuery) -> Result<Vec<Product>, StoreError> {
        self.inner.list_products(query).await
    }

    async fn create_product(&self, new: NewProduct) -> Result<Product, StoreError> {
        self.inner.create_product(new).await
    }

    async fn update_product(&self, id: Uuid, patch: ProductPatch) -> Result<Product, StoreError> {
        self.inner.update_product(id, patch).await
    }

    async fn soft_delete_product(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.soft_delete_product(id).await
    }

    async fn decrement_available(&self, id: Uuid, amount: u32) -> Result<u32, StoreError> {
        self.inner.decrement_available(id, amount).await
    }

    async fn increment_available(&self, id: Uuid, amount: u32) -> Result<u32, StoreError> {
        self.inner.increment_available(id, amount).await
    }
}

#[async_trait]
impl AccountStore for SellOutStore {
    async fn create_account(&self, new: NewAccount) -> Result<Account, StoreError> {
        self.inner.create_account(new).await
    }

    async fn fetch_account(&self, id: Uuid) -> Result<Account, StoreError> {
        self.inner.fetch_account(id).await
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        self.inner.find_account_by_email(email).await
    }

    async fn update_account(&self, id: Uuid, patch: ProfilePatch) -> Result<Account, StoreError> {
        self.inner.update_account(id, patch).await
    }

    async fn set_credential(&self, id: Uuid, password_hash: String) -> Result<(), StoreError> {
        self.inner.set_credential(id, password_hash).await
    }

    async fn deactivate_account(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.deactivate_account(id).await
    }

    async fn list_producers(&self, limit: usize) -> Result<Vec<Account>, StoreError> {
        self.inner.list_producers(limit).await
    }
}

#[async_trait]
impl OrderLedger for SellOutStore {
    async fn place_order(&self, new: NewOrder) -> Result<Order, StoreError> {
        if self.sold_out.lock().contains(&new.seller_id) {
            let item = &new.items[0];
            return Err(StoreError::InsufficientInventory {
                product_id: item.product_id,
                product_name: item.product_name.clone(),
                available: 0,
            });
        }
        self.inner.place_order(new).await
    }

    async fn fetch_order(&self, id: Uuid) -> Result<Order, StoreError> {
        self.inner.fetch_order(id).await
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<(Vec<Order>, u64), StoreError> {
        self.inner.list_orders(filter).await
    }

    async fn transition_order(
        &self,
        id: Uuid,
        expected: OrderStatus,
        entry: TimelineEntry,
    ) -> Result<Order, StoreError> {
        self.inner.transition_order(id, expected, entry).await
    }

    async fn cancel_order(
        &self,
        id: Uuid,
        expected: OrderStatus,
        entry: TimelineEntry,
        restore_inventory: bool,
    ) -> Result<Order, StoreError> {
        self.inner
            .cancel_order(id, expected, entry, restore_inventory)
            .await
    }

    async fn rate_order(&self, id: Uuid, rating: OrderRating) -> Result<Order, StoreError> {
        self.inner.rate_order(id, rating).await
    }
}

pub fn location() -> Location {
    Location {
        city: "Pune".into(),
        state: "Maharashtra".into(),
        postal_code: "411001".into(),
    }
}

pub fn address() -> ShippingAddress {
    ShippingAddress {
        first_name: "Asha".into(),
        last_name: "Rao".into(),
        address_line: "12 MG Road".into(),
        city: "Pune".into(),
        state: "Maharashtra".into(),
        postal_code: "411001".into(),
        email: "asha@example.com".into(),
        phone: "9876543210".into(),
    }
}

pub fn cart(items: &[(Uuid, u32)]) -> PlaceOrderInput {
    PlaceOrderInput {
        items: items
            .iter()
            .map(|&(product_id, quantity)| LineItemRequest {
                product_id,
                quantity,
            })
            .collect(),
        shipping_address: address(),
        payment_method: None,
        notes: None,
    }
}

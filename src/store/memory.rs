//! Process-memory backend.
//!
//! All tables sit behind one mutex, which makes every multi-row operation
//! (reserve + insert, cancel + restore) a single critical section. The lock is
//! never held across an `.await`.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{AccountStore, CatalogStore, OrderLedger, StoreError};
use crate::domain::{
    Account, NewAccount, NewOrder, NewProduct, Order, OrderFilter, OrderRating, OrderStatus,
    Product, ProductPatch, ProductQuery, ProfilePatch, Role, TimelineEntry,
};

#[derive(Default)]
struct Tables {
    products: HashMap<Uuid, Product>,
    accounts: HashMap<Uuid, Account>,
    orders: HashMap<Uuid, Order>,
    order_numbers: HashSet<String>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tables {
    fn product_mut(&mut self, id: Uuid) -> Result<&mut Product, StoreError> {
        self.products
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Product", id))
    }

    fn order_mut(&mut self, id: Uuid) -> Result<&mut Order, StoreError> {
        self.orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Order", id))
    }

    fn account_mut(&mut self, id: Uuid) -> Result<&mut Account, StoreError> {
        self.accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Account", id))
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn fetch_product(&self, id: Uuid) -> Result<Product, StoreError> {
        self.tables
            .lock()
            .products
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Product", id))
    }

    async fn list_products(&self, query: &ProductQuery) -> Result<Vec<Product>, StoreError> {
        let tables = self.tables.lock();
        let mut products: Vec<Product> = tables
            .products
            .values()
            .filter(|product| query.matches(product))
            .cloned()
            .collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        products.truncate(query.effective_limit());
        Ok(products)
    }

    async fn create_product(&self, new: NewProduct) -> Result<Product, StoreError> {
        let product = new.into_product(Uuid::new_v4(), Utc::now());
        self.tables
            .lock()
            .products
            .insert(product.id, product.clone());
        Ok(product)
    }

    async fn update_product(&self, id: Uuid, patch: ProductPatch) -> Result<Product, StoreError> {
        let mut tables = self.tables.lock();
        let product = tables.product_mut(id)?;
        if product.is_deleted() {
            return Err(StoreError::not_found("Product", id));
        }
        product.apply(patch, Utc::now());
        Ok(product.clone())
    }

    async fn soft_delete_product(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        let product = tables.product_mut(id)?;
        if product.is_deleted() {
            return Err(StoreError::not_found("Product", id));
        }
        let now = Utc::now();
        product.deleted_at = Some(now);
        product.updated_at = now;
        Ok(())
    }

    async fn decrement_available(&self, id: Uuid, amount: u32) -> Result<u32, StoreError> {
        let mut tables = self.tables.lock();
        let product = tables.product_mut(id)?;
        if product.is_deleted() {
            return Err(StoreError::not_found("Product", id));
        }
        if product.available < amount {
            return Err(StoreError::InsufficientInventory {
                product_id: id,
                product_name: product.name.clone(),
                available: product.available,
            });
        }
        product.available -= amount;
        Ok(product.available)
    }

    async fn increment_available(&self, id: Uuid, amount: u32) -> Result<u32, StoreError> {
        let mut tables = self.tables.lock();
        let product = tables.product_mut(id)?;
        product.available = product.available.saturating_add(amount);
        Ok(product.available)
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_account(&self, new: NewAccount) -> Result<Account, StoreError> {
        let mut tables = self.tables.lock();
        if tables
            .accounts
            .values()
            .any(|account| account.email.eq_ignore_ascii_case(&new.email))
        {
            return Err(StoreError::Duplicate("email".into()));
        }
        let account = new.into_account(Uuid::new_v4(), Utc::now());
        tables.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn fetch_account(&self, id: Uuid) -> Result<Account, StoreError> {
        self.tables
            .lock()
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Account", id))
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        Ok(self
            .tables
            .lock()
            .accounts
            .values()
            .find(|account| account.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn update_account(&self, id: Uuid, patch: ProfilePatch) -> Result<Account, StoreError> {
        let mut tables = self.tables.lock();
        let account = tables.account_mut(id)?;
        account.apply(patch, Utc::now());
        Ok(account.clone())
    }

    async fn set_credential(&self, id: Uuid, password_hash: String) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        let account = tables.account_mut(id)?;
        account.password_hash = password_hash;
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn deactivate_account(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        let account = tables.account_mut(id)?;
        account.is_active = false;
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn list_producers(&self, limit: usize) -> Result<Vec<Account>, StoreError> {
        let tables = self.tables.lock();
        let mut producers: Vec<Account> = tables
            .accounts
            .values()
            .filter(|account| account.is_active && account.role() == Role::Producer)
            .cloned()
            .collect();
        producers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        producers.truncate(limit);
        Ok(producers)
    }
}

#[async_trait]
impl OrderLedger for MemoryStore {
    async fn place_order(&self, new: NewOrder) -> Result<Order, StoreError> {
        let mut tables = self.tables.lock();
        if tables.order_numbers.contains(&new.order_number) {
            return Err(StoreError::Duplicate("order number".into()));
        }

        // Check every line before touching any counter so a failure leaves the catalog as it was.
        let mut requested: HashMap<Uuid, u32> = HashMap::new();
        for item in &new.items {
            *requested.entry(item.product_id).or_default() += item.quantity;
        }
        for (product_id, quantity) in &requested {
            let product = tables
                .products
                .get(product_id)
                .filter(|product| !product.is_deleted())
                .ok_or_else(|| StoreError::not_found("Product", *product_id))?;
            if product.available < *quantity {
                return Err(StoreError::InsufficientInventory {
                    product_id: *product_id,
                    product_name: product.name.clone(),
                    available: product.available,
                });
            }
        }
        for (product_id, quantity) in requested {
            tables.product_mut(product_id)?.available -= quantity;
        }

        let order = new.into_order(Uuid::new_v4(), Utc::now());
        tables.order_numbers.insert(order.order_number.clone());
        tables.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn fetch_order(&self, id: Uuid) -> Result<Order, StoreError> {
        self.tables
            .lock()
            .orders
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Order", id))
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<(Vec<Order>, u64), StoreError> {
        let tables = self.tables.lock();
        let mut orders: Vec<&Order> = tables
            .orders
            .values()
            .filter(|order| filter.matches(order))
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = orders.len() as u64;
        let page = orders
            .into_iter()
            .skip(usize::try_from(filter.offset).unwrap_or(usize::MAX))
            .take(filter.limit as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn transition_order(
        &self,
        id: Uuid,
        expected: OrderStatus,
        entry: TimelineEntry,
    ) -> Result<Order, StoreError> {
        let mut tables = self.tables.lock();
        let order = tables.order_mut(id)?;
        if order.status != expected {
            return Err(StoreError::Conflict(format!(
                "order {id} is {}, expected {expected}",
                order.status
            )));
        }
        order.record(entry);
        Ok(order.clone())
    }

    async fn cancel_order(
        &self,
        id: Uuid,
        expected: OrderStatus,
        entry: TimelineEntry,
        restore_inventory: bool,
    ) -> Result<Order, StoreError> {
        let mut tables = self.tables.lock();
        let order = tables.order_mut(id)?;
        if order.status != expected {
            return Err(StoreError::Conflict(format!(
                "order {id} is {}, expected {expected}",
                order.status
            )));
        }
        order.record(entry);
        let cancelled = order.clone();

        if restore_inventory {
            for item in &cancelled.items {
                if let Some(product) = tables.products.get_mut(&item.product_id) {
                    product.available = product.available.saturating_add(item.quantity);
                }
            }
        }
        Ok(cancelled)
    }

    async fn rate_order(&self, id: Uuid, rating: OrderRating) -> Result<Order, StoreError> {
        let mut tables = self.tables.lock();
        let order = tables.order_mut(id)?;
        if order.status != OrderStatus::Delivered || order.rating.is_some() {
            return Err(StoreError::Conflict(format!(
                "order {id} cannot be rated in its current state"
            )));
        }
        order.updated_at = rating.rated_at;
        order.rating = Some(rating);
        Ok(order.clone())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::{
        Category, LineItem, OrderTotals, PaymentMethod, Price, PriceUnit, ShippingAddress,
    };

    fn new_product(available: u32) -> NewProduct {
        NewProduct {
            producer_id: Uuid::new_v4(),
            name: "Tomatoes".into(),
            description: "Vine ripened".into(),
            category: Category::Vegetables,
            price: Price {
                amount: Decimal::new(40, 0),
                unit: PriceUnit::Kg,
                currency: "INR".into(),
            },
            location: "Nashik".into(),
            images: vec![],
            available,
            is_organic: false,
            harvest_date: None,
            expiry_date: None,
            tags: vec![],
        }
    }

    fn new_order(product: &Product, quantity: u32, order_number: &str) -> NewOrder {
        NewOrder {
            order_number: order_number.into(),
            buyer_id: Uuid::new_v4(),
            seller_id: product.producer_id,
            items: vec![LineItem {
                product_id: product.id,
                product_name: product.name.clone(),
                quantity,
                unit: product.price.unit,
                unit_price: product.price.amount,
                line_total: product.price.amount * Decimal::from(quantity),
            }],
            totals: OrderTotals {
                subtotal: Decimal::ZERO,
                delivery_charge: Decimal::ZERO,
                tax: Decimal::ZERO,
                total: Decimal::ZERO,
            },
            currency: "INR".into(),
            shipping_address: ShippingAddress {
                first_name: "Asha".into(),
                last_name: "Rao".into(),
                address_line: "12 MG Road".into(),
                city: "Pune".into(),
                state: "Maharashtra".into(),
                postal_code: "411001".into(),
                email: "asha@example.com".into(),
                phone: "9876543210".into(),
            },
            payment_method: PaymentMethod::Cod,
            notes: None,
        }
    }

    #[tokio::test]
    async fn conditional_decrement_never_goes_negative() {
        let store = MemoryStore::new();
        let product = store.create_product(new_product(5)).await.unwrap();

        assert_eq!(store.decrement_available(product.id, 3).await.unwrap(), 2);
        let err = store.decrement_available(product.id, 3).await.unwrap_err();
        assert!(matches!(err, StoreError::InsufficientInventory { available: 2, .. }));
        assert_eq!(store.increment_available(product.id, 3).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn failed_placement_leaves_inventory_untouched() {
        let store = MemoryStore::new();
        let product = store.create_product(new_product(4)).await.unwrap();

        let mut order = new_order(&product, 3, "ORD-1");
        order.items.push(order.items[0].clone());
        let err = store.place_order(order).await.unwrap_err();

        assert!(matches!(err, StoreError::InsufficientInventory { .. }));
        assert_eq!(store.fetch_product(product.id).await.unwrap().available, 4);
    }

    #[tokio::test]
    async fn order_numbers_are_unique() {
        let store = MemoryStore::new();
        let product = store.create_product(new_product(10)).await.unwrap();

        store.place_order(new_order(&product, 1, "ORD-1")).await.unwrap();
        let err = store
            .place_order(new_order(&product, 1, "ORD-1"))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Duplicate(_)));
        assert_eq!(store.fetch_product(product.id).await.unwrap().available, 9);
    }

    #[tokio::test]
    async fn cancel_is_compare_and_set() {
        let store = MemoryStore::new();
        let product = store.create_product(new_product(10)).await.unwrap();
        let order = store
            .place_order(new_order(&product, 4, "ORD-1"))
            .await
            .unwrap();

        let entry = TimelineEntry {
            status: OrderStatus::Cancelled,
            timestamp: Utc::now(),
            note: None,
        };
        store
            .cancel_order(order.id, OrderStatus::Pending, entry.clone(), true)
            .await
            .unwrap();
        let err = store
            .cancel_order(order.id, OrderStatus::Pending, entry, true)
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.fetch_product(product.id).await.unwrap().available, 10);
    }

    #[tokio::test]
    async fn soft_deleted_products_stay_fetchable_but_unlisted() {
        let store = MemoryStore::new();
        let product = store.create_product(new_product(1)).await.unwrap();
        store.soft_delete_product(product.id).await.unwrap();

        assert!(store.fetch_product(product.id).await.unwrap().is_deleted());
        let listed = store.list_products(&ProductQuery::default()).await.unwrap();
        assert!(listed.is_empty());
    }
}

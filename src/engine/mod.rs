//! Order workflow: placement with inventory reservation, the status machine,
//! cancellation with inventory restore, and ratings.
//!
//! The engine owns every business rule; the store only guarantees that each
//! reservation/insert and each cancel/restore is one atomic unit.

use std::{collections::HashMap, future::Future, sync::Arc};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    domain::{
        Account, AccountSummary, LineItem, NewOrder, Order, OrderFilter, OrderRating, OrderStatus,
        Party, PaymentMethod, Product, Role, ShippingAddress, TimelineEntry,
    },
    store::{Store, StoreError},
    validation::{FieldErrors, validate},
};

pub mod error;
pub mod order_number;
pub mod pricing;

pub use error::OrderError;
pub use pricing::PricingPolicy;

/// Attempts per operation when the ledger reports a concurrent modification.
pub const MAX_ATTEMPTS: u32 = 3;
pub const MAX_LINE_QUANTITY: u32 = 9999;
pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct LineItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 9999, message = "Quantity must be between 1 and 9999"))]
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct PlaceOrderInput {
    #[validate(nested)]
    pub items: Vec<LineItemRequest>,
    #[validate(nested)]
    pub shipping_address: ShippingAddress,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    #[validate(length(max = 500, message = "Notes cannot exceed 500 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RateOrderInput {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: u8,
    #[serde(default)]
    #[validate(length(max = 500, message = "Review cannot exceed 500 characters"))]
    pub review: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
    /// 1-based page number.
    pub page: Option<u64>,
    /// Clamped to 1..=100, default 20.
    #[serde(alias = "limit")]
    pub page_size: Option<u64>,
}

/// An order with its parties resolved.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub buyer: AccountSummary,
    pub seller: AccountSummary,
}

/// A producer group that could not be placed.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GroupFailure {
    pub seller_id: Uuid,
    pub product_ids: Vec<Uuid>,
    pub reason: String,
}

/// Result of a checkout: one order per producer plus any groups that failed.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Placement {
    pub orders: Vec<OrderView>,
    pub failures: Vec<GroupFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Pagination {
    pub current: u64,
    pub total_pages: u64,
    pub total_items: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(current: u64, page_size: u64, total_items: u64) -> Self {
        let total_pages = total_items.div_ceil(page_size);
        Self {
            current,
            total_pages,
            total_items,
            has_next: current < total_pages,
            has_prev: current > 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderPage {
    pub orders: Vec<OrderView>,
    pub pagination: Pagination,
}

/// Runs `attempt` until it succeeds, fails with a non-retryable error, or
/// [`MAX_ATTEMPTS`] is reached. Each attempt re-reads whatever state it needs.
async fn with_retry<T, F, Fut>(operation: &'static str, mut attempt: F) -> Result<T, OrderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OrderError>>,
{
    let mut tries = 1;
    loop {
        match attempt().await {
            Err(err) if err.is_retryable() && tries < MAX_ATTEMPTS => {
                debug!(operation, tries, %err, "Retrying after concurrent modification");
                tries += 1;
            }
            result => return result,
        }
    }
}

#[derive(Clone)]
pub struct OrderEngine {
    store: Arc<dyn Store>,
    pricing: PricingPolicy,
}

impl OrderEngine {
    pub fn new(store: Arc<dyn Store>, pricing: PricingPolicy) -> Self {
        Self { store, pricing }
    }

    pub fn pricing(&self) -> &PricingPolicy {
        &self.pricing
    }

    async fn active_account(&self, id: Uuid) -> Result<Account, OrderError> {
        match self.store.fetch_account(id).await {
            Ok(account) if account.is_active => Ok(account),
            Ok(_) | Err(StoreError::NotFound { .. }) => Err(OrderError::Unauthenticated),
            Err(err) => Err(err.into()),
        }
    }

    async fn load_order(&self, id: Uuid) -> Result<Order, OrderError> {
        match self.store.fetch_order(id).await {
            Ok(order) => Ok(order),
            Err(StoreError::NotFound { .. }) => Err(OrderError::NotFound("Order not found".into())),
            Err(err) => Err(err.into()),
        }
    }

    async fn view(&self, order: Order) -> Result<OrderView, OrderError> {
        let buyer = self.store.fetch_account(order.buyer_id).await?.summary();
        let seller = self.store.fetch_account(order.seller_id).await?.summary();
        Ok(OrderView {
            order,
            buyer,
            seller,
        })
    }

    /// Validates the cart, prices it, splits it by producer and places one order per producer.
    pub async fn place_order(
        &self,
        buyer_id: Uuid,
        input: PlaceOrderInput,
    ) -> Result<Placement, OrderError> {
        let buyer = self.active_account(buyer_id).await?;
        if buyer.role() != Role::Consumer {
            return Err(OrderError::Forbidden(
                "Only consumers can place orders".into(),
            ));
        }

        let requested = merge_items(&input)?;

        // Every line must resolve and fit before anything is reserved.
        let mut lines: Vec<(Product, u32)> = Vec::with_capacity(requested.len());
        for (product_id, quantity) in requested {
            let product = match self.store.fetch_product(product_id).await {
                Ok(product) if product.is_orderable() => product,
                Ok(_) | Err(StoreError::NotFound { .. }) => {
                    return Err(OrderError::NotFound(format!(
                        "Product {product_id} not found or unavailable"
                    )));
                }
                Err(err) => return Err(err.into()),
            };
            if quantity > product.available {
                return Err(OrderError::InsufficientInventory {
                    product_id,
                    product_name: product.name,
                    available: product.available,
                });
            }
            lines.push((product, quantity));
        }

        let mut groups: Vec<(Uuid, Vec<LineItem>)> = Vec::new();
        for (product, quantity) in &lines {
            let item = self.pricing.line(product, *quantity)?;
            match groups
                .iter_mut()
                .find(|(seller_id, _)| *seller_id == product.producer_id)
            {
                Some((_, items)) => items.push(item),
                None => groups.push((product.producer_id, vec![item])),
            }
        }

        let mut orders = Vec::with_capacity(groups.len());
        let mut failures = Vec::new();
        let mut first_error = None;
        for (seller_id, items) in groups {
            let product_ids = items.iter().map(|item| item.product_id).collect();
            match self.place_group(&buyer, seller_id, items, &input).await {
                Ok(view) => orders.push(view),
                Err(err) => {
                    warn!(%buyer_id, %seller_id, %err, "Failed to place order group");
                    failures.push(GroupFailure {
                        seller_id,
                        product_ids,
                        reason: err.to_string(),
                    });
                    first_error.get_or_insert(err);
                }
            }
        }

        if orders.is_empty()
            && let Some(err) = first_error
        {
            return Err(err);
        }
        Ok(Placement { orders, failures })
    }

    async fn place_group(
        &self,
        buyer: &Account,
        seller_id: Uuid,
        items: Vec<LineItem>,
        input: &PlaceOrderInput,
    ) -> Result<OrderView, OrderError> {
        let seller = self.store.fetch_account(seller_id).await?;
        let totals = self.pricing.totals(&items)?;

        let order = with_retry("place_order", || {
            let new = NewOrder {
                order_number: order_number::generate(),
                buyer_id: buyer.id,
                seller_id,
                items: items.clone(),
                totals,
                currency: self.pricing.currency.clone(),
                shipping_address: input.shipping_address.clone(),
                payment_method: input.payment_method.unwrap_or_default(),
                notes: input.notes.clone(),
            };
            async move { self.store.place_order(new).await.map_err(OrderError::from) }
        })
        .await?;

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            buyer_id = %buyer.id,
            %seller_id,
            total = %order.totals.total,
            "Order placed"
        );
        Ok(OrderView {
            order,
            buyer: buyer.summary(),
            seller: seller.summary(),
        })
    }

    /// Producers see the orders they sell, consumers the orders they bought. Newest first.
    pub async fn list_orders(
        &self,
        account_id: Uuid,
        query: OrderListQuery,
    ) -> Result<OrderPage, OrderError> {
        let account = self.active_account(account_id).await?;
        let party = match account.role() {
            Role::Producer => Party::Seller(account.id),
            Role::Consumer => Party::Buyer(account.id),
        };
        let page_size = query
            .page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        // The offset has to fit a signed 64-bit column.
        let last_page = i64::MAX as u64 / page_size + 1;
        let page = query.page.unwrap_or(1).clamp(1, last_page);

        let filter = OrderFilter {
            party,
            status: query.status,
            offset: (page - 1) * page_size,
            limit: page_size,
        };
        let (orders, total_items) = self.store.list_orders(&filter).await?;

        let mut summaries: HashMap<Uuid, AccountSummary> = HashMap::new();
        let mut views = Vec::with_capacity(orders.len());
        for order in orders {
            let buyer = self.summary_cached(&mut summaries, order.buyer_id).await?;
            let seller = self.summary_cached(&mut summaries, order.seller_id).await?;
            views.push(OrderView {
                order,
                buyer,
                seller,
            });
        }

        Ok(OrderPage {
            orders: views,
            pagination: Pagination::new(page, page_size, total_items),
        })
    }

    async fn summary_cached(
        &self,
        cache: &mut HashMap<Uuid, AccountSummary>,
        id: Uuid,
    ) -> Result<AccountSummary, OrderError> {
        if let Some(summary) = cache.get(&id) {
            return Ok(summary.clone());
        }
        let summary = self.store.fetch_account(id).await?.summary();
        cache.insert(id, summary.clone());
        Ok(summary)
    }

    pub async fn get_order(&self, order_id: Uuid, account_id: Uuid) -> Result<OrderView, OrderError> {
        let account = self.active_account(account_id).await?;
        let order = self.load_order(order_id).await?;
        if !order.is_party(account.id) {
            return Err(OrderError::Forbidden(
                "You do not have access to this order".into(),
            ));
        }
        self.view(order).await
    }

    /// Moves the order forward. Only the seller may advance; a `cancelled`
    /// target is handled by [`OrderEngine::cancel_order`] so either party may use it.
    pub async fn update_status(
        &self,
        order_id: Uuid,
        actor_id: Uuid,
        next: OrderStatus,
        note: Option<String>,
    ) -> Result<OrderView, OrderError> {
        if next == OrderStatus::Cancelled {
            return self.cancel_order(order_id, actor_id, note).await;
        }
        let actor = self.active_account(actor_id).await?;

        let order = with_retry("update_status", || {
            self.try_transition(order_id, actor.id, next, note.clone())
        })
        .await?;

        info!(%order_id, status = %order.status, %actor_id, "Order status updated");
        self.view(order).await
    }

    async fn try_transition(
        &self,
        order_id: Uuid,
        actor_id: Uuid,
        next: OrderStatus,
        note: Option<String>,
    ) -> Result<Order, OrderError> {
        let order = self.load_order(order_id).await?;
        if !order.is_party(actor_id) {
            return Err(OrderError::Forbidden(
                "You do not have access to this order".into(),
            ));
        }
        if order.seller_id != actor_id {
            return Err(OrderError::Forbidden(
                "Only the seller can update the order status".into(),
            ));
        }
        if order.status.is_terminal() {
            return Err(OrderError::AlreadyTerminal(order.status));
        }
        if !order.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition {
                from: order.status,
                to: next,
            });
        }

        let entry = TimelineEntry {
            status: next,
            timestamp: Utc::now(),
            note,
        };
        Ok(self
            .store
            .transition_order(order_id, order.status, entry)
            .await?)
    }

    /// Cancels on behalf of the buyer or the seller and returns every line's
    /// quantity to the catalog in the same unit of work.
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        actor_id: Uuid,
        reason: Option<String>,
    ) -> Result<OrderView, OrderError> {
        let actor = self.active_account(actor_id).await?;

        let order = with_retry("cancel_order", || {
            self.try_cancel(order_id, actor.id, reason.clone())
        })
        .await?;

        info!(%order_id, %actor_id, "Order cancelled, inventory restored");
        self.view(order).await
    }

    async fn try_cancel(
        &self,
        order_id: Uuid,
        actor_id: Uuid,
        reason: Option<String>,
    ) -> Result<Order, OrderError> {
        let order = self.load_order(order_id).await?;
        let default_note = if order.buyer_id == actor_id {
            "Order cancelled by buyer"
        } else if order.seller_id == actor_id {
            "Order cancelled by seller"
        } else {
            return Err(OrderError::Forbidden(
                "You do not have access to this order".into(),
            ));
        };
        if order.status.is_terminal() {
            return Err(OrderError::AlreadyTerminal(order.status));
        }

        let entry = TimelineEntry {
            status: OrderStatus::Cancelled,
            timestamp: Utc::now(),
            note: Some(reason.unwrap_or_else(|| default_note.to_owned())),
        };
        Ok(self
            .store
            .cancel_order(order_id, order.status, entry, true)
            .await?)
    }

    pub async fn rate_order(
        &self,
        order_id: Uuid,
        buyer_id: Uuid,
        input: RateOrderInput,
    ) -> Result<OrderView, OrderError> {
        validate(&input)?;
        let buyer = self.active_account(buyer_id).await?;

        let order = with_retry("rate_order", || self.try_rate(order_id, buyer.id, &input)).await?;

        info!(%order_id, rating = input.rating, "Order rated");
        self.view(order).await
    }

    async fn try_rate(
        &self,
        order_id: Uuid,
        buyer_id: Uuid,
        input: &RateOrderInput,
    ) -> Result<Order, OrderError> {
        let order = self.load_order(order_id).await?;
        if order.buyer_id != buyer_id {
            return Err(OrderError::Forbidden(
                "Only the buyer can rate this order".into(),
            ));
        }
        if order.status != OrderStatus::Delivered {
            return Err(OrderError::NotDelivered);
        }
        if order.rating.is_some() {
            return Err(OrderError::AlreadyRated);
        }

        let rating = OrderRating {
            rating: input.rating,
            review: input.review.clone().filter(|review| !review.trim().is_empty()),
            rated_at: Utc::now(),
        };
        Ok(self.store.rate_order(order_id, rating).await?)
    }
}

/// Validates the request and merges duplicate product ids, keeping first-appearance order.
fn merge_items(input: &PlaceOrderInput) -> Result<Vec<(Uuid, u32)>, OrderError> {
    let mut errors = validate(input).err().unwrap_or_default();
    if input.items.is_empty() {
        errors.add("items", "Order must contain at least one item");
    }
    errors.into_result()?;

    let mut merged: Vec<(Uuid, u32)> = Vec::with_capacity(input.items.len());
    for item in &input.items {
        match merged.iter_mut().find(|(id, _)| *id == item.product_id) {
            Some((_, quantity)) => *quantity = quantity.saturating_add(item.quantity),
            None => merged.push((item.product_id, item.quantity)),
        }
    }
    if let Some((product_id, _)) = merged
        .iter()
        .find(|(_, quantity)| *quantity > MAX_LINE_QUANTITY)
    {
        return Err(FieldErrors::single(
            "items",
            format!("Quantity for product {product_id} cannot exceed {MAX_LINE_QUANTITY}"),
        )
        .into());
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            first_name: "Asha".into(),
            last_name: "Patil".into(),
            address_line: "12 Market Road".into(),
            city: "Pune".into(),
            state: "Maharashtra".into(),
            postal_code: "411001".into(),
            email: "asha@example.com".into(),
            phone: "9876543210".into(),
        }
    }

    fn input(items: Vec<LineItemRequest>) -> PlaceOrderInput {
        PlaceOrderInput {
            items,
            shipping_address: address(),
            payment_method: None,
            notes: None,
        }
    }

    #[test]
    fn duplicate_products_are_merged_in_order() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let merged = merge_items(&input(vec![
            LineItemRequest { product_id: a, quantity: 2 },
            LineItemRequest { product_id: b, quantity: 1 },
            LineItemRequest { product_id: a, quantity: 3 },
        ]))
        .unwrap();
        assert_eq!(merged, vec![(a, 5), (b, 1)]);
    }

    #[test]
    fn empty_cart_and_zero_quantity_are_field_errors() {
        let Err(OrderError::ValidationFailed(errors)) = merge_items(&input(Vec::new())) else {
            panic!("expected validation failure");
        };
        assert!(errors.contains("items"));

        let Err(OrderError::ValidationFailed(errors)) = merge_items(&input(vec![
            LineItemRequest { product_id: Uuid::new_v4(), quantity: 0 },
        ])) else {
            panic!("expected validation failure");
        };
        assert!(errors.contains("items[0].quantity"));
    }

    #[test]
    fn incomplete_address_is_reported_per_field() {
        let mut request = input(vec![LineItemRequest {
            product_id: Uuid::new_v4(),
            quantity: 1,
        }]);
        request.shipping_address.city.clear();
        request.shipping_address.email = "not-an-email".into();

        let Err(OrderError::ValidationFailed(errors)) = merge_items(&request) else {
            panic!("expected validation failure");
        };
        assert!(errors.contains("shipping_address.city"));
        assert!(errors.contains("shipping_address.email"));
    }

    #[test]
    fn pagination_flags() {
        let page = Pagination::new(2, 20, 45);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next);
        assert!(page.has_prev);

        let empty = Pagination::new(1, 20, 0);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next);
        assert!(!empty.has_prev);
    }
}

//! Postgres backend over diesel-async.
//!
//! Reservations use a conditional `UPDATE ... WHERE available >= $qty` inside
//! the same transaction as the order insert; a zero-row update rolls the whole
//! transaction back.

use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use diesel::{
    BoolExpressionMethods, ExpressionMethods, OptionalExtension, PgTextExpressionMethods,
    QueryDsl, SelectableHelper,
    dsl::count_star,
    result::{DatabaseErrorKind, Error as DieselError},
};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use tracing::debug;
use uuid::Uuid;

use super::{AccountStore, CatalogStore, OrderLedger, StoreError};
use crate::{
    common::db::DbPool,
    domain::{
        Account, NewAccount, NewOrder, NewProduct, Order, OrderFilter, OrderRating, OrderStatus,
        Party, Product, ProductPatch, ProductQuery, ProfilePatch, Role, TimelineEntry,
    },
    models::{
        AccountChangeset, AccountEntity, CreateAccountEntity, CreateProductEntity,
        CreateTimelineEntity, OrderEntity, OrderItemEntity, OrderRows, ProductChangeset,
        ProductEntity, TimelineEntity, minor_units, order_from_rows, quantity_column,
    },
    schema::{accounts, order_items, order_timeline, orders, products},
};

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StoreError::Duplicate(info.constraint_name().unwrap_or("unique key").to_owned())
            }
            DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, info) => {
                StoreError::Conflict(info.message().to_owned())
            }
            other => StoreError::Backend(anyhow::Error::new(other)),
        }
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

diesel::define_sql_function! {
    fn lower(x: diesel::sql_types::Text) -> diesel::sql_types::Text;
}

async fn load_product(conn: &mut AsyncPgConnection, id: Uuid) -> Result<Product, StoreError> {
    let entity: Option<ProductEntity> = products::table
        .find(id)
        .select(ProductEntity::as_select())
        .get_result(conn)
        .await
        .optional()?;
    match entity {
        Some(entity) => Ok(entity.try_into()?),
        None => Err(StoreError::not_found("Product", id)),
    }
}

async fn load_account(conn: &mut AsyncPgConnection, id: Uuid) -> Result<Account, StoreError> {
    let entity: Option<AccountEntity> = accounts::table
        .find(id)
        .select(AccountEntity::as_select())
        .get_result(conn)
        .await
        .optional()?;
    match entity {
        Some(entity) => Ok(entity.try_into()?),
        None => Err(StoreError::not_found("Account", id)),
    }
}

/// Loads orders with their items and timelines, preserving the order of `entities`.
async fn hydrate_orders(
    conn: &mut AsyncPgConnection,
    entities: Vec<OrderEntity>,
) -> Result<Vec<Order>, StoreError> {
    let order_ids: Vec<Uuid> = entities.iter().map(|order| order.id).collect();

    let items: Vec<OrderItemEntity> = order_items::table
        .filter(order_items::order_id.eq_any(&order_ids))
        .order_by((order_items::order_id, order_items::position))
        .select(OrderItemEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get order items")?;

    let timeline: Vec<TimelineEntity> = order_timeline::table
        .filter(order_timeline::order_id.eq_any(&order_ids))
        .order_by(order_timeline::id)
        .select(TimelineEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get order timeline")?;

    let mut item_groups: HashMap<Uuid, Vec<OrderItemEntity>> = HashMap::new();
    for item in items {
        item_groups.entry(item.order_id).or_default().push(item);
    }
    let mut timeline_groups: HashMap<Uuid, Vec<TimelineEntity>> = HashMap::new();
    for entry in timeline {
        timeline_groups.entry(entry.order_id).or_default().push(entry);
    }

    entities
        .into_iter()
        .map(|entity| {
            let items = item_groups.remove(&entity.id).unwrap_or_default();
            let timeline = timeline_groups.remove(&entity.id).unwrap_or_default();
            order_from_rows(entity, items, timeline).map_err(StoreError::from)
        })
        .collect()
}

async fn load_order(conn: &mut AsyncPgConnection, id: Uuid) -> Result<Order, StoreError> {
    let entity: Option<OrderEntity> = orders::table
        .find(id)
        .select(OrderEntity::as_select())
        .get_result(conn)
        .await
        .optional()?;
    let entity = entity.ok_or_else(|| StoreError::not_found("Order", id))?;
    hydrate_orders(conn, vec![entity])
        .await?
        .pop()
        .ok_or_else(|| StoreError::not_found("Order", id))
}

/// Locks the order row and checks it is still in `expected`.
async fn lock_order_in_status(
    conn: &mut AsyncPgConnection,
    id: Uuid,
    expected: OrderStatus,
) -> Result<(), StoreError> {
    let status: Option<String> = orders::table
        .find(id)
        .select(orders::status)
        .for_update()
        .get_result(conn)
        .await
        .optional()?;
    match status {
        None => Err(StoreError::not_found("Order", id)),
        Some(status) if status == expected.as_str() => Ok(()),
        Some(status) => Err(StoreError::Conflict(format!(
            "order {id} is {status}, expected {expected}"
        ))),
    }
}

async fn append_timeline(
    conn: &mut AsyncPgConnection,
    id: Uuid,
    entry: &TimelineEntry,
) -> Result<(), StoreError> {
    diesel::update(orders::table.find(id))
        .set((
            orders::status.eq(entry.status.as_str()),
            orders::updated_at.eq(entry.timestamp),
        ))
        .execute(conn)
        .await?;
    diesel::insert_into(order_timeline::table)
        .values(CreateTimelineEntity::new(id, entry))
        .execute(conn)
        .await?;
    Ok(())
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn fetch_product(&self, id: Uuid) -> Result<Product, StoreError> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        load_product(conn, id).await
    }

    async fn list_products(&self, query: &ProductQuery) -> Result<Vec<Product>, StoreError> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;

        let mut sql = products::table
            .filter(products::deleted_at.is_null())
            .select(ProductEntity::as_select())
            .into_boxed();
        if let Some(category) = query.category {
            sql = sql.filter(products::category.eq(category.as_str()));
        }
        if let Some(location) = &query.location {
            sql = sql.filter(products::location.ilike(format!("%{location}%")));
        }
        if let Some(min) = query.min_price {
            sql = sql.filter(products::price_minor.ge(minor_units(min)?));
        }
        if let Some(max) = query.max_price {
            sql = sql.filter(products::price_minor.le(minor_units(max)?));
        }
        if let Some(producer_id) = query.producer_id {
            sql = sql.filter(products::producer_id.eq(producer_id));
        }
        if let Some(search) = &query.search {
            let pattern = format!("%{search}%");
            sql = sql.filter(
                products::name
                    .ilike(pattern.clone())
                    .or(products::description.ilike(pattern)),
            );
        }

        let entities: Vec<ProductEntity> = sql
            .order_by(products::created_at.desc())
            .limit(query.effective_limit() as i64)
            .get_results(conn)
            .await
            .context("Failed to get products")?;

        entities
            .into_iter()
            .map(|entity| Product::try_from(entity).map_err(StoreError::from))
            .collect()
    }

    async fn create_product(&self, new: NewProduct) -> Result<Product, StoreError> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        let entity: ProductEntity = diesel::insert_into(products::table)
            .values(CreateProductEntity::new(Uuid::new_v4(), new)?)
            .returning(ProductEntity::as_returning())
            .get_result(conn)
            .await?;
        Ok(entity.try_into()?)
    }

    async fn update_product(&self, id: Uuid, patch: ProductPatch) -> Result<Product, StoreError> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        conn.transaction(move |conn| {
            Box::pin(async move {
                let entity: Option<ProductEntity> = products::table
                    .find(id)
                    .filter(products::deleted_at.is_null())
                    .select(ProductEntity::as_select())
                    .for_update()
                    .get_result(conn)
                    .await
                    .optional()?;
                let mut product: Product = entity
                    .ok_or_else(|| StoreError::not_found("Product", id))?
                    .try_into()?;
                product.apply(patch, Utc::now());

                let entity: ProductEntity = diesel::update(products::table.find(id))
                    .set(ProductChangeset::new(&product)?)
                    .returning(ProductEntity::as_returning())
                    .get_result(conn)
                    .await?;
                Ok::<Product, StoreError>(entity.try_into()?)
            })
        })
        .await
    }

    async fn soft_delete_product(&self, id: Uuid) -> Result<(), StoreError> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        let now = Utc::now();
        let updated = diesel::update(products::table.find(id))
            .filter(products::deleted_at.is_null())
            .set((products::deleted_at.eq(now), products::updated_at.eq(now)))
            .execute(conn)
            .await?;
        if updated == 0 {
            return Err(StoreError::not_found("Product", id));
        }
        Ok(())
    }

    async fn decrement_available(&self, id: Uuid, amount: u32) -> Result<u32, StoreError> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        let amount = quantity_column(amount)?;
        let remaining: Option<i32> = diesel::update(products::table.find(id))
            .filter(products::deleted_at.is_null())
            .filter(products::available.ge(amount))
            .set(products::available.eq(products::available - amount))
            .returning(products::available)
            .get_result(conn)
            .await
            .optional()?;
        match remaining {
            Some(remaining) => Ok(u32::try_from(remaining).context("Negative inventory")?),
            None => {
                let product = load_product(conn, id).await?;
                if product.is_deleted() {
                    return Err(StoreError::not_found("Product", id));
                }
                Err(StoreError::InsufficientInventory {
                    product_id: id,
                    product_name: product.name,
                    available: product.available,
                })
            }
        }
    }

    async fn increment_available(&self, id: Uuid, amount: u32) -> Result<u32, StoreError> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        let amount = quantity_column(amount)?;
        let remaining: Option<i32> = diesel::update(products::table.find(id))
            .set(products::available.eq(products::available + amount))
            .returning(products::available)
            .get_result(conn)
            .await
            .optional()?;
        let remaining = remaining.ok_or_else(|| StoreError::not_found("Product", id))?;
        Ok(u32::try_from(remaining).context("Negative inventory")?)
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn create_account(&self, new: NewAccount) -> Result<Account, StoreError> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        let entity: AccountEntity = diesel::insert_into(accounts::table)
            .values(CreateAccountEntity::new(Uuid::new_v4(), new))
            .returning(AccountEntity::as_returning())
            .get_result(conn)
            .await
            .map_err(|err| match StoreError::from(err) {
                StoreError::Duplicate(_) => StoreError::Duplicate("email".into()),
                other => other,
            })?;
        Ok(entity.try_into()?)
    }

    async fn fetch_account(&self, id: Uuid) -> Result<Account, StoreError> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        load_account(conn, id).await
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        let entity: Option<AccountEntity> = accounts::table
            .filter(lower(accounts::email).eq(email.to_lowercase()))
            .select(AccountEntity::as_select())
            .get_result(conn)
            .await
            .optional()?;
        Ok(entity.map(Account::try_from).transpose()?)
    }

    async fn update_account(&self, id: Uuid, patch: ProfilePatch) -> Result<Account, StoreError> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        conn.transaction(move |conn| {
            Box::pin(async move {
                let entity: Option<AccountEntity> = accounts::table
                    .find(id)
                    .select(AccountEntity::as_select())
                    .for_update()
                    .get_result(conn)
                    .await
                    .optional()?;
                let mut account: Account = entity
                    .ok_or_else(|| StoreError::not_found("Account", id))?
                    .try_into()?;
                account.apply(patch, Utc::now());

                let entity: AccountEntity = diesel::update(accounts::table.find(id))
                    .set(AccountChangeset::from(&account))
                    .returning(AccountEntity::as_returning())
                    .get_result(conn)
                    .await?;
                Ok::<Account, StoreError>(entity.try_into()?)
            })
        })
        .await
    }

    async fn set_credential(&self, id: Uuid, password_hash: String) -> Result<(), StoreError> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        let updated = diesel::update(accounts::table.find(id))
            .set((
                accounts::password_hash.eq(password_hash),
                accounts::updated_at.eq(Utc::now()),
            ))
            .execute(conn)
            .await?;
        if updated == 0 {
            return Err(StoreError::not_found("Account", id));
        }
        Ok(())
    }

    async fn deactivate_account(&self, id: Uuid) -> Result<(), StoreError> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        let updated = diesel::update(accounts::table.find(id))
            .set((
                accounts::is_active.eq(false),
                accounts::updated_at.eq(Utc::now()),
            ))
            .execute(conn)
            .await?;
        if updated == 0 {
            return Err(StoreError::not_found("Account", id));
        }
        Ok(())
    }

    async fn list_producers(&self, limit: usize) -> Result<Vec<Account>, StoreError> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        let entities: Vec<AccountEntity> = accounts::table
            .filter(accounts::role.eq(Role::Producer.as_str()))
            .filter(accounts::is_active.eq(true))
            .order_by(accounts::created_at.desc())
            .limit(limit as i64)
            .select(AccountEntity::as_select())
            .get_results(conn)
            .await
            .context("Failed to get producers")?;
        entities
            .into_iter()
            .map(|entity| Account::try_from(entity).map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl OrderLedger for PgStore {
    async fn place_order(&self, new: NewOrder) -> Result<Order, StoreError> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        let id = Uuid::new_v4();
        let rows = OrderRows::new(id, new, Utc::now())?;

        conn.transaction(move |conn| {
            Box::pin(async move {
                let mut requested: Vec<(Uuid, i32)> = Vec::new();
                for item in &rows.items {
                    match requested
                        .iter_mut()
                        .find(|(product_id, _)| *product_id == item.product_id)
                    {
                        Some((_, quantity)) => *quantity += item.quantity,
                        None => requested.push((item.product_id, item.quantity)),
                    }
                }
                // Fixed lock order across transactions.
                requested.sort_by_key(|(product_id, _)| *product_id);

                for (product_id, quantity) in requested {
                    let reserved: Option<i32> = diesel::update(products::table.find(product_id))
                        .filter(products::deleted_at.is_null())
                        .filter(products::available.ge(quantity))
                        .set(products::available.eq(products::available - quantity))
                        .returning(products::available)
                        .get_result(conn)
                        .await
                        .optional()?;
                    if reserved.is_none() {
                        let product = load_product(conn, product_id).await?;
                        if product.is_deleted() {
                            return Err(StoreError::not_found("Product", product_id));
                        }
                        debug!(%product_id, available = product.available, "Reservation rejected");
                        return Err(StoreError::InsufficientInventory {
                            product_id,
                            product_name: product.name,
                            available: product.available,
                        });
                    }
                }

                diesel::insert_into(orders::table)
                    .values(&rows.order)
                    .execute(conn)
                    .await
                    .map_err(|err| match StoreError::from(err) {
                        StoreError::Duplicate(_) => StoreError::Duplicate("order number".into()),
                        other => other,
                    })?;
                diesel::insert_into(order_items::table)
                    .values(&rows.items)
                    .execute(conn)
                    .await?;
                diesel::insert_into(order_timeline::table)
                    .values(&rows.timeline)
                    .execute(conn)
                    .await?;

                load_order(conn, id).await
            })
        })
        .await
    }

    async fn fetch_order(&self, id: Uuid) -> Result<Order, StoreError> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        load_order(conn, id).await
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<(Vec<Order>, u64), StoreError> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;

        let mut page_query = orders::table
            .select(OrderEntity::as_select())
            .into_boxed();
        let mut count_query = orders::table.select(count_star()).into_boxed();
        match filter.party {
            Party::Buyer(id) => {
                page_query = page_query.filter(orders::buyer_id.eq(id));
                count_query = count_query.filter(orders::buyer_id.eq(id));
            }
            Party::Seller(id) => {
                page_query = page_query.filter(orders::seller_id.eq(id));
                count_query = count_query.filter(orders::seller_id.eq(id));
            }
        }
        if let Some(status) = filter.status {
            page_query = page_query.filter(orders::status.eq(status.as_str()));
            count_query = count_query.filter(orders::status.eq(status.as_str()));
        }

        let total: i64 = count_query
            .get_result(conn)
            .await
            .context("Failed to count orders")?;

        let entities: Vec<OrderEntity> = page_query
            .order_by(orders::created_at.desc())
            .offset(i64::try_from(filter.offset).context("Offset out of range")?)
            .limit(i64::try_from(filter.limit).context("Limit out of range")?)
            .get_results(conn)
            .await
            .context("Failed to get orders")?;

        let orders = hydrate_orders(conn, entities).await?;
        Ok((orders, u64::try_from(total).unwrap_or_default()))
    }

    async fn transition_order(
        &self,
        id: Uuid,
        expected: OrderStatus,
        entry: TimelineEntry,
    ) -> Result<Order, StoreError> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        conn.transaction(move |conn| {
            Box::pin(async move {
                lock_order_in_status(conn, id, expected).await?;
                append_timeline(conn, id, &entry).await?;
                load_order(conn, id).await
            })
        })
        .await
    }

    async fn cancel_order(
        &self,
        id: Uuid,
        expected: OrderStatus,
        entry: TimelineEntry,
        restore_inventory: bool,
    ) -> Result<Order, StoreError> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        conn.transaction(move |conn| {
            Box::pin(async move {
                lock_order_in_status(conn, id, expected).await?;
                append_timeline(conn, id, &entry).await?;

                if restore_inventory {
                    let items: Vec<OrderItemEntity> = order_items::table
                        .filter(order_items::order_id.eq(id))
                        .order_by(order_items::product_id)
                        .select(OrderItemEntity::as_select())
                        .get_results(conn)
                        .await?;
                    for item in items {
                        diesel::update(products::table.find(item.product_id))
                            .set(products::available.eq(products::available + item.quantity))
                            .execute(conn)
                            .await?;
                    }
                }

                load_order(conn, id).await
            })
        })
        .await
    }

    async fn rate_order(&self, id: Uuid, rating: OrderRating) -> Result<Order, StoreError> {
        let conn = &mut self
            .pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        let updated = diesel::update(orders::table.find(id))
            .filter(orders::status.eq(OrderStatus::Delivered.as_str()))
            .filter(orders::rating.is_null())
            .set((
                orders::rating.eq(Some(i16::from(rating.rating))),
                orders::review.eq(rating.review),
                orders::rated_at.eq(Some(rating.rated_at)),
                orders::updated_at.eq(rating.rated_at),
            ))
            .execute(conn)
            .await?;
        if updated == 0 {
            // Distinguish a missing order from one in the wrong state.
            load_order(conn, id).await?;
            return Err(StoreError::Conflict(format!(
                "order {id} cannot be rated in its current state"
            )));
        }
        load_order(conn, id).await
    }
}

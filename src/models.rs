use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use diesel::{
    Selectable,
    prelude::{AsChangeset, Identifiable, Insertable, Queryable},
};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::{
    Account, AccountProfile, LineItem, Location, NewAccount, NewOrder, NewProduct, Order,
    OrderRating, OrderTotals, Price, ProducerProfile, Product, TimelineEntry,
    money::{from_minor_units, to_minor_units},
};

// Accounts

#[derive(Queryable, Selectable, Identifiable, Debug)]
#[diesel(table_name = crate::schema::accounts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AccountEntity {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub password_hash: String,
    pub role: String,
    pub farm_name: Option<String>,
    pub farm_size: Option<f64>,
    pub crops: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::accounts)]
pub struct CreateAccountEntity {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub password_hash: String,
    pub role: String,
    pub farm_name: Option<String>,
    pub farm_size: Option<f64>,
    pub crops: Vec<String>,
}

#[derive(AsChangeset, Debug)]
#[diesel(table_name = crate::schema::accounts)]
#[diesel(treat_none_as_null = true)]
pub struct AccountChangeset {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub farm_name: Option<String>,
    pub farm_size: Option<f64>,
    pub crops: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

fn split_profile(profile: &AccountProfile) -> (Option<String>, Option<f64>, Vec<String>) {
    match profile {
        AccountProfile::Producer(producer) => (
            Some(producer.farm_name.clone()),
            Some(producer.farm_size),
            producer.crops.clone(),
        ),
        AccountProfile::Consumer => (None, None, Vec::new()),
    }
}

impl CreateAccountEntity {
    pub fn new(id: Uuid, new: NewAccount) -> Self {
        let (farm_name, farm_size, crops) = split_profile(&new.profile);
        Self {
            id,
            first_name: new.first_name,
            last_name: new.last_name,
            email: new.email,
            phone: new.phone,
            city: new.location.city,
            state: new.location.state,
            postal_code: new.location.postal_code,
            password_hash: new.password_hash,
            role: new.profile.role().as_str().to_owned(),
            farm_name,
            farm_size,
            crops,
        }
    }
}

impl From<&Account> for AccountChangeset {
    fn from(account: &Account) -> Self {
        let (farm_name, farm_size, crops) = split_profile(&account.profile);
        Self {
            first_name: account.first_name.clone(),
            last_name: account.last_name.clone(),
            phone: account.phone.clone(),
            city: account.location.city.clone(),
            state: account.location.state.clone(),
            postal_code: account.location.postal_code.clone(),
            farm_name,
            farm_size,
            crops,
            updated_at: account.updated_at,
        }
    }
}

impl TryFrom<AccountEntity> for Account {
    type Error = anyhow::Error;

    fn try_from(entity: AccountEntity) -> Result<Self> {
        let profile = match entity.role.as_str() {
            "producer" => AccountProfile::Producer(ProducerProfile {
                farm_name: entity
                    .farm_name
                    .with_context(|| format!("Producer {} has no farm name", entity.id))?,
                farm_size: entity
                    .farm_size
                    .with_context(|| format!("Producer {} has no farm size", entity.id))?,
                crops: entity.crops,
            }),
            "consumer" => AccountProfile::Consumer,
            other => return Err(anyhow!("Unknown role '{other}' on account {}", entity.id)),
        };
        Ok(Account {
            id: entity.id,
            first_name: entity.first_name,
            last_name: entity.last_name,
            email: entity.email,
            phone: entity.phone,
            location: Location {
                city: entity.city,
                state: entity.state,
                postal_code: entity.postal_code,
            },
            profile,
            password_hash: entity.password_hash,
            is_active: entity.is_active,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        })
    }
}

// Products

#[derive(Queryable, Selectable, Identifiable, Debug)]
#[diesel(table_name = crate::schema::products)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProductEntity {
    pub id: Uuid,
    pub producer_id: Uuid,
    pub name: String,
    pub description: String,
    pub category: String,
    pub price_minor: i64,
    pub unit: String,
    pub currency: String,
    pub location: String,
    pub images: Vec<String>,
    pub available: i32,
    pub is_available: bool,
    pub is_organic: bool,
    pub harvest_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::products)]
pub struct CreateProductEntity {
    pub id: Uuid,
    pub producer_id: Uuid,
    pub name: String,
    pub description: String,
    pub category: String,
    pub price_minor: i64,
    pub unit: String,
    pub currency: String,
    pub location: String,
    pub images: Vec<String>,
    pub available: i32,
    pub is_organic: bool,
    pub harvest_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub tags: Vec<String>,
}

#[derive(AsChangeset, Debug)]
#[diesel(table_name = crate::schema::products)]
#[diesel(treat_none_as_null = true)]
pub struct ProductChangeset {
    pub name: String,
    pub description: String,
    pub category: String,
    pub price_minor: i64,
    pub unit: String,
    pub location: String,
    pub images: Vec<String>,
    pub available: i32,
    pub is_available: bool,
    pub is_organic: bool,
    pub harvest_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub tags: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

pub fn minor_units(amount: rust_decimal::Decimal) -> Result<i64> {
    to_minor_units(amount).with_context(|| format!("Amount {amount} is out of range"))
}

pub fn quantity_column(quantity: u32) -> Result<i32> {
    i32::try_from(quantity).with_context(|| format!("Quantity {quantity} is out of range"))
}

fn quantity_value(quantity: i32) -> Result<u32> {
    u32::try_from(quantity).with_context(|| format!("Negative quantity {quantity} in storage"))
}

impl CreateProductEntity {
    pub fn new(id: Uuid, new: NewProduct) -> Result<Self> {
        Ok(Self {
            id,
            producer_id: new.producer_id,
            name: new.name,
            description: new.description,
            category: new.category.as_str().to_owned(),
            price_minor: minor_units(new.price.amount)?,
            unit: new.price.unit.as_str().to_owned(),
            currency: new.price.currency,
            location: new.location,
            images: new.images,
            available: quantity_column(new.available)?,
            is_organic: new.is_organic,
            harvest_date: new.harvest_date,
            expiry_date: new.expiry_date,
            tags: new.tags,
        })
    }
}

impl ProductChangeset {
    pub fn new(product: &Product) -> Result<Self> {
        Ok(Self {
            name: product.name.clone(),
            description: product.description.clone(),
            category: product.category.as_str().to_owned(),
            price_minor: minor_units(product.price.amount)?,
            unit: product.price.unit.as_str().to_owned(),
            location: product.location.clone(),
            images: product.images.clone(),
            available: quantity_column(product.available)?,
            is_available: product.is_available,
            is_organic: product.is_organic,
            harvest_date: product.harvest_date,
            expiry_date: product.expiry_date,
            tags: product.tags.clone(),
            updated_at: product.updated_at,
        })
    }
}

impl TryFrom<ProductEntity> for Product {
    type Error = anyhow::Error;

    fn try_from(entity: ProductEntity) -> Result<Self> {
        Ok(Product {
            id: entity.id,
            producer_id: entity.producer_id,
            name: entity.name,
            description: entity.description,
            category: entity.category.parse().map_err(|e: String| anyhow!(e))?,
            price: Price {
                amount: from_minor_units(entity.price_minor),
                unit: entity.unit.parse().map_err(|e: String| anyhow!(e))?,
                currency: entity.currency,
            },
            location: entity.location,
            images: entity.images,
            available: quantity_value(entity.available)?,
            is_available: entity.is_available,
            is_organic: entity.is_organic,
            harvest_date: entity.harvest_date,
            expiry_date: entity.expiry_date,
            tags: entity.tags,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
            deleted_at: entity.deleted_at,
        })
    }
}

// Orders

#[derive(Queryable, Selectable, Identifiable, Debug)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderEntity {
    pub id: Uuid,
    pub order_number: String,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub subtotal_minor: i64,
    pub delivery_charge_minor: i64,
    pub tax_minor: i64,
    pub total_minor: i64,
    pub currency: String,
    pub shipping_address: Value,
    pub payment_method: String,
    pub notes: Option<String>,
    pub status: String,
    pub rating: Option<i16>,
    pub review: Option<String>,
    pub rated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CreateOrderEntity {
    pub id: Uuid,
    pub order_number: String,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub subtotal_minor: i64,
    pub delivery_charge_minor: i64,
    pub tax_minor: i64,
    pub total_minor: i64,
    pub currency: String,
    pub shipping_address: Value,
    pub payment_method: String,
    pub notes: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Insertable, Debug)]
#[diesel(table_name = crate::schema::order_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderItemEntity {
    pub order_id: Uuid,
    pub position: i32,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit: String,
    pub unit_price_minor: i64,
    pub line_total_minor: i64,
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = crate::schema::order_timeline)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TimelineEntity {
    pub id: i64,
    pub order_id: Uuid,
    pub status: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::order_timeline)]
pub struct CreateTimelineEntity {
    pub order_id: Uuid,
    pub status: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CreateTimelineEntity {
    pub fn new(order_id: Uuid, entry: &TimelineEntry) -> Self {
        Self {
            order_id,
            status: entry.status.as_str().to_owned(),
            note: entry.note.clone(),
            created_at: entry.timestamp,
        }
    }
}

/// Rows for a new order: the order itself, its items and the initial timeline entry.
pub struct OrderRows {
    pub order: CreateOrderEntity,
    pub items: Vec<OrderItemEntity>,
    pub timeline: CreateTimelineEntity,
}

impl OrderRows {
    pub fn new(id: Uuid, new: NewOrder, now: DateTime<Utc>) -> Result<Self> {
        let items = new
            .items
            .iter()
            .enumerate()
            .map(|(position, item)| {
                Ok(OrderItemEntity {
                    order_id: id,
                    position: i32::try_from(position)?,
                    product_id: item.product_id,
                    product_name: item.product_name.clone(),
                    quantity: quantity_column(item.quantity)?,
                    unit: item.unit.as_str().to_owned(),
                    unit_price_minor: minor_units(item.unit_price)?,
                    line_total_minor: minor_units(item.line_total)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let status = crate::domain::OrderStatus::Pending;
        Ok(Self {
            order: CreateOrderEntity {
                id,
                order_number: new.order_number,
                buyer_id: new.buyer_id,
                seller_id: new.seller_id,
                subtotal_minor: minor_units(new.totals.subtotal)?,
                delivery_charge_minor: minor_units(new.totals.delivery_charge)?,
                tax_minor: minor_units(new.totals.tax)?,
                total_minor: minor_units(new.totals.total)?,
                currency: new.currency,
                shipping_address: serde_json::to_value(&new.shipping_address)
                    .context("Failed to serialize shipping address")?,
                payment_method: new.payment_method.as_str().to_owned(),
                notes: new.notes,
                status: status.as_str().to_owned(),
                created_at: now,
                updated_at: now,
            },
            items,
            timeline: CreateTimelineEntity {
                order_id: id,
                status: status.as_str().to_owned(),
                note: None,
                created_at: now,
            },
        })
    }
}

/// Reassembles an order from its rows. `items` and `timeline` must already be in order.
pub fn order_from_rows(
    entity: OrderEntity,
    items: Vec<OrderItemEntity>,
    timeline: Vec<TimelineEntity>,
) -> Result<Order> {
    let items = items
        .into_iter()
        .map(|item| {
            Ok(LineItem {
                product_id: item.product_id,
                product_name: item.product_name,
                quantity: quantity_value(item.quantity)?,
                unit: item.unit.parse().map_err(|e: String| anyhow!(e))?,
                unit_price: from_minor_units(item.unit_price_minor),
                line_total: from_minor_units(item.line_total_minor),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let timeline = timeline
        .into_iter()
        .map(|entry| {
            Ok(TimelineEntry {
                status: entry.status.parse().map_err(|e: String| anyhow!(e))?,
                timestamp: entry.created_at,
                note: entry.note,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let rating = match (entity.rating, entity.rated_at) {
        (Some(rating), Some(rated_at)) => Some(OrderRating {
            rating: u8::try_from(rating).context("Rating out of range")?,
            review: entity.review,
            rated_at,
        }),
        _ => None,
    };

    Ok(Order {
        id: entity.id,
        order_number: entity.order_number,
        buyer_id: entity.buyer_id,
        seller_id: entity.seller_id,
        items,
        totals: OrderTotals {
            subtotal: from_minor_units(entity.subtotal_minor),
            delivery_charge: from_minor_units(entity.delivery_charge_minor),
            tax: from_minor_units(entity.tax_minor),
            total: from_minor_units(entity.total_minor),
        },
        currency: entity.currency,
        shipping_address: serde_json::from_value(entity.shipping_address)
            .context("Failed to deserialize shipping address")?,
        payment_method: entity
            .payment_method
            .parse()
            .map_err(|e: String| anyhow!(e))?,
        notes: entity.notes,
        status: entity.status.parse().map_err(|e: String| anyhow!(e))?,
        timeline,
        rating,
        created_at: entity.created_at,
        updated_at: entity.updated_at,
    })
}

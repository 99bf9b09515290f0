use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Category {
    Vegetables,
    Fruits,
    Grains,
    Dairy,
    Poultry,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Vegetables => "Vegetables",
            Category::Fruits => "Fruits",
            Category::Grains => "Grains",
            Category::Dairy => "Dairy",
            Category::Poultry => "Poultry",
            Category::Other => "Other",
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Vegetables" => Ok(Category::Vegetables),
            "Fruits" => Ok(Category::Fruits),
            "Grains" => Ok(Category::Grains),
            "Dairy" => Ok(Category::Dairy),
            "Poultry" => Ok(Category::Poultry),
            "Other" => Ok(Category::Other),
            other => Err(format!("unknown category '{other}'")),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PriceUnit {
    Kg,
    G,
    Piece,
    Dozen,
    Bundle,
}

impl PriceUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceUnit::Kg => "kg",
            PriceUnit::G => "g",
            PriceUnit::Piece => "piece",
            PriceUnit::Dozen => "dozen",
            PriceUnit::Bundle => "bundle",
        }
    }
}

impl FromStr for PriceUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kg" => Ok(PriceUnit::Kg),
            "g" => Ok(PriceUnit::G),
            "piece" => Ok(PriceUnit::Piece),
            "dozen" => Ok(PriceUnit::Dozen),
            "bundle" => Ok(PriceUnit::Bundle),
            other => Err(format!("unknown price unit '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Price {
    #[schema(value_type = String, example = "40.00")]
    pub amount: Decimal,
    pub unit: PriceUnit,
    pub currency: String,
}

/// A listing owned by a producer.
///
/// `available` is the reservable quantity; it only moves through the
/// catalog's atomic decrement/increment operations or an owner update.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub producer_id: Uuid,
    pub name: String,
    pub description: String,
    pub category: Category,
    pub price: Price,
    pub location: String,
    pub images: Vec<String>,
    pub available: u32,
    pub is_available: bool,
    pub is_organic: bool,
    pub harvest_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Product {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether new orders may reference this product.
    pub fn is_orderable(&self) -> bool {
        !self.is_deleted() && self.is_available
    }

    pub fn apply(&mut self, patch: ProductPatch, now: DateTime<Utc>) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(amount) = patch.price_amount {
            self.price.amount = amount;
        }
        if let Some(unit) = patch.unit {
            self.price.unit = unit;
        }
        if let Some(location) = patch.location {
            self.location = location;
        }
        if let Some(images) = patch.images {
            self.images = images;
        }
        if let Some(available) = patch.available {
            self.available = available;
        }
        if let Some(is_available) = patch.is_available {
            self.is_available = is_available;
        }
        if let Some(is_organic) = patch.is_organic {
            self.is_organic = is_organic;
        }
        if let Some(harvest_date) = patch.harvest_date {
            self.harvest_date = Some(harvest_date);
        }
        if let Some(expiry_date) = patch.expiry_date {
            self.expiry_date = Some(expiry_date);
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        self.updated_at = now;
    }
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub producer_id: Uuid,
    pub name: String,
    pub description: String,
    pub category: Category,
    pub price: Price,
    pub location: String,
    pub images: Vec<String>,
    pub available: u32,
    pub is_organic: bool,
    pub harvest_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub tags: Vec<String>,
}

impl NewProduct {
    pub fn into_product(self, id: Uuid, now: DateTime<Utc>) -> Product {
        Product {
            id,
            producer_id: self.producer_id,
            name: self.name,
            description: self.description,
            category: self.category,
            price: self.price,
            location: self.location,
            images: self.images,
            available: self.available,
            is_available: true,
            is_organic: self.is_organic,
            harvest_date: self.harvest_date,
            expiry_date: self.expiry_date,
            tags: self.tags,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<Category>,
    pub price_amount: Option<Decimal>,
    pub unit: Option<PriceUnit>,
    pub location: Option<String>,
    pub images: Option<Vec<String>>,
    pub available: Option<u32>,
    pub is_available: Option<bool>,
    pub is_organic: Option<bool>,
    pub harvest_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub tags: Option<Vec<String>>,
}

/// Catalog browse filters. Soft-deleted products never match.
#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    pub category: Option<Category>,
    pub location: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub producer_id: Option<Uuid>,
    pub search: Option<String>,
    pub limit: usize,
}

impl ProductQuery {
    pub const DEFAULT_LIMIT: usize = 50;

    pub fn matches(&self, product: &Product) -> bool {
        if product.is_deleted() {
            return false;
        }
        if self.category.is_some_and(|c| c != product.category) {
            return false;
        }
        if let Some(location) = &self.location
            && !contains_ignore_case(&product.location, location)
        {
            return false;
        }
        if self.min_price.is_some_and(|min| product.price.amount < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| product.price.amount > max) {
            return false;
        }
        if self.producer_id.is_some_and(|id| id != product.producer_id) {
            return false;
        }
        if let Some(search) = &self.search
            && !contains_ignore_case(&product.name, search)
            && !contains_ignore_case(&product.description, search)
        {
            return false;
        }
        true
    }

    pub fn effective_limit(&self) -> usize {
        if self.limit == 0 {
            Self::DEFAULT_LIMIT
        } else {
            self.limit
        }
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tomatoes() -> Product {
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
            location: "Nashik, Maharashtra".into(),
            images: vec![],
            available: 10,
            is_organic: false,
            harvest_date: None,
            expiry_date: None,
            tags: vec![],
        }
        .into_product(Uuid::new_v4(), Utc::now())
    }

    #[test]
    fn query_filters_are_case_insensitive() {
        let product = tomatoes();
        let query = ProductQuery {
            location: Some("nashik".into()),
            search: Some("RIPENED".into()),
            ..Default::default()
        };
        assert!(query.matches(&product));

        let query = ProductQuery {
            max_price: Some(Decimal::new(30, 0)),
            ..Default::default()
        };
        assert!(!query.matches(&product));
    }

    #[test]
    fn deleted_products_never_match() {
        let mut product = tomatoes();
        product.deleted_at = Some(Utc::now());
        assert!(!ProductQuery::default().matches(&product));
        assert!(!product.is_orderable());
    }
}

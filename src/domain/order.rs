use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::product::PriceUnit;

/// Order lifecycle.
///
/// Sellers move an order forward through
/// `pending -> confirmed -> [preparing ->] shipped -> delivered`.
/// Either party may cancel from any non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    #[serde(alias = "processing")]
    Preparing,
    #[serde(alias = "in-transit")]
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    pub fn allowed_targets(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Confirmed, Cancelled],
            Confirmed => &[Preparing, Shipped, Cancelled],
            Preparing => &[Shipped, Cancelled],
            Shipped => &[Delivered, Cancelled],
            Delivered | Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.allowed_targets().contains(&next)
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "preparing" | "processing" => Ok(OrderStatus::Preparing),
            "shipped" | "in-transit" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status '{other}'")),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Cod,
    Upi,
    Card,
    Netbanking,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cod => "cod",
            PaymentMethod::Upi => "upi",
            PaymentMethod::Card => "card",
            PaymentMethod::Netbanking => "netbanking",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cod" => Ok(PaymentMethod::Cod),
            "upi" => Ok(PaymentMethod::Upi),
            "card" => Ok(PaymentMethod::Card),
            "netbanking" => Ok(PaymentMethod::Netbanking),
            other => Err(format!("unknown payment method '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LineItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: u32,
    pub unit: PriceUnit,
    #[schema(value_type = String, example = "40.00")]
    pub unit_price: Decimal,
    #[schema(value_type = String, example = "120.00")]
    pub line_total: Decimal,
}

/// Delivery address captured at checkout. Later profile edits do not touch it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct ShippingAddress {
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
    #[serde(alias = "address")]
    #[validate(length(min = 1, message = "Address is required"))]
    pub address_line: String,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "State is required"))]
    pub state: String,
    #[serde(alias = "pincode")]
    #[validate(length(min = 1, message = "Postal code is required"))]
    pub postal_code: String,
    #[validate(email(message = "A valid contact email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Contact phone is required"))]
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TimelineEntry {
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrderRating {
    pub rating: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
    pub rated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrderTotals {
    #[schema(value_type = String)]
    pub subtotal: Decimal,
    #[schema(value_type = String)]
    pub delivery_charge: Decimal,
    #[schema(value_type = String)]
    pub tax: Decimal,
    #[schema(value_type = String)]
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub items: Vec<LineItem>,
    #[serde(flatten)]
    pub totals: OrderTotals,
    pub currency: String,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub status: OrderStatus,
    pub timeline: Vec<TimelineEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<OrderRating>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_party(&self, account_id: Uuid) -> bool {
        self.buyer_id == account_id || self.seller_id == account_id
    }

    pub(crate) fn record(&mut self, entry: TimelineEntry) {
        self.status = entry.status;
        self.updated_at = entry.timestamp;
        self.timeline.push(entry);
    }
}

/// A priced, validated order that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: String,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub items: Vec<LineItem>,
    pub totals: OrderTotals,
    pub currency: String,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
}

impl NewOrder {
    pub fn into_order(self, id: Uuid, now: DateTime<Utc>) -> Order {
        Order {
            id,
            order_number: self.order_number,
            buyer_id: self.buyer_id,
            seller_id: self.seller_id,
            items: self.items,
            totals: self.totals,
            currency: self.currency,
            shipping_address: self.shipping_address,
            payment_method: self.payment_method,
            notes: self.notes,
            status: OrderStatus::Pending,
            timeline: vec![TimelineEntry {
                status: OrderStatus::Pending,
                timestamp: now,
                note: None,
            }],
            rating: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Buyer(Uuid),
    Seller(Uuid),
}

#[derive(Debug, Clone)]
pub struct OrderFilter {
    pub party: Party,
    pub status: Option<OrderStatus>,
    pub offset: u64,
    pub limit: u64,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        let party_matches = match self.party {
            Party::Buyer(id) => order.buyer_id == id,
            Party::Seller(id) => order.seller_id == id,
        };
        party_matches && self.status.is_none_or(|status| order.status == status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_chain_with_optional_preparing() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Shipped));
        assert!(Confirmed.can_transition_to(Preparing));
        assert!(Preparing.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));
        assert!(!Pending.can_transition_to(Delivered));
        assert!(!Shipped.can_transition_to(Confirmed));
    }

    #[test]
    fn cancellation_only_from_non_terminal() {
        use OrderStatus::*;
        for status in [Pending, Confirmed, Preparing, Shipped] {
            assert!(status.can_transition_to(Cancelled), "{status}");
        }
        for status in [Delivered, Cancelled] {
            assert!(status.is_terminal());
            assert!(status.allowed_targets().is_empty());
        }
    }

    #[test]
    fn legacy_status_names_parse() {
        assert_eq!("processing".parse::<OrderStatus>().unwrap(), OrderStatus::Preparing);
        assert_eq!("in-transit".parse::<OrderStatus>().unwrap(), OrderStatus::Shipped);
        let status: OrderStatus = serde_json::from_str("\"processing\"").unwrap();
        assert_eq!(status, OrderStatus::Preparing);
    }

    #[test]
    fn shipping_address_accepts_checkout_field_names() {
        let address: ShippingAddress = serde_json::from_value(serde_json::json!({
            "first_name": "Asha",
            "last_name": "Rao",
            "address": "12 MG Road",
            "city": "Pune",
            "state": "Maharashtra",
            "pincode": "411001",
            "email": "asha@example.com",
            "phone": "9876543210"
        }))
        .unwrap();
        assert_eq!(address.address_line, "12 MG Road");
        assert!(address.validate().is_ok());
    }

    #[test]
    fn blank_shipping_fields_fail_validation() {
        let address = ShippingAddress {
            first_name: String::new(),
            last_name: "Rao".into(),
            address_line: "12 MG Road".into(),
            city: "Pune".into(),
            state: "Maharashtra".into(),
            postal_code: "411001".into(),
            email: "not-an-email".into(),
            phone: "9876543210".into(),
        };
        let errors = address.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("first_name"));
        assert!(fields.contains_key("email"));
    }
}

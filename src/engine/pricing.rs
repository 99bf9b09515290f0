//! Server-side order pricing. Client-supplied totals are never trusted.

use rust_decimal::Decimal;

use crate::{
    domain::{
        LineItem, OrderTotals, Product,
        money::{DEFAULT_CURRENCY, round_money, to_minor_units},
    },
    validation::FieldErrors,
};

use super::OrderError;

fn too_large() -> OrderError {
    FieldErrors::single("items", "Order total is too large").into()
}

/// Every stored amount must fit the minor-unit column.
fn storable(amount: Decimal) -> Result<Decimal, OrderError> {
    to_minor_units(amount).map(|_| amount).ok_or_else(too_large)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricingPolicy {
    /// Flat charge added once per order.
    pub delivery_fee: Decimal,
    /// Fraction of the subtotal, e.g. `0.05`.
    pub tax_rate: Decimal,
    pub currency: String,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            delivery_fee: Decimal::new(50, 0),
            tax_rate: Decimal::new(5, 2),
            currency: DEFAULT_CURRENCY.to_owned(),
        }
    }
}

impl PricingPolicy {
    /// Prices one line at the product's current stored price.
    pub fn line(&self, product: &Product, quantity: u32) -> Result<LineItem, OrderError> {
        let unit_price = storable(round_money(product.price.amount))?;
        let line_total = unit_price
            .checked_mul(Decimal::from(quantity))
            .ok_or_else(too_large)?;
        Ok(LineItem {
            product_id: product.id,
            product_name: product.name.clone(),
            quantity,
            unit: product.price.unit,
            unit_price,
            line_total: storable(round_money(line_total))?,
        })
    }

    pub fn totals(&self, items: &[LineItem]) -> Result<OrderTotals, OrderError> {
        let subtotal = items
            .iter()
            .try_fold(Decimal::ZERO, |sum, item| sum.checked_add(item.line_total))
            .ok_or_else(too_large)?;
        let subtotal = storable(round_money(subtotal))?;
        let delivery_charge = round_money(self.delivery_fee);
        let tax = subtotal.checked_mul(self.tax_rate).ok_or_else(too_large)?;
        let tax = storable(round_money(tax))?;
        let total = subtotal
            .checked_add(delivery_charge)
            .and_then(|sum| sum.checked_add(tax))
            .ok_or_else(too_large)?;
        Ok(OrderTotals {
            subtotal,
            delivery_charge,
            tax,
            total: storable(round_money(total))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::domain::{Category, NewProduct, Price, PriceUnit};

    fn product(amount: Decimal) -> Product {
        NewProduct {
            producer_id: Uuid::new_v4(),
            name: "Tomatoes".into(),
            description: "Vine ripened".into(),
            category: Category::Vegetables,
            price: Price {
                amount,
                unit: PriceUnit::Kg,
                currency: DEFAULT_CURRENCY.into(),
            },
            location: "Nashik".into(),
            images: Vec::new(),
            available: 10,
            is_organic: false,
            harvest_date: None,
            expiry_date: None,
            tags: Vec::new(),
        }
        .into_product(Uuid::new_v4(), Utc::now())
    }

    #[test]
    fn three_kilos_of_tomatoes() {
        let policy = PricingPolicy::default();
        let line = policy.line(&product(Decimal::new(40, 0)), 3).unwrap();
        assert_eq!(line.line_total.to_string(), "120.00");

        let totals = policy.totals(&[line]).unwrap();
        assert_eq!(totals.subtotal.to_string(), "120.00");
        assert_eq!(totals.delivery_charge.to_string(), "50.00");
        assert_eq!(totals.tax.to_string(), "6.00");
        assert_eq!(totals.total.to_string(), "176.00");
    }

    #[test]
    fn tax_rounds_half_up() {
        let policy = PricingPolicy::default();
        // 0.05 * 12.30 = 0.615
        let line = policy.line(&product(Decimal::new(1230, 2)), 1).unwrap();
        let totals = policy.totals(&[line]).unwrap();
        assert_eq!(totals.tax.to_string(), "0.62");
        assert_eq!(totals.total.to_string(), "62.92");
    }

    #[test]
    fn configurable_fee_and_rate() {
        let policy = PricingPolicy {
            delivery_fee: Decimal::ZERO,
            tax_rate: Decimal::new(18, 2),
            currency: "INR".into(),
        };
        let items = [
            policy.line(&product(Decimal::new(25, 0)), 2).unwrap(),
            policy.line(&product(Decimal::new(50, 0)), 1).unwrap(),
        ];
        let totals = policy.totals(&items).unwrap();
        assert_eq!(totals.subtotal.to_string(), "100.00");
        assert_eq!(totals.tax.to_string(), "18.00");
        assert_eq!(totals.total.to_string(), "118.00");
    }

    #[test]
    fn overflowing_amounts_are_rejected() {
        let policy = PricingPolicy::default();
        let huge = Decimal::from_str_exact("10000000000000000000000000000").unwrap();
        let Err(OrderError::ValidationFailed(errors)) = policy.line(&product(huge), 9) else {
            panic!("expected validation failure");
        };
        assert!(errors.contains("items"));

        // Fits a Decimal but not the minor-unit column.
        let line = policy.line(&product(Decimal::new(100_000_000_000_000_000, 0)), 1);
        assert!(matches!(line, Err(OrderError::ValidationFailed(_))));
    }
}

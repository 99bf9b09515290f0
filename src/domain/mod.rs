//! Marketplace domain types shared by the stores, the order engine and the HTTP layer.

pub mod account;
pub mod money;
pub mod order;
pub mod product;

pub use account::{
    Account, AccountProfile, AccountSummary, Location, NewAccount, ProducerProfile, ProfilePatch,
    Role,
};
pub use order::{
    LineItem, NewOrder, Order, OrderFilter, OrderRating, OrderStatus, OrderTotals, Party,
    PaymentMethod, ShippingAddress, TimelineEntry,
};
pub use product::{Category, NewProduct, Price, PriceUnit, Product, ProductPatch, ProductQuery};

use thiserror::Error;
use uuid::Uuid;

use crate::{domain::OrderStatus, store::StoreError, validation::FieldErrors};

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Validation failed: {0}")]
    ValidationFailed(FieldErrors),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Insufficient inventory for {product_name}. Available: {available}")]
    InsufficientInventory {
        product_id: Uuid,
        product_name: String,
        available: u32,
    },

    #[error("Cannot change order status from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order is already {0}")]
    AlreadyTerminal(OrderStatus),

    #[error("Only delivered orders can be rated")]
    NotDelivered,

    #[error("Order has already been rated")]
    AlreadyRated,

    /// Lost a race with a concurrent writer after every retry.
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl OrderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrderError::Conflict(_))
    }
}

impl From<FieldErrors> for OrderError {
    fn from(errors: FieldErrors) -> Self {
        OrderError::ValidationFailed(errors)
    }
}

impl From<StoreError> for OrderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, .. } => OrderError::NotFound(format!("{entity} not found")),
            StoreError::InsufficientInventory {
                product_id,
                product_name,
                available,
            } => OrderError::InsufficientInventory {
                product_id,
                product_name,
                available,
            },
            StoreError::Duplicate(field) => OrderError::Conflict(format!("duplicate {field}")),
            StoreError::Conflict(reason) => OrderError::Conflict(reason),
            StoreError::Backend(err) => OrderError::Store(err),
        }
    }
}

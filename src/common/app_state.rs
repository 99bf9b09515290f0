use std::sync::Arc;

use crate::{
    common::auth::TokenService,
    engine::{OrderEngine, PricingPolicy},
    messaging::Messenger,
    store::Store,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub orders: Arc<OrderEngine>,
    pub messenger: Messenger,
    pub tokens: Arc<TokenService>,
}

impl AppState {
    /// Wires the engine and the messenger to one shared store.
    pub fn new(store: Arc<dyn Store>, pricing: PricingPolicy, tokens: TokenService) -> Self {
        Self {
            orders: Arc::new(OrderEngine::new(store.clone(), pricing)),
            messenger: Messenger::new(store.clone()),
            tokens: Arc::new(tokens),
            store,
        }
    }
}

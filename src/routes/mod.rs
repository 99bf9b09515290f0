use axum::Router;
use tower_http::trace::TraceLayer;
use utoipa_axum::router::OpenApiRouter;

use crate::common::{app_state::AppState, middleware, swagger};

pub mod auth;
pub mod health;
pub mod messages;
pub mod orders;
pub mod producers;
pub mod products;
pub mod users;

/// Every API route, mounted under `/api`.
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/api",
        health::routes_with_openapi()
            .merge(auth::routes_with_openapi())
            .merge(users::routes_with_openapi())
            .merge(products::routes_with_openapi())
            .merge(producers::products::routes_with_openapi())
            .merge(orders::routes_with_openapi())
            .merge(messages::routes_with_openapi()),
    )
}

/// The complete application: API routes, Swagger UI, authentication and request tracing.
pub fn app(state: AppState) -> Router {
    let (router, mut openapi) = routes_with_openapi().split_for_parts();
    openapi.info = utoipa::openapi::InfoBuilder::new()
        .title("AgriConnect Marketplace API")
        .version(env!("CARGO_PKG_VERSION"))
        .build();

    router
        .merge(swagger::create_swagger_ui(openapi))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::authenticate,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

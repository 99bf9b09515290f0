use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        auth::Principal,
        middleware,
    },
    domain::OrderStatus,
    engine::{OrderListQuery, OrderPage, OrderView, PlaceOrderInput, Placement, RateOrderInput},
    validation::validate,
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/orders",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_orders, create_order))
            .routes(utoipa_axum::routes!(get_order))
            .routes(utoipa_axum::routes!(update_order_status))
            .routes(utoipa_axum::routes!(cancel_order))
            .routes(utoipa_axum::routes!(rate_order))
            .route_layer(axum::middleware::from_fn(middleware::authenticated)),
    )
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
    #[serde(default)]
    #[validate(length(max = 500, message = "Note cannot exceed 500 characters"))]
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct CancelOrderRequest {
    #[serde(default)]
    #[validate(length(max = 500, message = "Reason cannot exceed 500 characters"))]
    pub reason: Option<String>,
}

/// Orders of the authenticated account: sales for producers, purchases for consumers.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(OrderListQuery),
    responses(
        (status = 200, description = "Page of orders", body = StdResponse<OrderPage, String>)
    )
)]
async fn get_orders(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<OrderListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = state.orders.list_orders(principal.account_id, query).await?;
    Ok(StdResponse {
        data: Some(page),
        message: Some("Get orders successfully"),
    })
}

/// Check out a cart. Items are split into one order per producer; totals
/// are computed server-side from current catalog prices.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    request_body = PlaceOrderInput,
    responses(
        (status = 201, description = "Order(s) placed", body = StdResponse<Placement, String>),
        (status = 400, description = "Invalid order data"),
        (status = 403, description = "Only consumers can place orders"),
        (status = 404, description = "Product not found"),
        (status = 409, description = "Insufficient inventory")
    )
)]
async fn create_order(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<PlaceOrderInput>,
) -> Result<impl IntoResponse, AppError> {
    let placement = state.orders.place_order(principal.account_id, body).await?;
    let message = if placement.failures.is_empty() {
        "Order placed successfully"
    } else {
        "Some orders could not be placed"
    };
    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(placement),
            message: Some(message),
        },
    ))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order", body = StdResponse<OrderView, String>),
        (status = 403, description = "Not a party to this order"),
        (status = 404, description = "Order not found")
    )
)]
async fn get_order(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let order = state.orders.get_order(id, principal.account_id).await?;
    Ok(StdResponse {
        data: Some(order),
        message: Some("Get order successfully"),
    })
}

/// Advance the order. A `cancelled` target behaves like the cancel endpoint.
#[utoipa::path(
    put,
    path = "/{id}/status",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = StdResponse<OrderView, String>),
        (status = 403, description = "Only the seller can update the status"),
        (status = 409, description = "Transition not allowed")
    )
)]
async fn update_order_status(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate(&body)?;
    let order = state
        .orders
        .update_status(id, principal.account_id, body.status, body.note)
        .await?;
    Ok(StdResponse {
        data: Some(order),
        message: Some("Order status updated successfully"),
    })
}

/// Cancel as buyer or seller. Reserved quantities go back to the catalog.
#[utoipa::path(
    post,
    path = "/{id}/cancel",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Order id")),
    request_body(content = CancelOrderRequest, description = "Optional reason"),
    responses(
        (status = 200, description = "Order cancelled", body = StdResponse<OrderView, String>),
        (status = 403, description = "Not a party to this order"),
        (status = 409, description = "Order already finished")
    )
)]
async fn cancel_order(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    body: Option<Json<CancelOrderRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let Json(body) = body.unwrap_or_default();
    validate(&body)?;
    let order = state
        .orders
        .cancel_order(id, principal.account_id, body.reason)
        .await?;
    Ok(StdResponse {
        data: Some(order),
        message: Some("Order cancelled successfully"),
    })
}

/// Rate a delivered order once.
#[utoipa::path(
    post,
    path = "/{id}/rate",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = RateOrderInput,
    responses(
        (status = 200, description = "Order rated", body = StdResponse<OrderView, String>),
        (status = 403, description = "Only the buyer can rate"),
        (status = 409, description = "Order already rated"),
        (status = 422, description = "Order not delivered yet")
    )
)]
async fn rate_order(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(body): Json<RateOrderInput>,
) -> Result<impl IntoResponse, AppError> {
    let order = state
        .orders
        .rate_order(id, principal.account_id, body)
        .await?;
    Ok(StdResponse {
        data: Some(order),
        message: Some("Order rated successfully"),
    })
}

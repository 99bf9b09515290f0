use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::IntoParams;
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

use crate::{
    common::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
    },
    domain::{Category, Product, ProductQuery},
    store::StoreError,
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/products",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(list_products))
            .routes(utoipa_axum::routes!(get_product))
            .routes(utoipa_axum::routes!(list_producer_products)),
    )
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProductListQuery {
    pub category: Option<Category>,
    /// Case-insensitive substring of the listing location.
    pub location: Option<String>,
    #[param(value_type = Option<String>)]
    #[serde(alias = "minPrice")]
    pub min_price: Option<Decimal>,
    #[param(value_type = Option<String>)]
    #[serde(alias = "maxPrice")]
    pub max_price: Option<Decimal>,
    #[serde(alias = "farmer")]
    pub producer_id: Option<Uuid>,
    /// Matched against name and description.
    pub search: Option<String>,
    pub limit: Option<usize>,
}

impl From<ProductListQuery> for ProductQuery {
    fn from(query: ProductListQuery) -> Self {
        ProductQuery {
            category: query.category,
            location: query.location.filter(|l| !l.trim().is_empty()),
            min_price: query.min_price,
            max_price: query.max_price,
            producer_id: query.producer_id,
            search: query.search.filter(|s| !s.trim().is_empty()),
            limit: query
                .limit
                .unwrap_or(ProductQuery::DEFAULT_LIMIT)
                .clamp(1, ProductQuery::DEFAULT_LIMIT),
        }
    }
}

/// Look up a product that has not been deleted.
pub(super) async fn live_product(state: &AppState, id: Uuid) -> Result<Product, AppError> {
    match state.store.fetch_product(id).await {
        Ok(product) if !product.is_deleted() => Ok(product),
        Ok(_) | Err(StoreError::NotFound { .. }) => {
            Err(AppError::NotFound("Product not found".into()))
        }
        Err(err) => Err(err.into()),
    }
}

/// Browse the catalog, newest first.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Products"],
    params(ProductListQuery),
    responses(
        (status = 200, description = "Matching products", body = StdResponse<Vec<Product>, String>)
    )
)]
async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let products = state.store.list_products(&query.into()).await?;
    Ok(StdResponse {
        data: Some(products),
        message: Some("Get products successfully"),
    })
}

#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Products"],
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product", body = StdResponse<Product, String>),
        (status = 404, description = "Product not found")
    )
)]
async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let product = live_product(&state, id).await?;
    Ok(StdResponse {
        data: Some(product),
        message: Some("Get product successfully"),
    })
}

/// Listings of one producer.
#[utoipa::path(
    get,
    path = "/farmer/{producer_id}",
    tags = ["Products"],
    params(("producer_id" = Uuid, Path, description = "Producer account id")),
    responses(
        (status = 200, description = "Producer's products", body = StdResponse<Vec<Product>, String>)
    )
)]
async fn list_producer_products(
    State(state): State<AppState>,
    Path(producer_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let query = ProductQuery {
        producer_id: Some(producer_id),
        limit: ProductQuery::DEFAULT_LIMIT,
        ..Default::default()
    };
    let products = state.store.list_products(&query).await?;
    Ok(StdResponse {
        data: Some(products),
        message: Some("Get farmer products successfully"),
    })
}

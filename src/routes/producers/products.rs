use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;
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
    domain::{
        Category, NewProduct, Price, PriceUnit, Product, ProductPatch, ProductQuery,
        money::to_minor_units,
    },
    routes::products::live_product,
    validation::{FieldErrors, validate},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/producers/products",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_my_products, create_product))
            .routes(utoipa_axum::routes!(update_product, delete_product))
            .route_layer(axum::middleware::from_fn(
                middleware::producers_authorization,
            )),
    )
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 100, message = "Product name is required"))]
    pub name: String,
    #[validate(length(min = 1, max = 1000, message = "Product description is required"))]
    pub description: String,
    pub category: Category,
    #[schema(value_type = String, example = "40.00")]
    pub price: Decimal,
    pub unit: PriceUnit,
    #[serde(alias = "inventory")]
    pub available: u32,
    /// Defaults to the producer's city.
    pub location: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub is_organic: bool,
    pub harvest_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 100, message = "Product name cannot be empty"))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 1000, message = "Product description cannot be empty"))]
    pub description: Option<String>,
    pub category: Option<Category>,
    #[schema(value_type = Option<String>, example = "40.00")]
    pub price: Option<Decimal>,
    pub unit: Option<PriceUnit>,
    #[serde(alias = "inventory")]
    pub available: Option<u32>,
    #[validate(length(min = 1, message = "Location cannot be empty"))]
    pub location: Option<String>,
    pub images: Option<Vec<String>>,
    pub is_available: Option<bool>,
    pub is_organic: Option<bool>,
    pub harvest_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub tags: Option<Vec<String>>,
}

fn check_price(errors: &mut FieldErrors, price: Option<Decimal>) {
    let Some(price) = price else { return };
    if price.is_sign_negative() {
        errors.add("price", "Price cannot be negative");
    } else if to_minor_units(price).is_none() {
        errors.add("price", "Price is too large");
    }
}

fn check_dates(errors: &mut FieldErrors, harvest: Option<NaiveDate>, expiry: Option<NaiveDate>) {
    if let (Some(harvest), Some(expiry)) = (harvest, expiry)
        && expiry < harvest
    {
        errors.add("expiry_date", "Expiry date cannot be before the harvest date");
    }
}

/// Loads a live product and checks that the caller listed it.
async fn owned_product(
    state: &AppState,
    id: Uuid,
    principal: &Principal,
    action: &str,
) -> Result<Product, AppError> {
    let product = live_product(state, id).await?;
    if product.producer_id != principal.account_id {
        return Err(AppError::ForbiddenResource(format!(
            "Not authorized to {action} this product"
        )));
    }
    Ok(product)
}

/// The authenticated producer's own listings.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Producers"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Own products", body = StdResponse<Vec<Product>, String>)
    )
)]
async fn get_my_products(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, AppError> {
    let query = ProductQuery {
        producer_id: Some(principal.account_id),
        limit: ProductQuery::DEFAULT_LIMIT,
        ..Default::default()
    };
    let products = state.store.list_products(&query).await?;
    Ok(StdResponse {
        data: Some(products),
        message: Some("Get products successfully"),
    })
}

/// Create a listing owned by the authenticated producer.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Producers"],
    security(("bearerAuth" = [])),
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = StdResponse<Product, String>),
        (status = 400, description = "Invalid product data"),
        (status = 403, description = "Farmers only")
    )
)]
async fn create_product(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CreateProductRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut errors = validate(&body).err().unwrap_or_default();
    check_price(&mut errors, Some(body.price));
    check_dates(&mut errors, body.harvest_date, body.expiry_date);
    errors.into_result()?;

    let location = match body.location.filter(|l| !l.trim().is_empty()) {
        Some(location) => location,
        None => {
            state
                .store
                .fetch_account(principal.account_id)
                .await?
                .location
                .city
        }
    };

    let product = state
        .store
        .create_product(NewProduct {
            producer_id: principal.account_id,
            name: body.name.trim().to_owned(),
            description: body.description,
            category: body.category,
            price: Price {
                amount: body.price,
                unit: body.unit,
                currency: state.orders.pricing().currency.clone(),
            },
            location,
            images: body.images,
            available: body.available,
            is_organic: body.is_organic,
            harvest_date: body.harvest_date,
            expiry_date: body.expiry_date,
            tags: body.tags,
        })
        .await?;

    info!(product_id = %product.id, producer_id = %principal.account_id, "Product created");
    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(product),
            message: Some("Product created successfully"),
        },
    ))
}

/// Update a listing. Only the owning producer may update it.
#[utoipa::path(
    put,
    path = "/{id}",
    tags = ["Producers"],
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Product id")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Product updated", body = StdResponse<Product, String>),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Product not found")
    )
)]
async fn update_product(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateProductRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut errors = validate(&body).err().unwrap_or_default();
    check_price(&mut errors, body.price);
    errors.into_result()?;

    let product = owned_product(&state, id, &principal, "update").await?;
    let mut dates = FieldErrors::new();
    check_dates(
        &mut dates,
        body.harvest_date.or(product.harvest_date),
        body.expiry_date.or(product.expiry_date),
    );
    dates.into_result()?;

    let patch = ProductPatch {
        name: body.name.map(|name| name.trim().to_owned()),
        description: body.description,
        category: body.category,
        price_amount: body.price,
        unit: body.unit,
        location: body.location,
        images: body.images,
        available: body.available,
        is_available: body.is_available,
        is_organic: body.is_organic,
        harvest_date: body.harvest_date,
        expiry_date: body.expiry_date,
        tags: body.tags,
    };
    let product = state.store.update_product(product.id, patch).await?;

    info!(product_id = %product.id, "Product updated");
    Ok(StdResponse {
        data: Some(product),
        message: Some("Product updated successfully"),
    })
}

/// Soft-delete a listing. Existing orders keep their line snapshots.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Producers"],
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product removed", body = StdResponse<String, String>),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Product not found")
    )
)]
async fn delete_product(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let product = owned_product(&state, id, &principal, "delete").await?;
    state.store.soft_delete_product(product.id).await?;

    info!(product_id = %product.id, "Product removed");
    Ok(StdResponse::<(), _> {
        data: None,
        message: Some("Product removed"),
    })
}

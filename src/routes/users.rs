use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
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
    domain::{Account, Location, ProfilePatch, Role},
    store::StoreError,
    validation::{validate, validate_phone},
};

const DEFAULT_FARMERS_LIMIT: usize = 20;
const MAX_FARMERS_LIMIT: usize = 100;

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/users",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(list_farmers))
            .routes(utoipa_axum::routes!(get_farmer))
            .merge(
                OpenApiRouter::new()
                    .routes(utoipa_axum::routes!(
                        get_profile,
                        update_profile,
                        delete_profile
                    ))
                    .route_layer(axum::middleware::from_fn(middleware::authenticated)),
            ),
    )
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 2, max = 50, message = "First name must be between 2 and 50 characters"))]
    pub first_name: Option<String>,
    #[validate(length(min = 2, max = 50, message = "Last name must be between 2 and 50 characters"))]
    pub last_name: Option<String>,
    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,
    #[validate(nested)]
    pub location: Option<Location>,
    #[validate(length(min = 1, message = "Farm name cannot be empty"))]
    pub farm_name: Option<String>,
    #[validate(range(exclusive_min = 0.0, message = "Farm size must be greater than 0"))]
    pub farm_size: Option<f64>,
    pub crops: Option<Vec<String>>,
}

impl From<UpdateProfileRequest> for ProfilePatch {
    fn from(body: UpdateProfileRequest) -> Self {
        ProfilePatch {
            first_name: body.first_name.map(|name| name.trim().to_owned()),
            last_name: body.last_name.map(|name| name.trim().to_owned()),
            phone: body.phone,
            location: body.location,
            farm_name: body.farm_name,
            farm_size: body.farm_size,
            crops: body.crops,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FarmersQuery {
    /// Defaults to 20, at most 100.
    pub limit: Option<usize>,
}

/// Get the authenticated account's profile.
#[utoipa::path(
    get,
    path = "/profile",
    tags = ["Users"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Profile", body = StdResponse<Account, String>)
    )
)]
async fn get_profile(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, AppError> {
    let account = state.store.fetch_account(principal.account_id).await?;
    Ok(StdResponse {
        data: Some(account),
        message: Some("Get profile successfully"),
    })
}

/// Update names, phone, location and (producers only) farm details.
#[utoipa::path(
    put,
    path = "/profile",
    tags = ["Users"],
    security(("bearerAuth" = [])),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = StdResponse<Account, String>),
        (status = 400, description = "Invalid profile data")
    )
)]
async fn update_profile(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate(&body)?;

    let account = state
        .store
        .update_account(principal.account_id, body.into())
        .await?;

    info!(account_id = %account.id, "Profile updated");
    Ok(StdResponse {
        data: Some(account),
        message: Some("Profile updated successfully"),
    })
}

/// Deactivate the authenticated account.
#[utoipa::path(
    delete,
    path = "/profile",
    tags = ["Users"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Account deactivated", body = StdResponse<String, String>)
    )
)]
async fn delete_profile(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, AppError> {
    state.store.deactivate_account(principal.account_id).await?;

    info!(account_id = %principal.account_id, "Account deactivated");
    Ok(StdResponse::<(), _> {
        data: None,
        message: Some("Account deactivated successfully"),
    })
}

/// List active producers.
#[utoipa::path(
    get,
    path = "/farmers",
    tags = ["Users"],
    params(FarmersQuery),
    responses(
        (status = 200, description = "Producers", body = StdResponse<Vec<Account>, String>)
    )
)]
async fn list_farmers(
    State(state): State<AppState>,
    Query(query): Query<FarmersQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_FARMERS_LIMIT)
        .clamp(1, MAX_FARMERS_LIMIT);
    let farmers = state.store.list_producers(limit).await?;
    Ok(StdResponse {
        data: Some(farmers),
        message: Some("Get farmers successfully"),
    })
}

#[utoipa::path(
    get,
    path = "/farmers/{id}",
    tags = ["Users"],
    params(("id" = Uuid, Path, description = "Producer account id")),
    responses(
        (status = 200, description = "Producer", body = StdResponse<Account, String>),
        (status = 404, description = "Farmer not found")
    )
)]
async fn get_farmer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let account = match state.store.fetch_account(id).await {
        Ok(account) => account,
        Err(StoreError::NotFound { .. }) => return Err(AppError::NotFound("Farmer not found".into())),
        Err(err) => return Err(err.into()),
    };
    if account.role() != Role::Producer || !account.is_active {
        return Err(AppError::NotFound("Farmer not found".into()));
    }
    Ok(StdResponse {
        data: Some(account),
        message: Some("Get farmer successfully"),
    })
}

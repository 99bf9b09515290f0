use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use validator::Validate;

use crate::{
    common::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        auth::{AuthError, Principal, hash_password_task, verify_password_task},
        middleware,
    },
    domain::{Account, AccountProfile, Location, NewAccount, ProducerProfile, Role},
    validation::{FieldErrors, validate, validate_phone},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/auth",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(register))
            .routes(utoipa_axum::routes!(login))
            .merge(
                OpenApiRouter::new()
                    .routes(utoipa_axum::routes!(me))
                    .routes(utoipa_axum::routes!(change_password))
                    .route_layer(axum::middleware::from_fn(middleware::authenticated)),
            ),
    )
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(length(min = 2, max = 50, message = "First name must be between 2 and 50 characters"))]
    pub first_name: String,
    #[validate(length(min = 2, max = 50, message = "Last name must be between 2 and 50 characters"))]
    pub last_name: String,
    #[validate(email(message = "Please enter a valid email"))]
    pub email: String,
    #[validate(custom(function = "validate_phone"))]
    pub phone: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[serde(alias = "user_type")]
    pub role: Role,
    #[validate(nested)]
    pub location: Location,
    pub farm_name: Option<String>,
    pub farm_size: Option<f64>,
    #[serde(default)]
    pub crops: Vec<String>,
}

impl RegisterRequest {
    fn profile(&self) -> Result<AccountProfile, FieldErrors> {
        match self.role {
            Role::Consumer => Ok(AccountProfile::Consumer),
            Role::Producer => {
                let mut errors = FieldErrors::new();
                let farm_name = self
                    .farm_name
                    .as_deref()
                    .map(str::trim)
                    .filter(|name| !name.is_empty());
                if farm_name.is_none() {
                    errors.add("farm_name", "Farm name is required for farmers");
                }
                let farm_size = self.farm_size.filter(|size| *size > 0.0);
                if farm_size.is_none() {
                    errors.add("farm_size", "Farm size must be greater than 0");
                }
                match (farm_name, farm_size) {
                    (Some(farm_name), Some(farm_size)) => {
                        Ok(AccountProfile::Producer(ProducerProfile {
                            farm_name: farm_name.to_owned(),
                            farm_size,
                            crops: self.crops.clone(),
                        }))
                    }
                    _ => Err(errors),
                }
            }
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Please enter a valid email"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub new_password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthPayload {
    pub token: String,
    pub account: Account,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Register a producer or consumer account.
#[utoipa::path(
    post,
    path = "/register",
    tags = ["Auth"],
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered successfully", body = StdResponse<AuthPayload, String>),
        (status = 400, description = "Invalid registration data"),
        (status = 409, description = "Email already registered")
    )
)]
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut errors = validate(&body).err().unwrap_or_default();
    let profile = body.profile().map_err(|e| errors.merge(e)).ok();
    errors.into_result()?;
    let profile = profile.ok_or_else(|| AppError::BadRequest("Invalid profile".into()))?;

    let password_hash = hash_password_task(body.password).await?;
    let account = state
        .store
        .create_account(NewAccount {
            first_name: body.first_name.trim().to_owned(),
            last_name: body.last_name.trim().to_owned(),
            email: normalize_email(&body.email),
            phone: body.phone,
            location: body.location,
            profile,
            password_hash,
        })
        .await?;
    let token = state.tokens.issue(&account)?;

    info!(account_id = %account.id, role = %account.role(), "Account registered");
    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(AuthPayload { token, account }),
            message: Some("User registered successfully"),
        },
    ))
}

/// Exchange email and password for a bearer token.
#[utoipa::path(
    post,
    path = "/login",
    tags = ["Auth"],
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in successfully", body = StdResponse<AuthPayload, String>),
        (status = 401, description = "Invalid credentials or deactivated account")
    )
)]
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate(&body)?;

    let account = state
        .store
        .find_account_by_email(&normalize_email(&body.email))
        .await?
        .ok_or(AuthError::InvalidCredentials)?;
    if !verify_password_task(body.password, account.password_hash.clone()).await? {
        warn!(account_id = %account.id, "Failed login attempt");
        return Err(AuthError::InvalidCredentials.into());
    }
    if !account.is_active {
        return Err(AuthError::AccountInactive.into());
    }
    let token = state.tokens.issue(&account)?;

    Ok(StdResponse {
        data: Some(AuthPayload { token, account }),
        message: Some("Login successful"),
    })
}

/// Fetch the authenticated account.
#[utoipa::path(
    get,
    path = "/me",
    tags = ["Auth"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Current account", body = StdResponse<Account, String>)
    )
)]
async fn me(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, AppError> {
    let account = state.store.fetch_account(principal.account_id).await?;
    Ok(StdResponse {
        data: Some(account),
        message: Some("Get account successfully"),
    })
}

/// Change the authenticated account's password.
#[utoipa::path(
    put,
    path = "/password",
    tags = ["Auth"],
    security(("bearerAuth" = [])),
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = StdResponse<String, String>),
        (status = 400, description = "Current password is incorrect")
    )
)]
async fn change_password(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate(&body)?;

    let account = state.store.fetch_account(principal.account_id).await?;
    if !verify_password_task(body.current_password, account.password_hash.clone()).await? {
        return Err(AppError::BadRequest("Current password is incorrect".into()));
    }
    let password_hash = hash_password_task(body.new_password).await?;
    state.store.set_credential(account.id, password_hash).await?;

    info!(account_id = %account.id, "Password changed");
    Ok(StdResponse::<(), _> {
        data: None,
        message: Some("Password updated successfully"),
    })
}

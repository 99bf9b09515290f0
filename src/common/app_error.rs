use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use utoipa::ToSchema;

use crate::{
    common::auth::AuthError, engine::OrderError, messaging::MessagingError, store::StoreError,
    validation::FieldErrors,
};

/// Envelope for every successful response.
#[derive(Serialize, ToSchema)]
pub struct StdResponse<T, M> {
    pub data: Option<T>,
    pub message: Option<M>,
}

impl<T, M> IntoResponse for StdResponse<T, M>
where
    T: Serialize,
    M: Serialize,
{
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Envelope for every error response.
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(value_type = Option<Object>)]
    pub data: Option<()>,
    pub message: String,
    #[schema(value_type = String)]
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Validation failed")]
    Validation(FieldErrors),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    ForbiddenResource(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    Conflict {
        code: &'static str,
        message: String,
        retryable: bool,
        details: Option<Value>,
    },

    #[error("{message}")]
    Unprocessable { code: &'static str, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        AppError::Conflict {
            code,
            message: message.into(),
            retryable: false,
            details: None,
        }
    }

    fn retryable(message: impl Into<String>) -> Self {
        AppError::Conflict {
            code: "CONFLICT",
            message: message.into(),
            retryable: true,
            details: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::ForbiddenResource(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = ErrorResponse {
            data: None,
            message: self.to_string(),
            code: "",
            errors: None,
            details: None,
            retryable: None,
        };
        match self {
            AppError::BadRequest(_) => body.code = "BAD_REQUEST",
            AppError::Validation(errors) => {
                body.code = "VALIDATION_FAILED";
                body.errors = Some(errors);
            }
            AppError::Unauthorized(_) => body.code = "UNAUTHENTICATED",
            AppError::ForbiddenResource(_) => body.code = "FORBIDDEN",
            AppError::NotFound(_) => body.code = "NOT_FOUND",
            AppError::Conflict {
                code,
                retryable,
                details,
                ..
            } => {
                body.code = code;
                body.details = details;
                body.retryable = retryable.then_some(true);
            }
            AppError::Unprocessable { code, .. } => body.code = code,
            AppError::Other(err) => {
                tracing::error!("Internal server error: {:?}", err);
                body.code = "INTERNAL";
                body.message = "Internal server error".into();
            }
        }
        (status, Json(body)).into_response()
    }
}

impl From<FieldErrors> for AppError {
    fn from(errors: FieldErrors) -> Self {
        AppError::Validation(errors)
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        let message = err.to_string();
        match err {
            OrderError::ValidationFailed(errors) => AppError::Validation(errors),
            OrderError::Unauthenticated => AppError::Unauthorized(message),
            OrderError::Forbidden(message) => AppError::ForbiddenResource(message),
            OrderError::NotFound(message) => AppError::NotFound(message),
            OrderError::InsufficientInventory {
                product_id,
                product_name,
                available,
            } => AppError::Conflict {
                code: "INSUFFICIENT_INVENTORY",
                message,
                retryable: false,
                details: Some(json!({
                    "product_id": product_id,
                    "product_name": product_name,
                    "available": available,
                })),
            },
            OrderError::InvalidTransition { .. } => AppError::conflict("INVALID_TRANSITION", message),
            OrderError::AlreadyTerminal(_) => AppError::conflict("ALREADY_TERMINAL", message),
            OrderError::AlreadyRated => AppError::conflict("ALREADY_RATED", message),
            OrderError::NotDelivered => AppError::Unprocessable {
                code: "NOT_DELIVERED",
                message,
            },
            OrderError::Conflict(_) => AppError::retryable(message),
            OrderError::Store(err) => AppError::Other(err),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, .. } => AppError::NotFound(format!("{entity} not found")),
            StoreError::Duplicate(field) => {
                AppError::conflict("DUPLICATE", format!("An account with this {field} already exists"))
            }
            StoreError::Conflict(reason) => AppError::retryable(reason),
            StoreError::Backend(err) => AppError::Other(err),
            err @ StoreError::InsufficientInventory { .. } => OrderError::from(err).into(),
        }
    }
}

impl From<MessagingError> for AppError {
    fn from(err: MessagingError) -> Self {
        match err {
            MessagingError::Validation(errors) => AppError::Validation(errors),
            MessagingError::NotFound(message) => AppError::NotFound(message),
            MessagingError::Forbidden(message) => AppError::ForbiddenResource(message),
            MessagingError::Conflict(message) => AppError::conflict("CONVERSATION_EXISTS", message),
            MessagingError::Store(err) => AppError::Other(err),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Internal(err) => AppError::Other(err),
            other => AppError::Unauthorized(other.to_string()),
        }
    }
}

//! Request authentication.
//!
//! [`authenticate`] runs on every request: a valid bearer token puts a
//! [`Principal`] into the request extensions, a missing token leaves them
//! untouched, and a bad token is rejected outright. The route layers below
//! then decide who may pass.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    common::{
        app_error::AppError,
        app_state::AppState,
        auth::{AuthError, Principal},
    },
    domain::Role,
    store::StoreError,
};

fn bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_owned())
}

pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(token) = bearer_token(&request) else {
        return Ok(next.run(request).await);
    };
    let claims = state.tokens.verify(&token)?;

    let account = match state.store.fetch_account(claims.sub).await {
        Ok(account) => account,
        Err(StoreError::NotFound { .. }) => return Err(AuthError::InvalidToken.into()),
        Err(err) => return Err(err.into()),
    };
    if !account.is_active {
        tracing::warn!(account_id = %account.id, "Rejected token of a deactivated account");
        return Err(AuthError::AccountInactive.into());
    }

    request.extensions_mut().insert(Principal {
        account_id: account.id,
        role: account.role(),
    });
    Ok(next.run(request).await)
}

/// Requires any authenticated account.
pub async fn authenticated(request: Request, next: Next) -> Response {
    if request.extensions().get::<Principal>().is_none() {
        return AppError::from(AuthError::MissingToken).into_response();
    }
    next.run(request).await
}

/// Requires an authenticated producer account.
pub async fn producers_authorization(request: Request, next: Next) -> Response {
    match request.extensions().get::<Principal>() {
        None => AppError::from(AuthError::MissingToken).into_response(),
        Some(principal) if principal.role != Role::Producer => {
            AppError::ForbiddenResource("Access denied. Farmers only.".into()).into_response()
        }
        Some(_) => next.run(request).await,
    }
}

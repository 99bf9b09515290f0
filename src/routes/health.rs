use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::common::{app_error::StdResponse, app_state::AppState};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(utoipa_axum::routes!(health))
}

#[derive(Serialize, ToSchema)]
struct Health {
    status: &'static str,
    timestamp: DateTime<Utc>,
}

/// Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    tags = ["Health"],
    responses(
        (status = 200, description = "Service is up", body = StdResponse<Health, String>)
    )
)]
async fn health() -> impl IntoResponse {
    StdResponse {
        data: Some(Health {
            status: "OK",
            timestamp: Utc::now(),
        }),
        message: Some("AgriConnect API is running"),
    }
}

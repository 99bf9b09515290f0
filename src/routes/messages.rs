use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    common::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        auth::Principal,
        middleware,
    },
    messaging::{
        ConversationSummary, Message, SendMessageInput, StartConversationInput,
        StartedConversation,
    },
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/messages",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(send_message))
            .routes(utoipa_axum::routes!(
                list_conversations,
                start_conversation
            ))
            .routes(utoipa_axum::routes!(unread_count))
            .routes(utoipa_axum::routes!(get_messages, delete_conversation))
            .routes(utoipa_axum::routes!(mark_read))
            .route_layer(axum::middleware::from_fn(middleware::authenticated)),
    )
}

#[derive(Serialize, ToSchema)]
pub struct UnreadCount {
    pub count: u32,
}

#[utoipa::path(
    post,
    path = "/",
    tags = ["Messages"],
    security(("bearerAuth" = [])),
    request_body = SendMessageInput,
    responses(
        (status = 201, description = "Message sent", body = StdResponse<Message, String>),
        (status = 400, description = "Invalid message"),
        (status = 404, description = "Recipient not found")
    )
)]
async fn send_message(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<SendMessageInput>,
) -> Result<impl IntoResponse, AppError> {
    let message = state.messenger.send(principal.account_id, body).await?;
    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(message),
            message: Some("Message sent successfully"),
        },
    ))
}

/// Conversations of the authenticated account, most recent first.
#[utoipa::path(
    get,
    path = "/conversations",
    tags = ["Messages"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Conversations", body = StdResponse<Vec<ConversationSummary>, String>)
    )
)]
async fn list_conversations(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, AppError> {
    let conversations = state
        .messenger
        .list_conversations(principal.account_id)
        .await?;
    Ok(StdResponse {
        data: Some(conversations),
        message: Some("Get conversations successfully"),
    })
}

#[utoipa::path(
    post,
    path = "/conversations",
    tags = ["Messages"],
    security(("bearerAuth" = [])),
    request_body = StartConversationInput,
    responses(
        (status = 201, description = "Conversation started", body = StdResponse<StartedConversation, String>),
        (status = 404, description = "Recipient not found"),
        (status = 409, description = "Conversation already exists")
    )
)]
async fn start_conversation(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<StartConversationInput>,
) -> Result<impl IntoResponse, AppError> {
    let started = state
        .messenger
        .start_conversation(principal.account_id, body)
        .await?;
    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(started),
            message: Some("Conversation started successfully"),
        },
    ))
}

/// Messages oldest first. Marks the conversation read for the caller.
#[utoipa::path(
    get,
    path = "/{conversation_id}",
    tags = ["Messages"],
    security(("bearerAuth" = [])),
    params(("conversation_id" = String, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Messages", body = StdResponse<Vec<Message>, String>),
        (status = 403, description = "Not a participant")
    )
)]
async fn get_messages(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(conversation_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let messages = state
        .messenger
        .get_messages(principal.account_id, &conversation_id)?;
    Ok(StdResponse {
        data: Some(messages),
        message: Some("Get messages successfully"),
    })
}

#[utoipa::path(
    delete,
    path = "/{conversation_id}",
    tags = ["Messages"],
    security(("bearerAuth" = [])),
    params(("conversation_id" = String, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Conversation deleted", body = StdResponse<String, String>),
        (status = 403, description = "Not a participant")
    )
)]
async fn delete_conversation(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(conversation_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state
        .messenger
        .delete_conversation(principal.account_id, &conversation_id)?;
    Ok(StdResponse::<(), _> {
        data: None,
        message: Some("Conversation deleted successfully"),
    })
}

#[utoipa::path(
    put,
    path = "/{conversation_id}/read",
    tags = ["Messages"],
    security(("bearerAuth" = [])),
    params(("conversation_id" = String, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Marked as read", body = StdResponse<String, String>),
        (status = 403, description = "Not a participant")
    )
)]
async fn mark_read(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(conversation_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state
        .messenger
        .mark_read(principal.account_id, &conversation_id)?;
    Ok(StdResponse::<(), _> {
        data: None,
        message: Some("Messages marked as read"),
    })
}

#[utoipa::path(
    get,
    path = "/unread/count",
    tags = ["Messages"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Unread message count", body = StdResponse<UnreadCount, String>)
    )
)]
async fn unread_count(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, AppError> {
    let count = state.messenger.unread_count(principal.account_id);
    Ok(StdResponse {
        data: Some(UnreadCount { count }),
        message: Some("Get unread count successfully"),
    })
}
